//! Command line driver
//!
//! Reads declarations and state from JSON files, runs one lifecycle step and
//! prints the resulting state document on stdout. Logs go to stderr.
//!
//! Usage:
//!   genesyscloud-reconcile apply genesyscloud_team team.json --state team.state.json
//!   genesyscloud-reconcile destroy genesyscloud_team team.state.json
//!   genesyscloud-reconcile lookup genesyscloud_user user.json

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use genesyscloud::GenesysCloudProvider;
use reconcile::{Context, DynamicValue, LocalState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "genesyscloud-reconcile")]
#[command(about = "Reconcile Genesys Cloud entities against JSON declarations")]
struct Cli {
    /// Provider configuration; unset settings fall back to GENESYSCLOUD_* env vars
    #[arg(long, global = true)]
    provider: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, update or replace an entity until it matches its declaration
    Apply {
        kind: String,
        declared: PathBuf,
        /// State document from a previous run
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Refresh a state document from the remote side
    Read { kind: String, state: PathBuf },
    /// Delete the entity a state document points at
    Destroy { kind: String, state: PathBuf },
    /// Adopt an existing entity by id
    Import { kind: String, id: String },
    /// Resolve a data source
    Lookup { kind: String, config: PathBuf },
    /// List the supported entity kinds and data sources
    Kinds,
}

/// What `apply`, `read`, `destroy` and `import` print, and what they read back
#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    kind: String,
    updated_at: DateTime<Utc>,
    state: LocalState,
}

fn read_json(path: &Path) -> Result<DynamicValue, BoxError> {
    let data = std::fs::read(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    Ok(DynamicValue::decode_json(&data)?)
}

fn read_state(path: &Path, kind: &str) -> Result<LocalState, BoxError> {
    let data = std::fs::read(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let document: StateDocument = serde_json::from_slice(&data)?;
    if document.kind != kind {
        return Err(format!(
            "{} holds state for {}, not {}",
            path.display(),
            document.kind,
            kind
        )
        .into());
    }
    Ok(document.state)
}

fn print_state(kind: &str, state: LocalState) -> Result<(), BoxError> {
    let document = StateDocument {
        kind: kind.to_string(),
        updated_at: Utc::now(),
        state,
    };
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn configure(path: Option<&Path>) -> Result<GenesysCloudProvider, BoxError> {
    let config = match path {
        Some(path) => read_json(path)?,
        None => DynamicValue::empty_object(),
    };

    let mut provider = GenesysCloudProvider::new();
    let diags = provider.configure(&config);
    if diags.has_errors() {
        let messages: Vec<String> = diags.errors.iter().map(ToString::to_string).collect();
        return Err(messages.join("; ").into());
    }
    Ok(provider)
}

/// Ctrl-C stops every retry loop at its next check
fn interruptible() -> Context {
    let ctx = Context::new();
    let handle = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping");
            handle.cancel();
        }
    });
    ctx
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    if let Command::Kinds = cli.command {
        let provider = GenesysCloudProvider::new();
        let mut kinds: Vec<&String> = provider.resource_schemas().keys().collect();
        kinds.sort();
        for kind in kinds {
            println!("resource     {}", kind);
        }
        let mut lookups: Vec<&String> = provider.data_source_schemas().keys().collect();
        lookups.sort();
        for kind in lookups {
            println!("data source  {}", kind);
        }
        return Ok(());
    }

    let provider = configure(cli.provider.as_deref())?;
    let ctx = interruptible();

    match cli.command {
        Command::Apply {
            kind,
            declared,
            state,
        } => {
            let handle = provider.create_resource(&kind)?;
            let declared = read_json(&declared)?;
            let mut current = match state {
                Some(path) => read_state(&path, &kind)?,
                None => LocalState::absent(),
            };
            let result = handle.apply(&ctx, &mut current, &declared).await;
            // a failed apply still prints state so the id survives
            print_state(&kind, current)?;
            result?;
        }
        Command::Read { kind, state } => {
            let handle = provider.create_resource(&kind)?;
            let mut current = read_state(&state, &kind)?;
            handle.read(&ctx, &mut current).await?;
            print_state(&kind, current)?;
        }
        Command::Destroy { kind, state } => {
            let handle = provider.create_resource(&kind)?;
            let mut current = read_state(&state, &kind)?;
            let result = handle.delete(&ctx, &mut current).await;
            print_state(&kind, current)?;
            result?;
        }
        Command::Import { kind, id } => {
            let handle = provider.create_resource(&kind)?;
            let imported = handle.import(&ctx, &id).await?;
            print_state(&kind, imported)?;
        }
        Command::Lookup { kind, config } => {
            let data_source = provider.create_data_source(&kind)?;
            let config = read_json(&config)?;
            let found = data_source.read(&ctx, &config).await?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Command::Kinds => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_env("GENESYSCLOUD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        return Err(e);
    }
    Ok(())
}

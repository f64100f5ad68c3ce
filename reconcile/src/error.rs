//! Error types for reconcile

use crate::resource::Lifecycle;
use crate::types::Dynamic;
use std::fmt;
use std::time::Duration;

/// Coarse classification of a failed remote call, derived from its status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    NotFound,
    BadRequest,
    VersionConflict,
    RateLimited,
    ServerBusy,
    Unauthorized,
    /// No response was received at all
    Transport,
    Other,
}

/// A failed call against the remote API as seen at the proxy boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}{message}", status_prefix(.status))]
pub struct RemoteError {
    /// HTTP-style status code; None when the request never got a response
    pub status: Option<u16>,
    pub message: String,
    pub correlation_id: Option<String>,
    /// Server supplied hint for how long to wait before the next attempt
    pub retry_after: Option<Duration>,
}

fn status_prefix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {}: ", code),
        None => "transport failure: ".to_string(),
    }
}

impl RemoteError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            correlation_id: None,
            retry_after: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            correlation_id: None,
            retry_after: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn kind(&self) -> RemoteErrorKind {
        match self.status {
            None => RemoteErrorKind::Transport,
            Some(404) => RemoteErrorKind::NotFound,
            Some(409) => RemoteErrorKind::VersionConflict,
            // The platform reports stale versions as a plain 400 on some endpoints
            Some(400) if self.message.to_lowercase().contains("version") => {
                RemoteErrorKind::VersionConflict
            }
            Some(400) => RemoteErrorKind::BadRequest,
            Some(401) | Some(403) => RemoteErrorKind::Unauthorized,
            Some(429) => RemoteErrorKind::RateLimited,
            Some(code) if code >= 500 => RemoteErrorKind::ServerBusy,
            Some(_) => RemoteErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == RemoteErrorKind::NotFound
    }
}

/// Failure of a name lookup
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("no entity named '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// The lifecycle step an error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
    AwaitReady,
    ConfirmDelete,
    Lookup,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phrase = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Import => "import",
            Operation::AwaitReady => "await readiness of",
            Operation::ConfirmDelete => "confirm deletion of",
            Operation::Lookup => "look up",
        };
        f.write_str(phrase)
    }
}

/// Declared value that did not show up in the state read back after a write
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("attribute '{attribute}' expected {expected} but found {actual}")]
pub struct Inconsistency {
    pub attribute: String,
    pub expected: Dynamic,
    pub actual: Dynamic,
}

/// Error taxonomy callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    VersionConflict,
    RateLimited,
    ServerBusy,
    Timeout,
    Cancelled,
    Inconsistent,
    Terminal,
}

/// Error type for reconcile operations
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invalid {kind} configuration: {message}")]
    Validation { kind: String, message: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("{kind} named '{name}' not found")]
    NameNotFound { kind: String, name: String },

    #[error("failed to {operation} {kind}{}: {source}", id_suffix(.id))]
    Remote {
        kind: String,
        id: Option<String>,
        operation: Operation,
        #[source]
        source: RemoteError,
    },

    #[error("{kind} {id} is not ready yet (status {status})")]
    NotReady {
        kind: String,
        id: String,
        status: String,
    },

    #[error("{kind} {id} still exists")]
    StillExists { kind: String, id: String },

    #[error("{kind} {id} is in an inconsistent state: {source}")]
    Inconsistent {
        kind: String,
        id: String,
        #[source]
        source: Inconsistency,
    },

    #[error(
        "timed out after {elapsed:?} ({attempts} attempts) trying to {operation} {kind}{}: {last}",
        id_suffix(.id)
    )]
    Timeout {
        kind: String,
        id: Option<String>,
        operation: Operation,
        elapsed: Duration,
        attempts: u32,
        #[source]
        last: Box<ReconcileError>,
    },

    #[error("cancelled while trying to {operation} {kind}{}", id_suffix(.id))]
    Cancelled {
        kind: String,
        id: Option<String>,
        operation: Operation,
    },

    #[error("cannot {operation} {kind} while it is {from:?}")]
    InvalidTransition {
        kind: String,
        operation: Operation,
        from: Lifecycle,
    },

    #[error("Type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("attribute '{0}' not found")]
    AttributeNotFound(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),
}

fn id_suffix(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" {}", id),
        None => String::new(),
    }
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Validation { .. } => ErrorKind::Validation,
            ReconcileError::NotFound { .. } | ReconcileError::NameNotFound { .. } => {
                ErrorKind::NotFound
            }
            ReconcileError::Remote { source, .. } => match source.kind() {
                RemoteErrorKind::NotFound => ErrorKind::NotFound,
                RemoteErrorKind::VersionConflict => ErrorKind::VersionConflict,
                RemoteErrorKind::RateLimited => ErrorKind::RateLimited,
                RemoteErrorKind::ServerBusy | RemoteErrorKind::Transport => ErrorKind::ServerBusy,
                _ => ErrorKind::Terminal,
            },
            ReconcileError::Timeout { .. } => ErrorKind::Timeout,
            ReconcileError::Cancelled { .. } => ErrorKind::Cancelled,
            ReconcileError::Inconsistent { .. } => ErrorKind::Inconsistent,
            _ => ErrorKind::Terminal,
        }
    }

    /// The remote failure underneath, if any
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            ReconcileError::Remote { source, .. } => Some(source),
            ReconcileError::Timeout { last, .. } => last.remote(),
            _ => None,
        }
    }
}

/// Result type alias for reconcile operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

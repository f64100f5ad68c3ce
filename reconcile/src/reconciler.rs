//! Lifecycle driver
//!
//! A `Reconciler` moves one entity instance between lifecycle states by
//! composing its resource's proxy with bounded retries. Every step mutates
//! the caller's `LocalState` as it goes, so an id obtained before a later
//! step fails is never lost.
//!
//! ```text
//! Absent --create--> Creating --ready + consistent--> Active
//! Active --update--> Updating --consistent--> Active
//! Active --delete--> Deleting --gone--> Absent
//! any step that exhausts its budget ---------------> Failed (id kept)
//! Failed/Creating --resume--> ready --------------> Active
//! ```

use crate::consistency::ConsistencyCheck;
use crate::context::Context;
use crate::error::{Operation, ReconcileError, RemoteError, Result};
use crate::proxy::{EntityProxy, Readiness, RemoteEntity};
use crate::resource::{
    EntityOf, Lifecycle, LocalState, ManagedResource, RemoteClassifier, SpecPurpose,
};
use crate::retry::{classify, with_retries, Classification, RetryError, RetryPolicy};
use crate::schema::Schema;
use crate::types::{AttributePath, DynamicValue};
use async_trait::async_trait;
use std::time::Duration;

/// Lift a remote classifier to lifecycle errors. Readiness, lingering
/// entities and stale reads are always worth another attempt.
fn lift(remote: RemoteClassifier) -> impl Fn(&ReconcileError) -> Classification + Send + Sync {
    move |error: &ReconcileError| match error {
        ReconcileError::Remote { source, .. } => remote(source),
        ReconcileError::NotReady { .. }
        | ReconcileError::StillExists { .. }
        | ReconcileError::Inconsistent { .. } => Classification::Retryable,
        _ => Classification::Terminal,
    }
}

/// Anything the server says, short of 404, is retried
fn persistent(error: &ReconcileError) -> Classification {
    match error {
        ReconcileError::Remote { source, .. } if source.is_not_found() => {
            Classification::Terminal
        }
        ReconcileError::Remote { source, .. } => match source.retry_after {
            Some(wait) => Classification::RetryAfter(wait),
            None => Classification::Retryable,
        },
        ReconcileError::StillExists { .. } => Classification::Retryable,
        _ => Classification::Terminal,
    }
}

pub struct Reconciler<R> {
    resource: R,
    backoff: RetryPolicy,
}

impl<R: ManagedResource> Reconciler<R> {
    pub fn new(resource: R) -> Self {
        Self {
            resource,
            backoff: RetryPolicy::default(),
        }
    }

    /// Delay shape used for every phase; budgets still come from the
    /// resource's timeouts
    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    fn policy(&self, budget: Duration) -> RetryPolicy {
        RetryPolicy {
            budget,
            ..self.backoff
        }
    }

    fn kind(&self) -> String {
        self.resource.type_name().to_string()
    }

    fn remote(&self, operation: Operation, id: Option<&str>, source: RemoteError) -> ReconcileError {
        ReconcileError::Remote {
            kind: self.kind(),
            id: id.map(str::to_string),
            operation,
            source,
        }
    }

    /// Collapse a retry outcome into a lifecycle error. A confirming read
    /// that never converged reports the inconsistency itself.
    fn settle(
        &self,
        operation: Operation,
        id: Option<&str>,
        error: RetryError<ReconcileError>,
    ) -> ReconcileError {
        match error {
            RetryError::Terminal(error) => error,
            RetryError::Timeout {
                last: error @ ReconcileError::Inconsistent { .. },
                ..
            } => error,
            RetryError::Timeout {
                elapsed,
                attempts,
                last,
            } => ReconcileError::Timeout {
                kind: self.kind(),
                id: id.map(str::to_string),
                operation,
                elapsed,
                attempts,
                last: Box::new(last),
            },
            RetryError::Cancelled { .. } => ReconcileError::Cancelled {
                kind: self.kind(),
                id: id.map(str::to_string),
                operation,
            },
        }
    }

    fn invalid_transition(&self, operation: Operation, from: Lifecycle) -> ReconcileError {
        ReconcileError::InvalidTransition {
            kind: self.kind(),
            operation,
            from,
        }
    }

    /// Schema checks plus the resource's cross-field rules. Nothing remote
    /// happens when this fails.
    pub fn validate(&self, declared: &DynamicValue) -> Result<()> {
        let mut diags = self.resource.schema().validate(declared);
        self.resource.validate(declared, &mut diags);
        for warning in &diags.warnings {
            tracing::warn!("{}: {}", self.resource.type_name(), warning);
        }
        diags.into_result(self.resource.type_name())
    }

    pub async fn create(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        declared: &DynamicValue,
    ) -> Result<()> {
        if state.lifecycle != Lifecycle::Absent {
            return Err(self.invalid_transition(Operation::Create, state.lifecycle));
        }
        self.validate(declared)?;
        let declared = &self.resource.schema().apply_defaults(declared)?;

        state.lifecycle = Lifecycle::Creating;
        let result = self.create_inner(ctx, state, declared).await;
        if let Err(e) = &result {
            tracing::warn!("Failed to create {}: {}", self.resource.type_name(), e);
            state.lifecycle = if state.id.is_some() {
                Lifecycle::Failed
            } else {
                Lifecycle::Absent
            };
        }
        result
    }

    async fn create_inner(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        declared: &DynamicValue,
    ) -> Result<()> {
        let type_name = self.resource.type_name();
        let proxy = self.resource.proxy();
        let spec = self
            .resource
            .build_spec(ctx, declared, SpecPurpose::Create)
            .await?;
        let spec = &spec;

        tracing::info!("Creating {}", type_name);
        let classifier = lift(self.resource.create_classifier());
        let entity = with_retries(
            ctx,
            &self.policy(self.resource.timeouts().create),
            &classifier,
            || async move {
                proxy
                    .create(spec)
                    .await
                    .map_err(|e| self.remote(Operation::Create, None, e))
            },
        )
        .await
        .map_err(|e| self.settle(Operation::Create, None, e))?;

        let id = entity.id().to_string();
        state.id = Some(id.clone());
        tracing::info!("Created {} {}", type_name, id);

        self.await_ready(ctx, &id, entity).await?;

        if self.resource.update_after_create(declared) {
            tracing::debug!("Applying post-create update to {} {}", type_name, id);
            let entity = self.apply_update(ctx, &id, declared).await?;
            self.await_ready(ctx, &id, entity).await?;
        }

        self.resource.after_create(ctx, &id, declared).await?;
        self.confirm(ctx, state, &id, declared, Operation::Create)
            .await
    }

    /// Poll until the entity reports ready. `entity` is the write's response.
    async fn await_ready(&self, ctx: &Context, id: &str, entity: EntityOf<R>) -> Result<()> {
        match entity.readiness() {
            Readiness::Ready => return Ok(()),
            Readiness::Pending(status) => tracing::debug!(
                "{} {} is {}, waiting for it to become ready",
                self.resource.type_name(),
                id,
                status
            ),
            Readiness::Deleted => {}
        }
        self.poll_ready(ctx, id).await
    }

    async fn poll_ready(&self, ctx: &Context, id: &str) -> Result<()> {
        let proxy = self.resource.proxy();
        let classifier = lift(classify::eventual_consistency);
        with_retries(
            ctx,
            &self.policy(self.resource.timeouts().ready),
            &classifier,
            || async move {
                let entity = proxy
                    .get_by_id(id)
                    .await
                    .map_err(|e| self.remote(Operation::AwaitReady, Some(id), e))?;
                match entity.readiness() {
                    Readiness::Ready => Ok(()),
                    Readiness::Pending(status) => Err(ReconcileError::NotReady {
                        kind: self.kind(),
                        id: id.to_string(),
                        status,
                    }),
                    Readiness::Deleted => Err(ReconcileError::NotReady {
                        kind: self.kind(),
                        id: id.to_string(),
                        status: "deleted".to_string(),
                    }),
                }
            },
        )
        .await
        .map_err(|e| self.settle(Operation::AwaitReady, Some(id), e))
    }

    /// Send the update, refetching the current version before every
    /// attempt so a conflict is retried against fresh state
    async fn apply_update(
        &self,
        ctx: &Context,
        id: &str,
        declared: &DynamicValue,
    ) -> Result<EntityOf<R>> {
        let proxy = self.resource.proxy();
        let spec = self
            .resource
            .build_spec(ctx, declared, SpecPurpose::Update)
            .await?;
        let spec = &spec;

        let classifier = lift(self.resource.update_classifier());
        with_retries(
            ctx,
            &self.policy(self.resource.timeouts().update),
            &classifier,
            || async move {
                let current = proxy
                    .get_by_id(id)
                    .await
                    .map_err(|e| self.remote(Operation::Update, Some(id), e))?;
                let version = current.version();
                tracing::debug!(
                    "Updating {} {} at version {:?}",
                    self.resource.type_name(),
                    id,
                    version
                );
                proxy
                    .update(id, spec, version)
                    .await
                    .map_err(|e| self.remote(Operation::Update, Some(id), e))
            },
        )
        .await
        .map_err(|e| self.settle(Operation::Update, Some(id), e))
    }

    /// Read the entity back until it reflects `declared`, then record it
    async fn confirm(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        id: &str,
        declared: &DynamicValue,
        operation: Operation,
    ) -> Result<()> {
        let proxy = self.resource.proxy();
        let check = &ConsistencyCheck::new(declared, self.resource.schema());
        let classifier = lift(classify::eventual_consistency);

        let values = with_retries(
            ctx,
            &self.policy(self.resource.timeouts().read),
            &classifier,
            || async move {
                let entity = proxy
                    .get_by_id(id)
                    .await
                    .map_err(|e| self.remote(Operation::Read, Some(id), e))?;
                let mut values = declared.clone();
                self.resource.flatten(&entity, &mut values)?;
                values.set_string(&AttributePath::new("id"), id.to_string())?;
                check
                    .check(&values)
                    .map_err(|source| ReconcileError::Inconsistent {
                        kind: self.kind(),
                        id: id.to_string(),
                        source,
                    })?;
                Ok(values)
            },
        )
        .await
        .map_err(|e| self.settle(operation, Some(id), e))?;

        state.values = values;
        state.lifecycle = Lifecycle::Active;
        tracing::info!("{} {} is active", self.resource.type_name(), id);
        Ok(())
    }

    /// Refresh local state from the remote side. An entity that no longer
    /// exists leaves the state Absent rather than failing.
    pub async fn read(&self, ctx: &Context, state: &mut LocalState) -> Result<()> {
        self.refresh(ctx, state, Operation::Read).await
    }

    async fn refresh(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        operation: Operation,
    ) -> Result<()> {
        let Some(id) = state.id.clone() else {
            state.lifecycle = Lifecycle::Absent;
            return Ok(());
        };

        let proxy = self.resource.proxy();
        let id_ref = id.as_str();
        let fetched = with_retries(
            ctx,
            &self.policy(self.resource.timeouts().read),
            &persistent,
            || async move {
                proxy
                    .get_by_id(id_ref)
                    .await
                    .map_err(|e| self.remote(operation, Some(id_ref), e))
            },
        )
        .await;

        match fetched {
            Ok(entity) if entity.readiness() == Readiness::Deleted => {
                tracing::info!("{} {} has been deleted", self.resource.type_name(), id);
                clear(state);
                Ok(())
            }
            Ok(entity) => {
                let mut values = state.values.clone();
                self.resource.flatten(&entity, &mut values)?;
                values.set_string(&AttributePath::new("id"), id.clone())?;
                state.values = values;
                match entity.readiness() {
                    // a create that never saw the entity ready is still unfinished
                    Readiness::Pending(status)
                        if matches!(state.lifecycle, Lifecycle::Creating | Lifecycle::Failed) =>
                    {
                        tracing::debug!(
                            "{} {} is still {}, keeping it {:?}",
                            self.resource.type_name(),
                            id,
                            status,
                            state.lifecycle
                        );
                    }
                    _ => state.lifecycle = Lifecycle::Active,
                }
                Ok(())
            }
            Err(RetryError::Terminal(e)) if e.remote().is_some_and(RemoteError::is_not_found) => {
                tracing::info!("{} {} no longer exists", self.resource.type_name(), id);
                clear(state);
                Ok(())
            }
            Err(e) => Err(self.settle(operation, Some(&id), e)),
        }
    }

    /// Finish an entity an earlier run left Creating or Failed: wait for it
    /// to report ready, then record what the server holds
    pub async fn resume(&self, ctx: &Context, state: &mut LocalState) -> Result<()> {
        let id = match (&state.lifecycle, &state.id) {
            (Lifecycle::Creating | Lifecycle::Failed, Some(id)) => id.clone(),
            _ => return Err(self.invalid_transition(Operation::AwaitReady, state.lifecycle)),
        };

        tracing::info!("Resuming {} {}", self.resource.type_name(), id);
        if let Err(e) = self.poll_ready(ctx, &id).await {
            tracing::warn!("{} {} never became ready: {}", self.resource.type_name(), id, e);
            state.lifecycle = Lifecycle::Failed;
            return Err(e);
        }
        state.lifecycle = Lifecycle::Active;
        self.refresh(ctx, state, Operation::Read).await
    }

    pub async fn update(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        declared: &DynamicValue,
    ) -> Result<()> {
        let id = match (&state.lifecycle, &state.id) {
            (Lifecycle::Active, Some(id)) => id.clone(),
            _ => return Err(self.invalid_transition(Operation::Update, state.lifecycle)),
        };
        self.validate(declared)?;
        let declared = &self.resource.schema().apply_defaults(declared)?;

        state.lifecycle = Lifecycle::Updating;
        let result = self.update_inner(ctx, state, &id, declared).await;
        if let Err(e) = &result {
            tracing::warn!("Failed to update {} {}: {}", self.resource.type_name(), id, e);
            state.lifecycle = Lifecycle::Failed;
        }
        result
    }

    async fn update_inner(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        id: &str,
        declared: &DynamicValue,
    ) -> Result<()> {
        tracing::info!("Updating {} {}", self.resource.type_name(), id);
        let entity = self.apply_update(ctx, id, declared).await?;
        self.await_ready(ctx, id, entity).await?;
        self.resource.after_update(ctx, id, declared).await?;
        self.confirm(ctx, state, id, declared, Operation::Update)
            .await
    }

    /// Delete and wait until reads stop returning the entity. Deleting
    /// something already gone succeeds.
    pub async fn delete(&self, ctx: &Context, state: &mut LocalState) -> Result<()> {
        let Some(id) = state.id.clone() else {
            clear(state);
            return Ok(());
        };

        state.lifecycle = Lifecycle::Deleting;
        match self.delete_inner(ctx, &id).await {
            Ok(()) => {
                tracing::info!("Deleted {} {}", self.resource.type_name(), id);
                clear(state);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to delete {} {}: {}", self.resource.type_name(), id, e);
                state.lifecycle = Lifecycle::Failed;
                Err(e)
            }
        }
    }

    async fn delete_inner(&self, ctx: &Context, id: &str) -> Result<()> {
        let proxy = self.resource.proxy();
        let timeouts = self.resource.timeouts();

        let classifier = lift(self.resource.delete_classifier());
        with_retries(ctx, &self.policy(timeouts.delete), &classifier, || async move {
            match proxy.delete(id).await {
                Err(e) if e.is_not_found() => {
                    tracing::debug!("{} {} was already gone", self.resource.type_name(), id);
                    Ok(())
                }
                other => other.map_err(|e| self.remote(Operation::Delete, Some(id), e)),
            }
        })
        .await
        .map_err(|e| self.settle(Operation::Delete, Some(id), e))?;

        with_retries(
            ctx,
            &self.policy(timeouts.confirm_delete),
            &persistent,
            || async move {
                match proxy.get_by_id(id).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(self.remote(Operation::ConfirmDelete, Some(id), e)),
                    Ok(entity) if entity.readiness() == Readiness::Deleted => Ok(()),
                    Ok(_) => Err(ReconcileError::StillExists {
                        kind: self.kind(),
                        id: id.to_string(),
                    }),
                }
            },
        )
        .await
        .map_err(|e| self.settle(Operation::ConfirmDelete, Some(id), e))
    }

    /// Adopt an existing remote entity
    pub async fn import(&self, ctx: &Context, id: &str) -> Result<LocalState> {
        let mut state = LocalState::existing(id);
        self.refresh(ctx, &mut state, Operation::Import).await?;
        if state.is_absent() {
            return Err(ReconcileError::NotFound {
                kind: self.kind(),
                id: id.to_string(),
            });
        }
        tracing::info!("Imported {} {}", self.resource.type_name(), id);
        Ok(state)
    }

    /// Attributes whose change can only be applied by replacing the entity
    pub fn requires_replace(&self, state: &LocalState, declared: &DynamicValue) -> Vec<String> {
        let mut changed: Vec<String> = self
            .resource
            .schema()
            .attributes()
            .filter(|attr| attr.force_new)
            .filter(|attr| {
                let path = AttributePath::new(&attr.name);
                attr.differs(declared.get(&path), state.values.get(&path))
            })
            .map(|attr| attr.name.clone())
            .collect();

        if let Some(reason) = self.resource.requires_replace(&state.values, declared) {
            if !changed.contains(&reason) {
                changed.push(reason);
            }
        }
        changed
    }

    /// Whether applying `declared` would change anything state records,
    /// including attributes the declaration dropped
    pub fn has_changes(&self, state: &LocalState, declared: &DynamicValue) -> bool {
        self.resource
            .schema()
            .attributes()
            .filter(|attr| !attr.is_computed_only())
            .any(|attr| {
                let path = AttributePath::new(&attr.name);
                attr.differs(declared.get(&path), state.values.get(&path))
            })
    }
}

fn clear(state: &mut LocalState) {
    state.id = None;
    state.values = DynamicValue::empty_object();
    state.lifecycle = Lifecycle::Absent;
}

/// Object-safe view of a Reconciler, so drivers can hold every kind in one
/// collection
#[async_trait]
pub trait ResourceHandle: Send + Sync {
    fn type_name(&self) -> &str;

    fn schema(&self) -> &Schema;

    fn validate(&self, declared: &DynamicValue) -> Result<()>;

    async fn create(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        declared: &DynamicValue,
    ) -> Result<()>;

    async fn read(&self, ctx: &Context, state: &mut LocalState) -> Result<()>;

    async fn update(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        declared: &DynamicValue,
    ) -> Result<()>;

    async fn delete(&self, ctx: &Context, state: &mut LocalState) -> Result<()>;

    async fn resume(&self, ctx: &Context, state: &mut LocalState) -> Result<()>;

    async fn import(&self, ctx: &Context, id: &str) -> Result<LocalState>;

    fn requires_replace(&self, state: &LocalState, declared: &DynamicValue) -> Vec<String>;

    fn has_changes(&self, state: &LocalState, declared: &DynamicValue) -> bool;

    /// Converge `state` on `declared` from wherever it currently is:
    /// refresh, then create, replace, update or leave alone.
    async fn apply(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        declared: &DynamicValue,
    ) -> Result<()> {
        self.validate(declared)?;

        if state.id.is_some() {
            self.read(ctx, state).await?;
        } else {
            state.lifecycle = Lifecycle::Absent;
        }

        if matches!(state.lifecycle, Lifecycle::Creating | Lifecycle::Failed) {
            self.resume(ctx, state).await?;
        }

        if state.is_absent() {
            return self.create(ctx, state, declared).await;
        }

        let replace = self.requires_replace(state, declared);
        if !replace.is_empty() {
            tracing::info!(
                "Replacing {} {} because {} changed",
                self.type_name(),
                state.id.as_deref().unwrap_or_default(),
                replace.join(", ")
            );
            self.delete(ctx, state).await?;
            return self.create(ctx, state, declared).await;
        }

        if !self.has_changes(state, declared) {
            tracing::info!(
                "{} {} is up to date",
                self.type_name(),
                state.id.as_deref().unwrap_or_default()
            );
            return Ok(());
        }

        self.update(ctx, state, declared).await
    }
}

#[async_trait]
impl<R: ManagedResource> ResourceHandle for Reconciler<R> {
    fn type_name(&self) -> &str {
        self.resource.type_name()
    }

    fn schema(&self) -> &Schema {
        self.resource.schema()
    }

    fn validate(&self, declared: &DynamicValue) -> Result<()> {
        Reconciler::validate(self, declared)
    }

    async fn create(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        declared: &DynamicValue,
    ) -> Result<()> {
        Reconciler::create(self, ctx, state, declared).await
    }

    async fn read(&self, ctx: &Context, state: &mut LocalState) -> Result<()> {
        Reconciler::read(self, ctx, state).await
    }

    async fn update(
        &self,
        ctx: &Context,
        state: &mut LocalState,
        declared: &DynamicValue,
    ) -> Result<()> {
        Reconciler::update(self, ctx, state, declared).await
    }

    async fn delete(&self, ctx: &Context, state: &mut LocalState) -> Result<()> {
        Reconciler::delete(self, ctx, state).await
    }

    async fn resume(&self, ctx: &Context, state: &mut LocalState) -> Result<()> {
        Reconciler::resume(self, ctx, state).await
    }

    async fn import(&self, ctx: &Context, id: &str) -> Result<LocalState> {
        Reconciler::import(self, ctx, id).await
    }

    fn requires_replace(&self, state: &LocalState, declared: &DynamicValue) -> Vec<String> {
        Reconciler::requires_replace(self, state, declared)
    }

    fn has_changes(&self, state: &LocalState, declared: &DynamicValue) -> bool {
        Reconciler::has_changes(self, state, declared)
    }
}

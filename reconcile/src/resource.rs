//! ManagedResource trait and local state
//!
//! A ManagedResource describes one entity kind: its schema, its proxy, how
//! declared state becomes a request and how a fetched entity flows back into
//! state. The Reconciler drives the lifecycle around these pieces.

use crate::context::Context;
use crate::error::{RemoteError, Result};
use crate::proxy::EntityProxy;
use crate::retry::{classify, Classification};
use crate::schema::Schema;
use crate::types::{Diagnostics, DynamicValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where an entity instance is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Absent,
    Creating,
    Active,
    Updating,
    Deleting,
    /// An unrecoverable error left the remote side indeterminate
    Failed,
}

/// What the caller persists between invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalState {
    pub id: Option<String>,
    pub values: DynamicValue,
    pub lifecycle: Lifecycle,
}

impl LocalState {
    pub fn absent() -> Self {
        Self {
            id: None,
            values: DynamicValue::empty_object(),
            lifecycle: Lifecycle::Absent,
        }
    }

    /// State for an entity that exists remotely but has not been read yet
    pub fn existing(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            values: DynamicValue::empty_object(),
            lifecycle: Lifecycle::Active,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.lifecycle == Lifecycle::Absent
    }
}

impl Default for LocalState {
    fn default() -> Self {
        Self::absent()
    }
}

/// Per-phase time budgets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    pub create: Duration,
    /// Waiting for asynchronous provisioning after a write
    pub ready: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
    /// Waiting for a deleted entity to disappear
    pub confirm_delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30),
            ready: Duration::from_secs(60),
            read: Duration::from_secs(120),
            update: Duration::from_secs(30),
            delete: Duration::from_secs(30),
            confirm_delete: Duration::from_secs(30),
        }
    }
}

impl Timeouts {
    /// The same budget for every phase
    pub fn uniform(budget: Duration) -> Self {
        Self {
            create: budget,
            ready: budget,
            read: budget,
            update: budget,
            delete: budget,
            confirm_delete: budget,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecPurpose {
    Create,
    Update,
}

pub type RemoteClassifier = fn(&RemoteError) -> Classification;

pub type EntityOf<R> = <<R as ManagedResource>::Proxy as EntityProxy>::Entity;
pub type SpecOf<R> = <<R as ManagedResource>::Proxy as EntityProxy>::Spec;

/// One entity kind, as seen by the Reconciler
#[async_trait]
pub trait ManagedResource: Sized + Send + Sync + 'static {
    type Proxy: EntityProxy;

    /// Type name should be constant (e.g., "genesyscloud_team")
    fn type_name(&self) -> &'static str;

    /// Cache this in your implementation
    fn schema(&self) -> &Schema;

    fn proxy(&self) -> &Self::Proxy;

    /// Cross-field checks the schema cannot express
    fn validate(&self, _declared: &DynamicValue, _diagnostics: &mut Diagnostics) {}

    /// Build the remote request from declared state
    async fn build_spec(
        &self,
        ctx: &Context,
        declared: &DynamicValue,
        purpose: SpecPurpose,
    ) -> Result<SpecOf<Self>>;

    /// Write the fetched entity into state. Attributes the server does not
    /// return (secrets) must be left as they are.
    fn flatten(&self, entity: &EntityOf<Self>, state: &mut DynamicValue) -> Result<()>;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    fn create_classifier(&self) -> RemoteClassifier {
        classify::transient
    }

    fn update_classifier(&self) -> RemoteClassifier {
        classify::version_conflict
    }

    fn delete_classifier(&self) -> RemoteClassifier {
        classify::transient
    }

    /// Some kinds cannot be created in their final state and need an update
    /// straight after creation
    fn update_after_create(&self, _declared: &DynamicValue) -> bool {
        false
    }

    /// Names the attribute whose change from `prior` to `declared` needs
    /// delete-and-recreate, beyond what force_new attributes already cover
    fn requires_replace(&self, _prior: &DynamicValue, _declared: &DynamicValue) -> Option<String> {
        None
    }

    /// Runs after the entity exists and is ready, before the confirming read
    async fn after_create(&self, _ctx: &Context, _id: &str, _declared: &DynamicValue) -> Result<()> {
        Ok(())
    }

    async fn after_update(&self, _ctx: &Context, _id: &str, _declared: &DynamicValue) -> Result<()> {
        Ok(())
    }
}

//! reconcile - retry-driven reconciliation against eventually consistent APIs
//!
//! Drives a remote entity through create, read, update and delete until the
//! remote side agrees with what was declared. Remote calls go through an
//! [`EntityProxy`]; every call that can observe stale data runs inside a
//! bounded [`with_retries`] loop, and every write is confirmed by reading it
//! back.

// Core modules
pub mod context;
pub mod error;
pub mod schema;
pub mod types;

// Lifecycle
pub mod consistency;
pub mod proxy;
pub mod reconciler;
pub mod resource;
pub mod retry;

// Helper modules
pub mod cache;
pub mod data_source;
pub mod validator;

// Re-exports for convenience
pub use cache::{NameCache, NameSource};
pub use consistency::ConsistencyCheck;
pub use context::Context;
pub use data_source::DataSource;
pub use error::{ErrorKind, LookupError, Operation, ReconcileError, RemoteError, Result};
pub use proxy::{EntityProxy, Page, Readiness, RemoteEntity};
pub use reconciler::{Reconciler, ResourceHandle};
pub use resource::{Lifecycle, LocalState, ManagedResource, SpecPurpose, Timeouts};
pub use retry::{with_retries, Classification, RetryError, RetryPolicy};
pub use schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
pub use types::{AttributePath, Diagnostics, Dynamic, DynamicValue};

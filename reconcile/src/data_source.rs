//! DataSource trait
//!
//! A data source resolves a human-readable description of an existing
//! entity (usually its name) into state. It never writes anything remote.

use crate::context::Context;
use crate::error::{LookupError, ReconcileError, Result};
use crate::schema::Schema;
use crate::types::DynamicValue;
use async_trait::async_trait;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Type name should be constant (e.g., "genesyscloud_user")
    fn type_name(&self) -> &str;

    /// Cache this in your implementation
    fn schema(&self) -> &Schema;

    /// Must populate `id` and echo the lookup attributes
    async fn read(&self, ctx: &Context, config: &DynamicValue) -> Result<DynamicValue>;

    /// Schema validation; runs before `read` touches anything remote
    fn validate(&self, config: &DynamicValue) -> Result<()> {
        self.schema().validate(config).into_result(self.type_name())
    }
}

/// Map a lookup failure for `name` onto the reconcile error taxonomy
pub fn lookup_error(kind: &str, error: LookupError) -> ReconcileError {
    match error {
        LookupError::NotFound(name) => ReconcileError::NameNotFound {
            kind: kind.to_string(),
            name,
        },
        LookupError::Remote(source) => ReconcileError::Remote {
            kind: kind.to_string(),
            id: None,
            operation: crate::error::Operation::Lookup,
            source,
        },
    }
}

//! Resource implementations

pub mod integration_credential;
pub mod outbound_contact_list_contact;
pub mod outbound_sequence;
pub mod processautomation_trigger;
pub mod team;
pub mod trunkbasesettings;
pub mod webdeployments_deployment;

pub use integration_credential::CredentialResource;
pub use outbound_contact_list_contact::ContactResource;
pub use outbound_sequence::OutboundSequenceResource;
pub use processautomation_trigger::TriggerResource;
pub use team::TeamResource;
pub use trunkbasesettings::TrunkBaseSettingsResource;
pub use webdeployments_deployment::WebDeploymentResource;

use crate::api::ApiError;
use reconcile::{Operation, ReconcileError, RetryError};

/// Wrap an API failure that happened outside the reconciler's own calls
pub(crate) fn api_failure(
    kind: &str,
    id: Option<&str>,
    operation: Operation,
    error: ApiError,
) -> ReconcileError {
    ReconcileError::Remote {
        kind: kind.to_string(),
        id: id.map(str::to_string),
        operation,
        source: error.to_remote(),
    }
}

/// Collapse a retried API call into a lifecycle error
pub(crate) fn retry_failure(
    kind: &str,
    id: Option<&str>,
    operation: Operation,
    error: RetryError<ApiError>,
) -> ReconcileError {
    match error {
        RetryError::Terminal(error) => api_failure(kind, id, operation, error),
        RetryError::Timeout {
            elapsed,
            attempts,
            last,
        } => ReconcileError::Timeout {
            kind: kind.to_string(),
            id: id.map(str::to_string),
            operation,
            elapsed,
            attempts,
            last: Box::new(api_failure(kind, id, operation, last)),
        },
        RetryError::Cancelled { .. } => ReconcileError::Cancelled {
            kind: kind.to_string(),
            id: id.map(str::to_string),
            operation,
        },
    }
}

pub(crate) fn invalid(kind: &str, message: impl Into<String>) -> ReconcileError {
    ReconcileError::Validation {
        kind: kind.to_string(),
        message: message.into(),
    }
}

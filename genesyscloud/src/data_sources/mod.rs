//! Data source implementations

pub mod responsemanagement_response;
pub mod user;

pub use responsemanagement_response::ResponseDataSource;
pub use user::{UserDataSource, UserDirectory, UserKey};

use reconcile::data_source::lookup_error;
use reconcile::retry::classify;
use reconcile::{Classification, LookupError, Operation, ReconcileError, RetryError};
use std::time::Duration;

/// How long a lookup keeps retrying an entity that was just created elsewhere
pub const DEFAULT_LOOKUP_BUDGET: Duration = Duration::from_secs(15);

/// A name that is not there yet may still be propagating
pub(crate) fn retry_missing(error: &LookupError) -> Classification {
    match error {
        LookupError::NotFound(_) => Classification::Retryable,
        LookupError::Remote(source) => classify::transient(source),
    }
}

pub(crate) fn settle_lookup(kind: &str, error: RetryError<LookupError>) -> ReconcileError {
    match error {
        RetryError::Terminal(error) | RetryError::Timeout { last: error, .. } => {
            lookup_error(kind, error)
        }
        RetryError::Cancelled { .. } => ReconcileError::Cancelled {
            kind: kind.to_string(),
            id: None,
            operation: Operation::Lookup,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{ErrorKind, RemoteError};

    #[test]
    fn missing_names_are_retried_but_auth_failures_are_not() {
        assert_eq!(
            retry_missing(&LookupError::NotFound("Ann".to_string())),
            Classification::Retryable
        );
        assert_eq!(
            retry_missing(&LookupError::Remote(RemoteError::new(401, "expired"))),
            Classification::Terminal
        );
    }

    #[test]
    fn exhausted_lookup_reports_the_missing_name() {
        let error = settle_lookup(
            "genesyscloud_user",
            RetryError::Timeout {
                elapsed: Duration::from_secs(15),
                attempts: 12,
                last: LookupError::NotFound("ann@example.com".to_string()),
            },
        );

        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(error.to_string().contains("ann@example.com"));
    }
}

//! Test helpers for the Genesys Cloud API

use super::{Client, RetryConfig};
use reconcile::{RetryPolicy, Timeouts};
use std::time::Duration;

/// Client against a mock server that gives up on transient failures quickly
#[allow(clippy::disallowed_methods)]
pub fn create_test_client(url: &str) -> Client {
    Client::with_config(
        url,
        "test-token",
        RetryConfig {
            max_elapsed_ms: 200,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            timeout_seconds: 5,
        },
    )
    .unwrap()
}

/// Reconciler backoff for tests
pub fn quick_backoff() -> RetryPolicy {
    RetryPolicy::default()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(20))
}

pub fn short_timeouts() -> Timeouts {
    Timeouts::uniform(Duration::from_millis(300))
}

//! Genesys Cloud platform API client

pub mod client;
pub mod common;
pub mod error;
pub mod pool;

pub mod integrations;
pub mod outbound;
pub mod processautomation;
pub mod responsemanagement;
pub mod teams;
pub mod telephony;
pub mod users;
pub mod webdeployments;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::{Client, RetryConfig, CORRELATION_HEADER};
pub use common::{ApiQueryParams, DomainEntityRef, EntityListing, PaginationParams};
pub use error::ApiError;

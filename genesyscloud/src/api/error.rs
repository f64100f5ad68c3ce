use reconcile::RemoteError;
use std::time::Duration;
use thiserror::Error;

use super::common::ApiErrorDetails;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error (HTTP {status}): {message}")]
    ApiError {
        status: u16,
        message: String,
        #[source]
        details: Option<Box<ApiErrorDetails>>,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Too many requests, rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Service unavailable (HTTP {status}), retry later")]
    ServiceUnavailable { status: u16 },
}

impl ApiError {
    /// HTTP status of the failed call, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestError(e) => e.status().map(|s| s.as_u16()),
            ApiError::ApiError { status, .. } => Some(*status),
            ApiError::AuthError(_) => Some(401),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::ServiceUnavailable { status } => Some(*status),
            ApiError::ParseError(_) | ApiError::Timeout(_) => None,
        }
    }

    /// The proxy-boundary view of this failure. Status codes carry over
    /// unchanged so the reconcile classifiers see what the server said.
    pub fn to_remote(&self) -> RemoteError {
        match self {
            ApiError::ApiError {
                status,
                message,
                details,
            } => {
                let error = RemoteError::new(*status, message.clone());
                match details.as_ref().and_then(|d| d.context_id.clone()) {
                    Some(context_id) => error.with_correlation_id(context_id),
                    None => error,
                }
            }
            ApiError::RateLimited { retry_after } => {
                let error = RemoteError::new(429, self.to_string());
                match retry_after {
                    Some(wait) => error.with_retry_after(*wait),
                    None => error,
                }
            }
            ApiError::ServiceUnavailable { status } => RemoteError::new(*status, self.to_string()),
            ApiError::AuthError(_) => RemoteError::new(401, self.to_string()),
            ApiError::Timeout(_) => RemoteError::transport(self.to_string()),
            ApiError::RequestError(e) => match e.status() {
                Some(status) => RemoteError::new(status.as_u16(), self.to_string()),
                None => RemoteError::transport(self.to_string()),
            },
            // The server answered but the body made no sense; retrying will not help
            ApiError::ParseError(_) => RemoteError::new(200, self.to_string()),
        }
    }
}

impl From<ApiError> for RemoteError {
    fn from(error: ApiError) -> Self {
        error.to_remote()
    }
}

use reconcile::retry::classify;
use reconcile::{with_retries, Context, RetryPolicy};
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::common::{ApiErrorDetails, ApiErrorResponse, ApiQueryParams};
use super::error::ApiError;
use super::pool::{ConnectionPoolConfig, ConnectionPoolManager, ConnectionStats, RequestOutcome};

/// Header the platform echoes back so a request can be traced in its logs
pub const CORRELATION_HEADER: &str = "ININ-Correlation-Id";

/// Genesys Cloud API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    access_token: String,
    retry_config: RetryConfig,
    pool_manager: ConnectionPoolManager,
}

/// Transport-level retries for rate limits, busy servers and dropped
/// connections. Semantic retries (404 after create, version conflicts) live
/// in the reconciler, not here.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_elapsed_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_elapsed_ms: 10_000,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            timeout_seconds: 30,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::with_budget(Duration::from_millis(self.max_elapsed_ms))
            .initial_delay(Duration::from_millis(self.initial_backoff_ms))
            .max_delay(Duration::from_millis(self.max_backoff_ms))
    }
}

impl Client {
    /// Create a new API client with default configuration
    pub fn new(base_url: &str, access_token: &str) -> Result<Self, ApiError> {
        Self::with_config(base_url, access_token, RetryConfig::default())
    }

    /// Create a new API client with custom retry configuration
    pub fn with_config(
        base_url: &str,
        access_token: &str,
        retry_config: RetryConfig,
    ) -> Result<Self, ApiError> {
        let pool_config = ConnectionPoolConfig {
            request_timeout: Duration::from_secs(retry_config.timeout_seconds),
            ..Default::default()
        };

        let pool_manager = ConnectionPoolManager::new(pool_config);
        let http_client = pool_manager.build_client()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: base_url.trim_end_matches('/').to_string(),
                access_token: access_token.to_string(),
                retry_config,
                pool_manager,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Execute a GET request with retry logic
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute_with_retry(Method::GET, path, None::<&()>).await
    }

    /// Execute a GET request with query parameters
    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &ApiQueryParams,
    ) -> Result<T, ApiError> {
        let full_path = format!("{}{}", path, params.to_query_string());
        self.get(&full_path).await
    }

    /// Execute a POST request with retry logic
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_with_retry(Method::POST, path, Some(body)).await
    }

    /// Execute a PUT request with retry logic
    pub async fn put<T: DeserializeOwned, B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_with_retry(Method::PUT, path, Some(body)).await
    }

    /// Execute a PATCH request with retry logic
    pub async fn patch<T: DeserializeOwned, B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_with_retry(Method::PATCH, path, Some(body)).await
    }

    /// Execute a DELETE request with retry logic
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute_with_retry(Method::DELETE, path, None::<&()>).await
    }

    /// Get connection pool statistics
    pub async fn get_connection_stats(&self) -> ConnectionStats {
        self.inner.pool_manager.get_stats().await
    }

    pub fn teams(&self) -> crate::api::teams::TeamsApi<'_> {
        crate::api::teams::TeamsApi::new(self)
    }

    pub fn outbound(&self) -> crate::api::outbound::OutboundApi<'_> {
        crate::api::outbound::OutboundApi::new(self)
    }

    pub fn process_automation(&self) -> crate::api::processautomation::ProcessAutomationApi<'_> {
        crate::api::processautomation::ProcessAutomationApi::new(self)
    }

    pub fn web_deployments(&self) -> crate::api::webdeployments::WebDeploymentsApi<'_> {
        crate::api::webdeployments::WebDeploymentsApi::new(self)
    }

    pub fn telephony(&self) -> crate::api::telephony::TelephonyApi<'_> {
        crate::api::telephony::TelephonyApi::new(self)
    }

    pub fn integrations(&self) -> crate::api::integrations::IntegrationsApi<'_> {
        crate::api::integrations::IntegrationsApi::new(self)
    }

    pub fn users(&self) -> crate::api::users::UsersApi<'_> {
        crate::api::users::UsersApi::new(self)
    }

    pub fn response_management(
        &self,
    ) -> crate::api::responsemanagement::ResponseManagementApi<'_> {
        crate::api::responsemanagement::ResponseManagementApi::new(self)
    }

    /// Execute request with retry logic. Every attempt gets a fresh
    /// correlation id.
    async fn execute_with_retry<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        let url = format!("{}{}", self.inner.base_url, path);
        let url = url.as_str();
        let method = &method;
        let ctx = Context::new();
        let classifier = |error: &ApiError| classify::transient(&error.to_remote());

        let outcome = with_retries(
            &ctx,
            &self.inner.retry_config.policy(),
            &classifier,
            || async move {
                let correlation_id = uuid::Uuid::new_v4().to_string();
                tracing::debug!("{} request to: {} ({})", method, url, correlation_id);

                let mut request = self
                    .inner
                    .http_client
                    .request(method.clone(), url)
                    .bearer_auth(&self.inner.access_token)
                    .header(CORRELATION_HEADER, &correlation_id);
                if let Some(body) = body {
                    request = request.json(body);
                }

                let response = request.send().await;
                self.handle_response(response, &correlation_id).await
            },
        )
        .await;

        outcome.map_err(|failure| {
            failure
                .into_last()
                .unwrap_or(ApiError::ServiceUnavailable { status: 503 })
        })
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Result<reqwest::Response, reqwest::Error>,
        correlation_id: &str,
    ) -> Result<T, ApiError> {
        let pool = &self.inner.pool_manager;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                pool.record_request(RequestOutcome::Failure).await;
                if e.is_timeout() {
                    return Err(ApiError::Timeout(self.inner.retry_config.timeout_seconds));
                }
                return Err(ApiError::RequestError(e));
            }
        };

        let status = response.status();
        tracing::debug!("Response {} for correlation id {}", status, correlation_id);

        if status.is_success() {
            pool.record_request(RequestOutcome::Success).await;
            return self.parse_success_response(response).await;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            pool.record_request(RequestOutcome::RateLimited).await;
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            tracing::warn!("Rate limited, retry after {:?}", retry_after);
            return Err(ApiError::RateLimited { retry_after });
        }

        pool.record_request(RequestOutcome::Failure).await;

        if status == StatusCode::UNAUTHORIZED {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::AuthError(text));
        }

        if status.is_server_error() {
            tracing::warn!("Server error {} for correlation id {}", status, correlation_id);
            return Err(ApiError::ServiceUnavailable {
                status: status.as_u16(),
            });
        }

        self.handle_error_response(response).await
    }

    /// Parse successful response. Empty bodies parse as JSON null so callers
    /// can ask for `()` or an `Option`.
    async fn parse_success_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        tracing::trace!("API response body: {}", text);

        let body = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str::<T>(body).map_err(|e| {
            tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
            ApiError::ParseError(format!("Failed to parse response: {}", e))
        })
    }

    /// Handle error response
    async fn handle_error_response<T>(&self, response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let (message, details) = match serde_json::from_str::<ApiErrorResponse>(&text) {
            Ok(body) => (
                body.message.clone().unwrap_or_else(|| text.clone()),
                Some(Box::new(ApiErrorDetails::from(body))),
            ),
            Err(_) => (text, None),
        };

        Err(ApiError::ApiError {
            status,
            message,
            details,
        })
    }
}

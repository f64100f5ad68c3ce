//! Common types and utilities for the Genesys Cloud API

use reconcile::Page;
use serde::{Deserialize, Serialize};

/// Standard paginated listing envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityListing<T> {
    pub entities: Option<Vec<T>>,
    pub page_size: Option<u32>,
    pub page_number: Option<u32>,
    pub total: Option<u64>,
    pub page_count: Option<u32>,
}

impl<T> Default for EntityListing<T> {
    fn default() -> Self {
        Self {
            entities: None,
            page_size: None,
            page_number: None,
            total: None,
            page_count: None,
        }
    }
}

impl<T> From<EntityListing<T>> for Page<T> {
    fn from(listing: EntityListing<T>) -> Self {
        Page {
            entities: listing.entities,
            page_count: listing.page_count,
            total: listing.total,
        }
    }
}

/// Reference to another entity by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEntityRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_uri: Option<String>,
}

impl DomainEntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            self_uri: None,
        }
    }
}

/// Error body returned by the platform on non-2xx responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub message: Option<String>,
    pub code: Option<String>,
    pub status: Option<u16>,
    pub context_id: Option<String>,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
#[error("API error details: code={code:?}, context_id={context_id:?}, details={details:?}")]
pub struct ApiErrorDetails {
    pub code: Option<String>,
    pub context_id: Option<String>,
    pub details: Vec<String>,
}

impl From<ApiErrorResponse> for ApiErrorDetails {
    fn from(response: ApiErrorResponse) -> Self {
        Self {
            code: response.code,
            context_id: response.context_id,
            details: response.details.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiQueryParams {
    params: Vec<(String, String)>,
}

impl ApiQueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    pub fn extend(mut self, other: ApiQueryParams) -> Self {
        self.params.extend(other.params);
        self
    }

    pub fn to_query_string(&self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaginationParams {
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
}

impl PaginationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(page_number: u32, page_size: u32) -> Self {
        Self::new()
            .with_page_number(page_number)
            .with_page_size(page_size)
    }

    pub fn with_page_number(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn to_query_params(&self) -> ApiQueryParams {
        ApiQueryParams::new()
            .add_optional("pageSize", self.page_size)
            .add_optional("pageNumber", self.page_number)
    }
}

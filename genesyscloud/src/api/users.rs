//! Users API implementation (read-only)

use super::common::{EntityListing, PaginationParams};
use super::{ApiError, Client};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchCriteria {
    #[serde(rename = "type")]
    pub criteria_type: String,
    pub fields: Vec<String>,
    pub value: String,
}

impl UserSearchCriteria {
    pub fn exact(field: &str, value: &str) -> Self {
        Self {
            criteria_type: "EXACT".to_string(),
            fields: vec![field.to_string()],
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchRequest {
    pub sort_by: String,
    pub sort_order: String,
    pub query: Vec<UserSearchCriteria>,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchResponse {
    pub total: Option<u64>,
    pub results: Option<Vec<User>>,
}

pub struct UsersApi<'a> {
    client: &'a Client,
}

impl<'a> UsersApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list(&self, page: &PaginationParams) -> Result<EntityListing<User>, ApiError> {
        self.client
            .get_with_params("/api/v2/users", &page.to_query_params())
            .await
    }

    /// Exact match on a single field, first result by email
    pub async fn search_exact(&self, field: &str, value: &str) -> Result<Vec<User>, ApiError> {
        let request = UserSearchRequest {
            sort_by: "email".to_string(),
            sort_order: "ASC".to_string(),
            query: vec![UserSearchCriteria::exact(field, value)],
        };
        let response: UserSearchResponse = self.client.post("/api/v2/users/search", &request).await?;
        Ok(response.results.unwrap_or_default())
    }
}

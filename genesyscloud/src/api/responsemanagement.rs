//! Response management (canned responses) API implementation

use super::common::{DomainEntityRef, EntityListing, PaginationParams};
use super::{ApiError, Client};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseText {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub libraries: Vec<DomainEntityRef>,
    #[serde(default)]
    pub texts: Vec<ResponseText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

pub struct ResponseManagementApi<'a> {
    client: &'a Client,
}

impl<'a> ResponseManagementApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn path(id: &str) -> String {
        format!(
            "/api/v2/responsemanagement/responses/{}",
            urlencoding::encode(id)
        )
    }

    pub async fn list_responses(
        &self,
        library_id: Option<&str>,
        page: &PaginationParams,
    ) -> Result<EntityListing<Response>, ApiError> {
        let params = page.to_query_params().add_optional("libraryId", library_id);
        self.client
            .get_with_params("/api/v2/responsemanagement/responses", &params)
            .await
    }

    pub async fn get_response(&self, id: &str) -> Result<Response, ApiError> {
        self.client.get(&Self::path(id)).await
    }

    pub async fn create_response(&self, response: &Response) -> Result<Response, ApiError> {
        self.client
            .post("/api/v2/responsemanagement/responses", response)
            .await
    }

    pub async fn update_response(&self, id: &str, response: &Response) -> Result<Response, ApiError> {
        self.client.put(&Self::path(id), response).await
    }

    pub async fn delete_response(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&Self::path(id)).await
    }
}

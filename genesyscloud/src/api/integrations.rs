//! Integration credential API implementation

use super::common::{EntityListing, PaginationParams};
use super::{ApiError, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialType {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    /// Write-only; the platform never returns secrets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_fields: Option<HashMap<String, String>>,
}

pub struct IntegrationsApi<'a> {
    client: &'a Client,
}

impl<'a> IntegrationsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list_credentials(
        &self,
        page: &PaginationParams,
    ) -> Result<EntityListing<Credential>, ApiError> {
        self.client
            .get_with_params("/api/v2/integrations/credentials", &page.to_query_params())
            .await
    }

    pub async fn get_credential(&self, id: &str) -> Result<Credential, ApiError> {
        self.client
            .get(&format!(
                "/api/v2/integrations/credentials/{}",
                urlencoding::encode(id)
            ))
            .await
    }

    pub async fn create_credential(&self, credential: &Credential) -> Result<Credential, ApiError> {
        self.client
            .post("/api/v2/integrations/credentials", credential)
            .await
    }

    pub async fn update_credential(
        &self,
        id: &str,
        credential: &Credential,
    ) -> Result<Credential, ApiError> {
        self.client
            .put(
                &format!(
                    "/api/v2/integrations/credentials/{}",
                    urlencoding::encode(id)
                ),
                credential,
            )
            .await
    }

    pub async fn delete_credential(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!(
                "/api/v2/integrations/credentials/{}",
                urlencoding::encode(id)
            ))
            .await
    }
}

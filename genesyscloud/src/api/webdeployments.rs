//! Web messaging deployment API implementation

use super::common::{DomainEntityRef, EntityListing};
use super::{ApiError, Client};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationVersionRef {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDeployment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_all_domains: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ConfigurationVersionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<DomainEntityRef>,
    /// Pending, Active, Inactive, Error or Deleting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One published (or draft) version of a deployment configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationVersion {
    pub id: String,
    pub name: Option<String>,
    pub version: String,
    pub status: Option<String>,
}

pub struct WebDeploymentsApi<'a> {
    client: &'a Client,
}

impl<'a> WebDeploymentsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// The platform returns every deployment in one response
    pub async fn list(&self) -> Result<EntityListing<WebDeployment>, ApiError> {
        self.client.get("/api/v2/webdeployments/deployments").await
    }

    pub async fn get(&self, id: &str) -> Result<WebDeployment, ApiError> {
        self.client
            .get(&format!(
                "/api/v2/webdeployments/deployments/{}",
                urlencoding::encode(id)
            ))
            .await
    }

    pub async fn create(&self, deployment: &WebDeployment) -> Result<WebDeployment, ApiError> {
        self.client
            .post("/api/v2/webdeployments/deployments", deployment)
            .await
    }

    pub async fn update(
        &self,
        id: &str,
        deployment: &WebDeployment,
    ) -> Result<WebDeployment, ApiError> {
        self.client
            .put(
                &format!(
                    "/api/v2/webdeployments/deployments/{}",
                    urlencoding::encode(id)
                ),
                deployment,
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!(
                "/api/v2/webdeployments/deployments/{}",
                urlencoding::encode(id)
            ))
            .await
    }

    pub async fn configuration_versions(
        &self,
        configuration_id: &str,
    ) -> Result<Vec<ConfigurationVersion>, ApiError> {
        let listing: EntityListing<ConfigurationVersion> = self
            .client
            .get(&format!(
                "/api/v2/webdeployments/configurations/{}/versions",
                urlencoding::encode(configuration_id)
            ))
            .await?;
        Ok(listing.entities.unwrap_or_default())
    }
}

/// Highest numbered version, ignoring drafts
pub fn latest_version(versions: &[ConfigurationVersion]) -> Option<String> {
    versions
        .iter()
        .filter(|v| !v.version.eq_ignore_ascii_case("draft"))
        .filter_map(|v| v.version.parse::<u64>().ok())
        .max()
        .map(|v| v.to_string())
}

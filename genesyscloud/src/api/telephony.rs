//! Telephony edge trunk base settings API implementation

use super::common::{ApiQueryParams, DomainEntityRef, EntityListing, PaginationParams};
use super::{ApiError, Client};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrunkBase {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// active, inactive or deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trunk_metabase: Option<DomainEntityRef>,
    pub trunk_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

pub struct TelephonyApi<'a> {
    client: &'a Client,
}

impl<'a> TelephonyApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn path(id: &str) -> String {
        format!(
            "/api/v2/telephony/providers/edges/trunkbasesettings/{}",
            urlencoding::encode(id)
        )
    }

    pub async fn list_trunk_base_settings(
        &self,
        page: &PaginationParams,
    ) -> Result<EntityListing<TrunkBase>, ApiError> {
        self.client
            .get_with_params(
                "/api/v2/telephony/providers/edges/trunkbasesettings",
                &page.to_query_params(),
            )
            .await
    }

    /// Hidden properties are left out so reads compare cleanly with what was sent
    pub async fn get_trunk_base_settings(&self, id: &str) -> Result<TrunkBase, ApiError> {
        self.client
            .get_with_params(
                &Self::path(id),
                &ApiQueryParams::new().add("ignoreHidden", true),
            )
            .await
    }

    pub async fn create_trunk_base_settings(
        &self,
        trunk_base: &TrunkBase,
    ) -> Result<TrunkBase, ApiError> {
        self.client
            .post("/api/v2/telephony/providers/edges/trunkbasesettings", trunk_base)
            .await
    }

    pub async fn update_trunk_base_settings(
        &self,
        id: &str,
        trunk_base: &TrunkBase,
    ) -> Result<TrunkBase, ApiError> {
        self.client.put(&Self::path(id), trunk_base).await
    }

    pub async fn delete_trunk_base_settings(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&Self::path(id)).await
    }
}

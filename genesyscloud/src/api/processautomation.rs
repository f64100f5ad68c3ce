//! Process automation trigger API implementation

use super::common::{EntityListing, PaginationParams};
use super::{ApiError, Client};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerTarget {
    #[serde(rename = "type")]
    pub target_type: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub topic_name: String,
    pub enabled: bool,
    pub target: TriggerTarget,
    /// Criteria are passed through as raw JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_criteria: Option<serde_json::Value>,
    #[serde(rename = "eventTTLSeconds", skip_serializing_if = "Option::is_none")]
    pub event_ttl_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_by_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

pub struct ProcessAutomationApi<'a> {
    client: &'a Client,
}

impl<'a> ProcessAutomationApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list_triggers(
        &self,
        page: &PaginationParams,
    ) -> Result<EntityListing<Trigger>, ApiError> {
        self.client
            .get_with_params("/api/v2/processautomation/triggers", &page.to_query_params())
            .await
    }

    pub async fn get_trigger(&self, id: &str) -> Result<Trigger, ApiError> {
        self.client
            .get(&format!(
                "/api/v2/processautomation/triggers/{}",
                urlencoding::encode(id)
            ))
            .await
    }

    pub async fn create_trigger(&self, trigger: &Trigger) -> Result<Trigger, ApiError> {
        self.client
            .post("/api/v2/processautomation/triggers", trigger)
            .await
    }

    pub async fn update_trigger(&self, id: &str, trigger: &Trigger) -> Result<Trigger, ApiError> {
        self.client
            .put(
                &format!(
                    "/api/v2/processautomation/triggers/{}",
                    urlencoding::encode(id)
                ),
                trigger,
            )
            .await
    }

    pub async fn delete_trigger(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!(
                "/api/v2/processautomation/triggers/{}",
                urlencoding::encode(id)
            ))
            .await
    }
}

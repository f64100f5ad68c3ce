//! Outbound sequence and contact list API implementation

use super::common::{DomainEntityRef, EntityListing, PaginationParams};
use super::{ApiError, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSequence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub campaigns: Vec<DomainEntityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_campaign: Option<u32>,
    /// on, off or complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing)]
    pub stop_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

/// A contact row in a contact list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialerContact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_list_id: Option<String>,
    /// Column name to value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callable: Option<bool>,
    /// Keyed by phone column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_status: Option<HashMap<String, PhoneNumberStatus>>,
    /// Keyed by media type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contactable_status: Option<HashMap<String, ContactableStatus>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumberStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactableStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contactable: Option<bool>,
}

pub struct OutboundApi<'a> {
    client: &'a Client,
}

impl<'a> OutboundApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list_sequences(
        &self,
        page: &PaginationParams,
    ) -> Result<EntityListing<CampaignSequence>, ApiError> {
        self.client
            .get_with_params("/api/v2/outbound/sequences", &page.to_query_params())
            .await
    }

    pub async fn get_sequence(&self, id: &str) -> Result<CampaignSequence, ApiError> {
        self.client
            .get(&format!("/api/v2/outbound/sequences/{}", urlencoding::encode(id)))
            .await
    }

    pub async fn create_sequence(
        &self,
        sequence: &CampaignSequence,
    ) -> Result<CampaignSequence, ApiError> {
        self.client.post("/api/v2/outbound/sequences", sequence).await
    }

    /// `sequence.version` must be the version last read
    pub async fn update_sequence(
        &self,
        id: &str,
        sequence: &CampaignSequence,
    ) -> Result<CampaignSequence, ApiError> {
        self.client
            .put(
                &format!("/api/v2/outbound/sequences/{}", urlencoding::encode(id)),
                sequence,
            )
            .await
    }

    pub async fn delete_sequence(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("/api/v2/outbound/sequences/{}", urlencoding::encode(id)))
            .await
    }

    fn contact_path(contact_list_id: &str, contact_id: &str) -> String {
        format!(
            "/api/v2/outbound/contactlists/{}/contacts/{}",
            urlencoding::encode(contact_list_id),
            urlencoding::encode(contact_id)
        )
    }

    /// Adds one contact; the platform answers with every contact it stored
    pub async fn create_contact(
        &self,
        contact_list_id: &str,
        contact: &DialerContact,
    ) -> Result<Vec<DialerContact>, ApiError> {
        self.client
            .post(
                &format!(
                    "/api/v2/outbound/contactlists/{}/contacts",
                    urlencoding::encode(contact_list_id)
                ),
                std::slice::from_ref(contact),
            )
            .await
    }

    pub async fn get_contact(
        &self,
        contact_list_id: &str,
        contact_id: &str,
    ) -> Result<DialerContact, ApiError> {
        self.client
            .get(&Self::contact_path(contact_list_id, contact_id))
            .await
    }

    pub async fn update_contact(
        &self,
        contact_list_id: &str,
        contact_id: &str,
        contact: &DialerContact,
    ) -> Result<DialerContact, ApiError> {
        self.client
            .put(&Self::contact_path(contact_list_id, contact_id), contact)
            .await
    }

    pub async fn delete_contact(&self, contact_list_id: &str, contact_id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&Self::contact_path(contact_list_id, contact_id))
            .await
    }
}

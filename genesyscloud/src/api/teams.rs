//! Teams API implementation

use super::common::{ApiQueryParams, DomainEntityRef, EntityListing, PaginationParams};
use super::{ApiError, Client};
use serde::{Deserialize, Serialize};

/// The platform accepts at most this many member ids per call
pub const MEMBER_BATCH_SIZE: usize = 25;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<DomainEntityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing)]
    pub member_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TeamMembers<'a> {
    member_ids: &'a [String],
}

/// Cursor-paged member listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamMemberListing {
    entities: Option<Vec<TeamMember>>,
    next_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberFailure {
    pub id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberAddResponse {
    pub entities: Option<Vec<TeamMember>>,
    pub failures: Option<Vec<MemberFailure>>,
}

pub struct TeamsApi<'a> {
    client: &'a Client,
}

impl<'a> TeamsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list(&self, page: &PaginationParams) -> Result<EntityListing<Team>, ApiError> {
        self.client
            .get_with_params("/api/v2/teams", &page.to_query_params())
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Team, ApiError> {
        self.client
            .get(&format!("/api/v2/teams/{}", urlencoding::encode(id)))
            .await
    }

    pub async fn create(&self, team: &Team) -> Result<Team, ApiError> {
        self.client.post("/api/v2/teams", team).await
    }

    /// Teams carry no version token; PATCH overwrites whatever is there
    pub async fn update(&self, id: &str, team: &Team) -> Result<Team, ApiError> {
        self.client
            .patch(&format!("/api/v2/teams/{}", urlencoding::encode(id)), team)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("/api/v2/teams/{}", urlencoding::encode(id)))
            .await
    }

    /// Every member, following the listing cursor
    pub async fn members(&self, id: &str) -> Result<Vec<TeamMember>, ApiError> {
        let mut members = Vec::new();
        let mut path = format!(
            "/api/v2/teams/{}/members{}",
            urlencoding::encode(id),
            ApiQueryParams::new().add("pageSize", 100).to_query_string()
        );

        loop {
            let listing: TeamMemberListing = self.client.get(&path).await?;
            let page = listing.entities.unwrap_or_default();
            let exhausted = page.is_empty();
            members.extend(page);

            match listing.next_uri {
                Some(next) if !exhausted => path = next,
                _ => break,
            }
        }

        tracing::debug!("Team {} has {} members", id, members.len());
        Ok(members)
    }

    pub async fn add_members(
        &self,
        id: &str,
        member_ids: &[String],
    ) -> Result<Vec<MemberFailure>, ApiError> {
        let path = format!("/api/v2/teams/{}/members", urlencoding::encode(id));
        let mut failures = Vec::new();

        for batch in member_ids.chunks(MEMBER_BATCH_SIZE) {
            let response: TeamMemberAddResponse = self
                .client
                .post(&path, &TeamMembers { member_ids: batch })
                .await?;
            failures.extend(response.failures.unwrap_or_default());
        }

        Ok(failures)
    }

    pub async fn remove_members(&self, id: &str, member_ids: &[String]) -> Result<(), ApiError> {
        for batch in member_ids.chunks(MEMBER_BATCH_SIZE) {
            let params = ApiQueryParams::new().add("id", batch.join(","));
            let path = format!(
                "/api/v2/teams/{}/members{}",
                urlencoding::encode(id),
                params.to_query_string()
            );
            self.client.delete::<()>(&path).await?;
        }
        Ok(())
    }
}

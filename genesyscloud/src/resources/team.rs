use crate::api::common::PaginationParams;
use crate::api::teams::Team;
use crate::api::{ApiError, Client, DomainEntityRef};
use async_trait::async_trait;
use reconcile::retry::classify;
use reconcile::validator::StringLengthValidator;
use reconcile::{
    with_retries, AttributeBuilder, AttributePath, AttributeType, Context, Dynamic, DynamicValue,
    EntityProxy, ManagedResource, Operation, Page, ReconcileError, RemoteEntity, RemoteError,
    Result, RetryPolicy, Schema, SchemaBuilder, SpecPurpose, Timeouts,
};
use std::sync::Arc;
use std::time::Duration;

use super::{api_failure, retry_failure};

pub const TYPE_NAME: &str = "genesyscloud_team";

/// A team and, when read individually, its member ids
#[derive(Debug, Clone)]
pub struct TeamEntity {
    pub team: Team,
    /// None for listing results, which carry no members
    pub member_ids: Option<Vec<String>>,
}

impl RemoteEntity for TeamEntity {
    fn id(&self) -> &str {
        self.team.id.as_deref().unwrap_or_default()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.team.name)
    }
}

pub struct TeamProxy {
    client: Arc<Client>,
}

impl TeamProxy {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EntityProxy for TeamProxy {
    type Entity = TeamEntity;
    type Spec = Team;

    async fn create(&self, spec: &Team) -> std::result::Result<TeamEntity, RemoteError> {
        let team = self.client.teams().create(spec).await?;
        Ok(TeamEntity {
            team,
            member_ids: None,
        })
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<TeamEntity, RemoteError> {
        let teams = self.client.teams();
        let team = teams.get(id).await?;
        let members = teams.members(id).await?;
        Ok(TeamEntity {
            team,
            member_ids: Some(members.into_iter().map(|m| m.id).collect()),
        })
    }

    async fn list_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> std::result::Result<Page<TeamEntity>, RemoteError> {
        let listing = self
            .client
            .teams()
            .list(&PaginationParams::page(page_number, page_size))
            .await?;
        Ok(Page::from(listing).map(|team| TeamEntity {
            team,
            member_ids: None,
        }))
    }

    async fn update(
        &self,
        id: &str,
        spec: &Team,
        _expected_version: Option<i64>,
    ) -> std::result::Result<TeamEntity, RemoteError> {
        let team = self.client.teams().update(id, spec).await?;
        Ok(TeamEntity {
            team,
            member_ids: None,
        })
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        Ok(self.client.teams().delete(id).await?)
    }
}

pub struct TeamResource {
    proxy: TeamProxy,
    schema: Schema,
    timeouts: Timeouts,
    backoff: RetryPolicy,
}

impl TeamResource {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            proxy: TeamProxy::new(client),
            schema: Self::schema_static(),
            timeouts: Timeouts {
                confirm_delete: Duration::from_secs(180),
                ..Timeouts::default()
            },
            backoff: RetryPolicy::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Delay shape for membership calls, normally the reconciler's own
    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn schema_static() -> Schema {
        SchemaBuilder::new()
            .version(1)
            .description("Genesys Cloud team")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .description("Team id")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .description("Team name")
                    .validator(Box::new(StringLengthValidator {
                        min: Some(1),
                        max: Some(255),
                    }))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("division_id", AttributeType::String)
                    .optional()
                    .computed()
                    .description("Division the team belongs to; defaults to the home division")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("description", AttributeType::String)
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "member_ids",
                    AttributeType::Set(Box::new(AttributeType::String)),
                )
                .optional()
                .description("User ids of the team members")
                .build(),
            )
            .build()
    }

    /// Bring membership in line with `member_ids`. A team created a moment
    /// ago may not accept members yet, so 404s are retried. Dropping
    /// `member_ids` from an update empties the team.
    async fn sync_members(
        &self,
        ctx: &Context,
        id: &str,
        declared: &DynamicValue,
        operation: Operation,
    ) -> Result<()> {
        let path = AttributePath::new("member_ids");
        let desired = match declared.get(&path) {
            None | Some(Dynamic::Null) if operation == Operation::Create => return Ok(()),
            None | Some(Dynamic::Null) => Vec::new(),
            Some(_) => declared.get_string_list(&path)?,
        };
        let current = match operation {
            Operation::Create => Vec::new(),
            _ => self
                .proxy
                .client
                .teams()
                .members(id)
                .await
                .map_err(|e| api_failure(TYPE_NAME, Some(id), operation, e))?
                .into_iter()
                .map(|m| m.id)
                .collect(),
        };

        let to_remove: Vec<String> = current
            .iter()
            .filter(|member| !desired.contains(member))
            .cloned()
            .collect();
        let to_add: Vec<String> = desired
            .iter()
            .filter(|member| !current.contains(member))
            .cloned()
            .collect();

        let teams = self.proxy.client.teams();
        let policy = RetryPolicy {
            budget: self.timeouts.update,
            ..self.backoff
        };
        let classifier = |error: &ApiError| classify::eventual_consistency(&error.to_remote());

        if !to_remove.is_empty() {
            tracing::info!("Removing {} members from team {}", to_remove.len(), id);
            with_retries(ctx, &policy, &classifier, || teams.remove_members(id, &to_remove))
                .await
                .map_err(|e| retry_failure(TYPE_NAME, Some(id), operation, e))?;
        }
        if to_add.is_empty() {
            return Ok(());
        }

        tracing::info!("Adding {} members to team {}", to_add.len(), id);
        let failures = with_retries(ctx, &policy, &classifier, || teams.add_members(id, &to_add))
            .await
            .map_err(|e| retry_failure(TYPE_NAME, Some(id), operation, e))?;

        if failures.is_empty() {
            return Ok(());
        }
        let rejected = failures
            .iter()
            .map(|f| {
                format!(
                    "{} ({})",
                    f.id.as_deref().unwrap_or("?"),
                    f.reason.as_deref().unwrap_or("no reason given")
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        Err(ReconcileError::Remote {
            kind: TYPE_NAME.to_string(),
            id: Some(id.to_string()),
            operation,
            source: RemoteError::new(400, format!("members rejected: {}", rejected)),
        })
    }
}

#[async_trait]
impl ManagedResource for TeamResource {
    type Proxy = TeamProxy;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn proxy(&self) -> &TeamProxy {
        &self.proxy
    }

    async fn build_spec(
        &self,
        _ctx: &Context,
        declared: &DynamicValue,
        _purpose: SpecPurpose,
    ) -> Result<Team> {
        Ok(Team {
            id: None,
            name: declared.get_string(&AttributePath::new("name"))?,
            division: declared
                .get_optional_string(&AttributePath::new("division_id"))?
                .map(DomainEntityRef::new),
            // PATCH leaves omitted fields alone, so a dropped description is sent empty
            description: Some(
                declared
                    .get_optional_string(&AttributePath::new("description"))?
                    .unwrap_or_default(),
            ),
            member_count: None,
        })
    }

    fn flatten(&self, entity: &TeamEntity, state: &mut DynamicValue) -> Result<()> {
        let team = &entity.team;
        state.set_string(&AttributePath::new("name"), team.name.clone())?;
        state.set_optional_string(
            &AttributePath::new("division_id"),
            team.division.as_ref().map(|d| d.id.clone()),
        )?;
        state.set_optional_string(&AttributePath::new("description"), team.description.clone())?;
        if let Some(member_ids) = &entity.member_ids {
            state.set_value(
                &AttributePath::new("member_ids"),
                Dynamic::string_list(member_ids),
            )?;
        }
        Ok(())
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // Teams have no version token, so a conflict cannot be fixed by refetching
    fn update_classifier(&self) -> reconcile::resource::RemoteClassifier {
        classify::transient
    }

    async fn after_create(&self, ctx: &Context, id: &str, declared: &DynamicValue) -> Result<()> {
        self.sync_members(ctx, id, declared, Operation::Create).await
    }

    async fn after_update(&self, ctx: &Context, id: &str, declared: &DynamicValue) -> Result<()> {
        self.sync_members(ctx, id, declared, Operation::Update).await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::api::test_helpers::{create_test_client, quick_backoff, short_timeouts};
    use mockito::{Matcher, Server};
    use reconcile::{Lifecycle, LocalState, Reconciler};

    fn reconciler(url: &str) -> Reconciler<TeamResource> {
        let resource = TeamResource::new(Arc::new(create_test_client(url)))
            .with_timeouts(short_timeouts())
            .with_backoff(quick_backoff());
        Reconciler::new(resource).with_backoff(quick_backoff())
    }

    fn declared(members: &[&str]) -> DynamicValue {
        DynamicValue::from_pairs([
            ("name", Dynamic::from("Support")),
            ("division_id", Dynamic::from("d-1")),
            ("member_ids", Dynamic::string_list(members.iter().copied())),
        ])
    }

    const TEAM: &str = r#"{"id":"t-1","name":"Support","division":{"id":"d-1"}}"#;

    #[tokio::test]
    async fn create_adds_members_and_confirms_them() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/api/v2/teams")
            .match_body(Matcher::PartialJsonString(
                r#"{"name":"Support","division":{"id":"d-1"}}"#.to_string(),
            ))
            .with_body(TEAM)
            .expect(1)
            .create_async()
            .await;
        let add = server
            .mock("POST", "/api/v2/teams/t-1/members")
            .match_body(Matcher::PartialJsonString(
                r#"{"memberIds":["u-1","u-2"]}"#.to_string(),
            ))
            .with_body(r#"{"entities":[{"id":"u-1"},{"id":"u-2"}]}"#)
            .expect(1)
            .create_async()
            .await;
        let _get = server
            .mock("GET", "/api/v2/teams/t-1")
            .with_body(TEAM)
            .create_async()
            .await;
        let _members = server
            .mock("GET", "/api/v2/teams/t-1/members?pageSize=100")
            .with_body(r#"{"entities":[{"id":"u-2"},{"id":"u-1"}]}"#)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let mut state = LocalState::absent();
        reconciler
            .create(&Context::new(), &mut state, &declared(&["u-1", "u-2"]))
            .await
            .unwrap();

        assert_eq!(state.id.as_deref(), Some("t-1"));
        assert_eq!(state.lifecycle, Lifecycle::Active);
        let mut members = state
            .values
            .get_string_list(&AttributePath::new("member_ids"))
            .unwrap();
        members.sort();
        assert_eq!(members, vec!["u-1", "u-2"]);
        create.assert_async().await;
        add.assert_async().await;
    }

    #[tokio::test]
    async fn update_replaces_changed_membership() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", "/api/v2/teams/t-1")
            .with_body(TEAM)
            .create_async()
            .await;
        // read before the update and again when diffing membership
        let _old_members = server
            .mock("GET", "/api/v2/teams/t-1/members?pageSize=100")
            .with_body(r#"{"entities":[{"id":"u-1"},{"id":"u-2"}]}"#)
            .expect(2)
            .create_async()
            .await;
        let _new_members = server
            .mock("GET", "/api/v2/teams/t-1/members?pageSize=100")
            .with_body(r#"{"entities":[{"id":"u-2"},{"id":"u-3"}]}"#)
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/api/v2/teams/t-1")
            .with_body(TEAM)
            .expect(1)
            .create_async()
            .await;
        let remove = server
            .mock("DELETE", "/api/v2/teams/t-1/members")
            .match_query(Matcher::UrlEncoded("id".into(), "u-1".into()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;
        let add = server
            .mock("POST", "/api/v2/teams/t-1/members")
            .match_body(Matcher::PartialJsonString(r#"{"memberIds":["u-3"]}"#.to_string()))
            .with_body(r#"{"entities":[{"id":"u-3"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let mut state = LocalState::existing("t-1");
        reconciler
            .update(&Context::new(), &mut state, &declared(&["u-2", "u-3"]))
            .await
            .unwrap();

        assert_eq!(state.lifecycle, Lifecycle::Active);
        patch.assert_async().await;
        remove.assert_async().await;
        add.assert_async().await;
    }

    #[tokio::test]
    async fn membership_retry_does_not_repeat_a_finished_removal() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", "/api/v2/teams/t-1")
            .with_body(TEAM)
            .create_async()
            .await;
        let _old_members = server
            .mock("GET", "/api/v2/teams/t-1/members?pageSize=100")
            .with_body(r#"{"entities":[{"id":"u-1"},{"id":"u-2"}]}"#)
            .expect(2)
            .create_async()
            .await;
        let _new_members = server
            .mock("GET", "/api/v2/teams/t-1/members?pageSize=100")
            .with_body(r#"{"entities":[{"id":"u-2"},{"id":"u-3"}]}"#)
            .create_async()
            .await;
        let _patch = server
            .mock("PATCH", "/api/v2/teams/t-1")
            .with_body(TEAM)
            .create_async()
            .await;
        let remove = server
            .mock("DELETE", "/api/v2/teams/t-1/members")
            .match_query(Matcher::UrlEncoded("id".into(), "u-1".into()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;
        // the new member is not visible to the members endpoint yet
        let not_yet = server
            .mock("POST", "/api/v2/teams/t-1/members")
            .with_status(404)
            .with_body(r#"{"message":"Not found","status":404}"#)
            .expect(1)
            .create_async()
            .await;
        let add = server
            .mock("POST", "/api/v2/teams/t-1/members")
            .with_body(r#"{"entities":[{"id":"u-3"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let mut state = LocalState::existing("t-1");
        reconciler
            .update(&Context::new(), &mut state, &declared(&["u-2", "u-3"]))
            .await
            .unwrap();

        remove.assert_async().await;
        not_yet.assert_async().await;
        add.assert_async().await;
    }

    #[tokio::test]
    async fn dropping_member_ids_and_description_clears_them() {
        let mut server = Server::new_async().await;
        let described = r#"{"id":"t-1","name":"Support","division":{"id":"d-1"},"description":"Tier 1"}"#;
        let _get_before = server
            .mock("GET", "/api/v2/teams/t-1")
            .with_body(described)
            .expect(2)
            .create_async()
            .await;
        let _get_after = server
            .mock("GET", "/api/v2/teams/t-1")
            .with_body(TEAM)
            .create_async()
            .await;
        let _old_members = server
            .mock("GET", "/api/v2/teams/t-1/members?pageSize=100")
            .with_body(r#"{"entities":[{"id":"u-1"}]}"#)
            .expect(3)
            .create_async()
            .await;
        let _no_members = server
            .mock("GET", "/api/v2/teams/t-1/members?pageSize=100")
            .with_body(r#"{"entities":[]}"#)
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/api/v2/teams/t-1")
            .match_body(Matcher::PartialJsonString(r#"{"description":""}"#.to_string()))
            .with_body(TEAM)
            .expect(1)
            .create_async()
            .await;
        let remove = server
            .mock("DELETE", "/api/v2/teams/t-1/members")
            .match_query(Matcher::UrlEncoded("id".into(), "u-1".into()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let ctx = Context::new();
        let mut state = LocalState::existing("t-1");
        reconciler.read(&ctx, &mut state).await.unwrap();

        let declared = DynamicValue::from_pairs([
            ("name", Dynamic::from("Support")),
            ("division_id", Dynamic::from("d-1")),
        ]);
        assert!(reconciler.has_changes(&state, &declared));
        reconciler.update(&ctx, &mut state, &declared).await.unwrap();

        assert_eq!(state.lifecycle, Lifecycle::Active);
        patch.assert_async().await;
        remove.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_members_fail_the_create_but_keep_the_id() {
        let mut server = Server::new_async().await;
        let _create = server
            .mock("POST", "/api/v2/teams")
            .with_body(TEAM)
            .create_async()
            .await;
        let _add = server
            .mock("POST", "/api/v2/teams/t-1/members")
            .with_body(r#"{"entities":[],"failures":[{"id":"u-9","reason":"USER_NOT_FOUND"}]}"#)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let mut state = LocalState::absent();
        let error = reconciler
            .create(&Context::new(), &mut state, &declared(&["u-9"]))
            .await
            .unwrap_err();

        assert!(error.to_string().contains("USER_NOT_FOUND"));
        assert_eq!(state.id.as_deref(), Some("t-1"));
        assert_eq!(state.lifecycle, Lifecycle::Failed);
    }

    #[tokio::test]
    async fn delete_is_confirmed_by_404() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/api/v2/teams/t-1")
            .with_status(204)
            .expect(1)
            .create_async()
            .await;
        let _gone = server
            .mock("GET", "/api/v2/teams/t-1")
            .with_status(404)
            .with_body(r#"{"message":"Not found","status":404}"#)
            .create_async()
            .await;

        let reconciler = reconciler(&server.url());
        let mut state = LocalState::existing("t-1");
        reconciler
            .delete(&Context::new(), &mut state)
            .await
            .unwrap();

        assert!(state.is_absent());
        assert!(state.id.is_none());
        delete.assert_async().await;
    }

    #[test]
    fn delete_confirmation_waits_three_minutes() {
        let client = Arc::new(Client::new("https://api.example.com", "token").unwrap());
        let resource = TeamResource::new(client);
        assert_eq!(resource.timeouts().confirm_delete, Duration::from_secs(180));
    }
}

use crate::api::common::PaginationParams;
use crate::api::Client;
use async_trait::async_trait;
use reconcile::{
    with_retries, AttributeBuilder, AttributePath, AttributeType, Context, DataSource,
    DynamicValue, NameCache, NameSource, RemoteError, Result, RetryPolicy, Schema, SchemaBuilder,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{retry_missing, settle_lookup, DEFAULT_LOOKUP_BUDGET};
use crate::resources::invalid;

pub const TYPE_NAME: &str = "genesyscloud_user";

const USERS_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserKey {
    Email(String),
    Name(String),
}

impl UserKey {
    fn search_field(&self) -> (&'static str, &str) {
        match self {
            UserKey::Email(email) => ("email", email),
            UserKey::Name(name) => ("name", name),
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (field, value) = self.search_field();
        write!(f, "{} {}", field, value)
    }
}

/// Every user in the organization, by email and by name
pub struct UserDirectory {
    client: Arc<Client>,
}

impl UserDirectory {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NameSource for UserDirectory {
    type Key = UserKey;

    async fn hydrate(&self) -> std::result::Result<Vec<(UserKey, String)>, RemoteError> {
        let users = self.client.users();
        let mut entries = Vec::new();
        let mut page_number = 1;

        loop {
            let listing = users
                .list(&PaginationParams::page(page_number, USERS_PAGE_SIZE))
                .await?;
            let page_count = listing.page_count;
            let page = listing.entities.unwrap_or_default();
            let returned = page.len();

            for user in page {
                if let Some(email) = user.email {
                    entries.push((UserKey::Email(email), user.id.clone()));
                }
                if let Some(name) = user.name {
                    entries.push((UserKey::Name(name), user.id));
                }
            }

            if returned < USERS_PAGE_SIZE as usize
                || page_count.is_some_and(|count| page_number >= count)
            {
                break;
            }
            page_number += 1;
        }

        tracing::debug!("Loaded {} user keys in {} pages", entries.len(), page_number);
        Ok(entries)
    }

    async fn search(&self, key: &UserKey) -> std::result::Result<Option<String>, RemoteError> {
        let (field, value) = key.search_field();
        let found = self.client.users().search_exact(field, value).await?;
        Ok(found.into_iter().next().map(|user| user.id))
    }
}

/// Looks a user up by email or name through the shared name cache
pub struct UserDataSource {
    cache: Arc<NameCache<UserDirectory>>,
    schema: Schema,
    lookup_budget: Duration,
}

impl UserDataSource {
    pub fn new(cache: Arc<NameCache<UserDirectory>>) -> Self {
        Self {
            cache,
            schema: Self::schema_static(),
            lookup_budget: DEFAULT_LOOKUP_BUDGET,
        }
    }

    pub fn with_lookup_budget(mut self, budget: Duration) -> Self {
        self.lookup_budget = budget;
        self
    }

    pub fn schema_static() -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Looks up a Genesys Cloud user by email or name")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("email", AttributeType::String)
                    .optional()
                    .description("Email address of the user")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .optional()
                    .description("Name of the user")
                    .build(),
            )
            .build()
    }

    fn key(config: &DynamicValue) -> Result<UserKey> {
        let email = config.get_optional_string(&AttributePath::new("email"))?;
        let name = config.get_optional_string(&AttributePath::new("name"))?;
        match (email, name) {
            (Some(email), _) => Ok(UserKey::Email(email)),
            (None, Some(name)) => Ok(UserKey::Name(name)),
            (None, None) => Err(invalid(TYPE_NAME, "no user search field specified")),
        }
    }
}

#[async_trait]
impl DataSource for UserDataSource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn read(&self, ctx: &Context, config: &DynamicValue) -> Result<DynamicValue> {
        self.validate(config)?;
        let key = &Self::key(config)?;
        let cache = &self.cache;

        let id = with_retries(
            ctx,
            &RetryPolicy::with_budget(self.lookup_budget),
            &retry_missing,
            || async move { cache.resolve(key).await },
        )
        .await
        .map_err(|e| settle_lookup(TYPE_NAME, e))?;
        tracing::debug!("Resolved user {} to {}", key, id);

        let mut state = config.clone();
        state.set_string(&AttributePath::new("id"), id)?;
        Ok(state)
    }
}

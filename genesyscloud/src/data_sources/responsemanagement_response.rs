use crate::api::common::PaginationParams;
use crate::api::responsemanagement::Response;
use crate::api::Client;
use async_trait::async_trait;
use reconcile::{
    with_retries, AttributeBuilder, AttributePath, AttributeType, Context, DataSource,
    DynamicValue, EntityProxy, Page, RemoteEntity, RemoteError, Result, RetryPolicy, Schema,
    SchemaBuilder,
};
use std::sync::Arc;
use std::time::Duration;

use super::{retry_missing, settle_lookup, DEFAULT_LOOKUP_BUDGET};

pub const TYPE_NAME: &str = "genesyscloud_responsemanagement_response";

impl RemoteEntity for Response {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn version(&self) -> Option<i64> {
        self.version
    }
}

/// Canned responses, optionally restricted to one library
pub struct ResponseProxy {
    client: Arc<Client>,
    library_id: Option<String>,
}

impl ResponseProxy {
    pub fn new(client: Arc<Client>, library_id: Option<String>) -> Self {
        Self { client, library_id }
    }
}

#[async_trait]
impl EntityProxy for ResponseProxy {
    type Entity = Response;
    type Spec = Response;

    async fn create(&self, spec: &Response) -> std::result::Result<Response, RemoteError> {
        Ok(self.client.response_management().create_response(spec).await?)
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<Response, RemoteError> {
        Ok(self.client.response_management().get_response(id).await?)
    }

    async fn list_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> std::result::Result<Page<Response>, RemoteError> {
        let listing = self
            .client
            .response_management()
            .list_responses(
                self.library_id.as_deref(),
                &PaginationParams::page(page_number, page_size),
            )
            .await?;
        Ok(listing.into())
    }

    async fn update(
        &self,
        id: &str,
        spec: &Response,
        expected_version: Option<i64>,
    ) -> std::result::Result<Response, RemoteError> {
        let response = Response {
            version: expected_version,
            ..spec.clone()
        };
        Ok(self
            .client
            .response_management()
            .update_response(id, &response)
            .await?)
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        Ok(self.client.response_management().delete_response(id).await?)
    }
}

pub struct ResponseDataSource {
    client: Arc<Client>,
    schema: Schema,
    lookup_budget: Duration,
}

impl ResponseDataSource {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            client,
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
            .description("Looks up a canned response by name")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("library_id", AttributeType::String)
                    .optional()
                    .description("Only search this response library")
                    .build(),
            )
            .build()
    }
}

#[async_trait]
impl DataSource for ResponseDataSource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn read(&self, ctx: &Context, config: &DynamicValue) -> Result<DynamicValue> {
        self.validate(config)?;
        let name = config.get_string(&AttributePath::new("name"))?;
        let library_id = config.get_optional_string(&AttributePath::new("library_id"))?;
        let proxy = &ResponseProxy::new(self.client.clone(), library_id);
        let name = name.as_str();

        let response = with_retries(
            ctx,
            &RetryPolicy::with_budget(self.lookup_budget),
            &retry_missing,
            || async move { proxy.get_by_name(name).await },
        )
        .await
        .map_err(|e| settle_lookup(TYPE_NAME, e))?;

        let mut state = config.clone();
        state.set_string(&AttributePath::new("id"), response.id().to_string())?;
        Ok(state)
    }
}

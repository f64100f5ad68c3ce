use crate::api::common::PaginationParams;
use crate::api::integrations::{Credential, CredentialType};
use crate::api::Client;
use async_trait::async_trait;
use reconcile::resource::RemoteClassifier;
use reconcile::retry::classify;
use reconcile::{
    AttributeBuilder, AttributePath, AttributeType, Context, Dynamic, DynamicValue, EntityProxy,
    ManagedResource, Page, RemoteEntity, RemoteError, Result, Schema, SchemaBuilder, SpecPurpose,
    Timeouts,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::invalid;

pub const TYPE_NAME: &str = "genesyscloud_integration_credential";

impl RemoteEntity for Credential {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

pub struct CredentialProxy {
    client: Arc<Client>,
}

#[async_trait]
impl EntityProxy for CredentialProxy {
    type Entity = Credential;
    type Spec = Credential;

    async fn create(&self, spec: &Credential) -> std::result::Result<Credential, RemoteError> {
        Ok(self.client.integrations().create_credential(spec).await?)
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<Credential, RemoteError> {
        Ok(self.client.integrations().get_credential(id).await?)
    }

    async fn list_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> std::result::Result<Page<Credential>, RemoteError> {
        let listing = self
            .client
            .integrations()
            .list_credentials(&PaginationParams::page(page_number, page_size))
            .await?;
        Ok(listing.into())
    }

    async fn update(
        &self,
        id: &str,
        spec: &Credential,
        _expected_version: Option<i64>,
    ) -> std::result::Result<Credential, RemoteError> {
        Ok(self.client.integrations().update_credential(id, spec).await?)
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        Ok(self.client.integrations().delete_credential(id).await?)
    }
}

/// Credential for an integration. Field values are write-only: they are sent
/// on every write and never read back.
pub struct CredentialResource {
    proxy: CredentialProxy,
    schema: Schema,
    timeouts: Timeouts,
}

impl CredentialResource {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            proxy: CredentialProxy { client },
            schema: Self::schema_static(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn schema_static() -> Schema {
        SchemaBuilder::new()
            .version(1)
            .description("Genesys Cloud integration credential")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("credential_type_name", AttributeType::String)
                    .required()
                    .description("Credential type, e.g. basicAuth or pureCloudOAuthClient")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("fields", AttributeType::Map(Box::new(AttributeType::String)))
                    .optional()
                    .sensitive()
                    .description("Credential field values")
                    .build(),
            )
            .build()
    }

    fn fields(declared: &DynamicValue) -> Result<Option<HashMap<String, String>>> {
        let path = AttributePath::new("fields");
        if matches!(declared.get(&path), None | Some(Dynamic::Null)) {
            return Ok(None);
        }
        declared
            .get_map(&path)?
            .into_iter()
            .map(|(key, value)| match value.as_str() {
                Some(value) => Ok((key, value.to_string())),
                None => Err(invalid(TYPE_NAME, format!("fields.{} must be a string", key))),
            })
            .collect::<Result<HashMap<_, _>>>()
            .map(Some)
    }
}

#[async_trait]
impl ManagedResource for CredentialResource {
    type Proxy = CredentialProxy;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn proxy(&self) -> &CredentialProxy {
        &self.proxy
    }

    async fn build_spec(
        &self,
        _ctx: &Context,
        declared: &DynamicValue,
        _purpose: SpecPurpose,
    ) -> Result<Credential> {
        Ok(Credential {
            id: None,
            name: declared.get_optional_string(&AttributePath::new("name"))?,
            credential_type: CredentialType {
                name: declared.get_string(&AttributePath::new("credential_type_name"))?,
            },
            credential_fields: Self::fields(declared)?,
        })
    }

    fn flatten(&self, entity: &Credential, state: &mut DynamicValue) -> Result<()> {
        state.set_optional_string(&AttributePath::new("name"), entity.name.clone())?;
        state.set_string(
            &AttributePath::new("credential_type_name"),
            entity.credential_type.name.clone(),
        )?;
        Ok(())
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn update_classifier(&self) -> RemoteClassifier {
        classify::transient
    }
}

use crate::api::common::PaginationParams;
use crate::api::telephony::TrunkBase;
use crate::api::{Client, DomainEntityRef};
use async_trait::async_trait;
use reconcile::resource::RemoteClassifier;
use reconcile::retry::classify;
use reconcile::schema::suppress_equivalent_json;
use reconcile::validator::StringInSliceValidator;
use reconcile::{
    AttributeBuilder, AttributePath, AttributeType, Context, DynamicValue, EntityProxy,
    ManagedResource, Page, Readiness, RemoteEntity, RemoteError, Result, Schema, SchemaBuilder,
    SpecPurpose, Timeouts,
};
use std::sync::Arc;

use super::invalid;

pub const TYPE_NAME: &str = "genesyscloud_telephony_providers_edges_trunkbasesettings";

const DELETED: &str = "deleted";

fn is_deleted(trunk_base: &TrunkBase) -> bool {
    trunk_base.state.as_deref() == Some(DELETED)
}

impl RemoteEntity for TrunkBase {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Deleted settings stay listed for a while; they never match a name
    fn name(&self) -> Option<&str> {
        (!is_deleted(self)).then_some(self.name.as_str())
    }

    fn version(&self) -> Option<i64> {
        self.version
    }

    fn readiness(&self) -> Readiness {
        if is_deleted(self) {
            Readiness::Deleted
        } else {
            Readiness::Ready
        }
    }
}

pub struct TrunkBaseSettingsProxy {
    client: Arc<Client>,
}

#[async_trait]
impl EntityProxy for TrunkBaseSettingsProxy {
    type Entity = TrunkBase;
    type Spec = TrunkBase;

    async fn create(&self, spec: &TrunkBase) -> std::result::Result<TrunkBase, RemoteError> {
        Ok(self.client.telephony().create_trunk_base_settings(spec).await?)
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<TrunkBase, RemoteError> {
        Ok(self.client.telephony().get_trunk_base_settings(id).await?)
    }

    async fn list_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> std::result::Result<Page<TrunkBase>, RemoteError> {
        let listing = self
            .client
            .telephony()
            .list_trunk_base_settings(&PaginationParams::page(page_number, page_size))
            .await?;
        Ok(listing.into())
    }

    async fn update(
        &self,
        id: &str,
        spec: &TrunkBase,
        expected_version: Option<i64>,
    ) -> std::result::Result<TrunkBase, RemoteError> {
        let trunk_base = TrunkBase {
            version: expected_version,
            ..spec.clone()
        };
        Ok(self
            .client
            .telephony()
            .update_trunk_base_settings(id, &trunk_base)
            .await?)
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        Ok(self.client.telephony().delete_trunk_base_settings(id).await?)
    }
}

pub struct TrunkBaseSettingsResource {
    proxy: TrunkBaseSettingsProxy,
    schema: Schema,
    timeouts: Timeouts,
}

impl TrunkBaseSettingsResource {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            proxy: TrunkBaseSettingsProxy { client },
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
            .description("Genesys Cloud trunk base settings")
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
                AttributeBuilder::new("description", AttributeType::String)
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("trunk_meta_base_id", AttributeType::String)
                    .required()
                    .force_new()
                    .description("The meta-base this trunk is based on")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("trunk_type", AttributeType::String)
                    .required()
                    .force_new()
                    .validator(Box::new(StringInSliceValidator::new([
                        "EXTERNAL", "PHONE", "EDGE",
                    ])))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("managed", AttributeType::Bool)
                    .optional()
                    .default_value(false)
                    .description("Whether the trunk is managed by the platform")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("properties", AttributeType::String)
                    .optional()
                    .computed()
                    .description("JSON object of trunk properties")
                    .diff_suppress(suppress_equivalent_json)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .optional()
                    .computed()
                    .build(),
            )
            .build()
    }
}

#[async_trait]
impl ManagedResource for TrunkBaseSettingsResource {
    type Proxy = TrunkBaseSettingsProxy;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn proxy(&self) -> &TrunkBaseSettingsProxy {
        &self.proxy
    }

    async fn build_spec(
        &self,
        _ctx: &Context,
        declared: &DynamicValue,
        _purpose: SpecPurpose,
    ) -> Result<TrunkBase> {
        let properties = declared
            .get_optional_string(&AttributePath::new("properties"))?
            .map(|properties| {
                serde_json::from_str(&properties).map_err(|e| {
                    invalid(TYPE_NAME, format!("properties is not valid JSON: {}", e))
                })
            })
            .transpose()?;

        Ok(TrunkBase {
            name: declared.get_string(&AttributePath::new("name"))?,
            description: declared.get_optional_string(&AttributePath::new("description"))?,
            state: declared.get_optional_string(&AttributePath::new("state"))?,
            trunk_metabase: Some(DomainEntityRef::new(
                declared.get_string(&AttributePath::new("trunk_meta_base_id"))?,
            )),
            trunk_type: declared.get_string(&AttributePath::new("trunk_type"))?,
            managed: declared.get_optional_bool(&AttributePath::new("managed"))?,
            properties,
            ..TrunkBase::default()
        })
    }

    fn flatten(&self, entity: &TrunkBase, state: &mut DynamicValue) -> Result<()> {
        state.set_string(&AttributePath::new("name"), entity.name.clone())?;
        state.set_optional_string(&AttributePath::new("description"), entity.description.clone())?;
        state.set_optional_string(
            &AttributePath::new("trunk_meta_base_id"),
            entity.trunk_metabase.as_ref().map(|base| base.id.clone()),
        )?;
        state.set_string(&AttributePath::new("trunk_type"), entity.trunk_type.clone())?;
        state.set_optional_bool(&AttributePath::new("managed"), entity.managed)?;
        let properties = entity
            .properties
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| invalid(TYPE_NAME, format!("unreadable properties: {}", e)))?;
        state.set_optional_string(&AttributePath::new("properties"), properties)?;
        state.set_optional_string(&AttributePath::new("state"), entity.state.clone())?;
        Ok(())
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // Edges still referencing the trunk reject the delete until they let go
    fn delete_classifier(&self) -> RemoteClassifier {
        classify::bad_request
    }
}

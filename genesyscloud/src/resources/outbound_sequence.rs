use crate::api::common::PaginationParams;
use crate::api::outbound::CampaignSequence;
use crate::api::{Client, DomainEntityRef};
use async_trait::async_trait;
use reconcile::resource::RemoteClassifier;
use reconcile::retry::classify;
use reconcile::validator::{ListLengthValidator, StringInSliceValidator};
use reconcile::{
    AttributeBuilder, AttributePath, AttributeType, Context, Dynamic, DynamicValue, EntityProxy,
    ManagedResource, Page, RemoteEntity, RemoteError, Result, Schema, SchemaBuilder, SpecPurpose,
};
use std::sync::Arc;

pub const TYPE_NAME: &str = "genesyscloud_outbound_sequence";

impl RemoteEntity for CampaignSequence {
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

/// A sequence that ran to completion reports `complete`; it is still on
fn suppress_complete_status(declared: &Dynamic, actual: &Dynamic) -> bool {
    declared.as_str() == Some("on") && actual.as_str() == Some("complete")
}

fn is_running(status: Option<&str>) -> bool {
    matches!(status, Some("on") | Some("complete"))
}

pub struct SequenceProxy {
    client: Arc<Client>,
}

#[async_trait]
impl EntityProxy for SequenceProxy {
    type Entity = CampaignSequence;
    type Spec = CampaignSequence;

    async fn create(&self, spec: &CampaignSequence) -> std::result::Result<CampaignSequence, RemoteError> {
        Ok(self.client.outbound().create_sequence(spec).await?)
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<CampaignSequence, RemoteError> {
        Ok(self.client.outbound().get_sequence(id).await?)
    }

    async fn list_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> std::result::Result<Page<CampaignSequence>, RemoteError> {
        let listing = self
            .client
            .outbound()
            .list_sequences(&PaginationParams::page(page_number, page_size))
            .await?;
        Ok(listing.into())
    }

    async fn update(
        &self,
        id: &str,
        spec: &CampaignSequence,
        expected_version: Option<i64>,
    ) -> std::result::Result<CampaignSequence, RemoteError> {
        let sequence = CampaignSequence {
            version: expected_version,
            ..spec.clone()
        };
        Ok(self.client.outbound().update_sequence(id, &sequence).await?)
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        Ok(self.client.outbound().delete_sequence(id).await?)
    }
}

/// Outbound campaign sequence. Sequences are always created stopped and
/// switched on by an update once they exist.
pub struct OutboundSequenceResource {
    proxy: SequenceProxy,
    schema: Schema,
    timeouts: reconcile::Timeouts,
}

impl OutboundSequenceResource {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            proxy: SequenceProxy { client },
            schema: Self::schema_static(),
            timeouts: reconcile::Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: reconcile::Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn schema_static() -> Schema {
        SchemaBuilder::new()
            .version(1)
            .description("Genesys Cloud outbound sequence")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .description("The name of the campaign sequence")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "campaign_ids",
                    AttributeType::List(Box::new(AttributeType::String)),
                )
                .required()
                .description("The ordered list of campaigns that this sequence will run")
                .validator(Box::new(ListLengthValidator {
                    min: Some(1),
                    max: None,
                }))
                .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .optional()
                    .computed()
                    .description("The current status of the sequence: on or off")
                    .validator(Box::new(StringInSliceValidator::new(["on", "off"])))
                    .diff_suppress(suppress_complete_status)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("repeat", AttributeType::Bool)
                    .optional()
                    .default_value(false)
                    .description("Whether the sequence starts over once the last campaign completes")
                    .build(),
            )
            .build()
    }
}

#[async_trait]
impl ManagedResource for OutboundSequenceResource {
    type Proxy = SequenceProxy;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn proxy(&self) -> &SequenceProxy {
        &self.proxy
    }

    async fn build_spec(
        &self,
        _ctx: &Context,
        declared: &DynamicValue,
        purpose: SpecPurpose,
    ) -> Result<CampaignSequence> {
        let status = match purpose {
            SpecPurpose::Create => Some("off".to_string()),
            SpecPurpose::Update => declared.get_optional_string(&AttributePath::new("status"))?,
        };

        Ok(CampaignSequence {
            name: declared.get_string(&AttributePath::new("name"))?,
            campaigns: declared
                .get_string_list(&AttributePath::new("campaign_ids"))?
                .into_iter()
                .map(DomainEntityRef::new)
                .collect(),
            status,
            repeat: declared.get_optional_bool(&AttributePath::new("repeat"))?,
            ..CampaignSequence::default()
        })
    }

    fn flatten(&self, entity: &CampaignSequence, state: &mut DynamicValue) -> Result<()> {
        state.set_string(&AttributePath::new("name"), entity.name.clone())?;
        state.set_value(
            &AttributePath::new("campaign_ids"),
            Dynamic::string_list(entity.campaigns.iter().map(|c| c.id.clone())),
        )?;
        state.set_optional_string(&AttributePath::new("status"), entity.status.clone())?;
        state.set_optional_bool(&AttributePath::new("repeat"), entity.repeat)?;
        Ok(())
    }

    fn timeouts(&self) -> reconcile::Timeouts {
        self.timeouts
    }

    // Campaigns that were just stopped keep the sequence busy for a moment
    fn delete_classifier(&self) -> RemoteClassifier {
        classify::bad_request
    }

    fn update_after_create(&self, declared: &DynamicValue) -> bool {
        declared
            .get_optional_string(&AttributePath::new("status"))
            .ok()
            .flatten()
            .as_deref()
            == Some("on")
    }

    /// A running sequence cannot be stopped in place
    fn requires_replace(&self, prior: &DynamicValue, declared: &DynamicValue) -> Option<String> {
        let prior_status = prior.get_optional_string(&AttributePath::new("status")).ok()?;
        let declared_status = declared
            .get_optional_string(&AttributePath::new("status"))
            .ok()?;
        (is_running(prior_status.as_deref()) && declared_status.as_deref() == Some("off"))
            .then(|| "status".to_string())
    }
}

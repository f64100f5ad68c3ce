use crate::api::common::PaginationParams;
use crate::api::processautomation::{Trigger, TriggerTarget};
use crate::api::Client;
use async_trait::async_trait;
use reconcile::error::RemoteErrorKind;
use reconcile::resource::RemoteClassifier;
use reconcile::retry::classify;
use reconcile::schema::suppress_equivalent_json;
use reconcile::validator::{MutuallyExclusive, NumberRangeValidator, WholeNumberValidator};
use reconcile::{
    AttributeBuilder, AttributePath, AttributeType, Classification, Context, Diagnostics, Dynamic,
    DynamicValue, EntityProxy, ManagedResource, Page, RemoteEntity, RemoteError, Result, Schema,
    SchemaBuilder, SpecPurpose, Timeouts,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::invalid;

pub const TYPE_NAME: &str = "genesyscloud_processautomation_trigger";

const WORKFLOW_TARGET: &str = "Workflow";

impl RemoteEntity for Trigger {
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

/// Triggers linger briefly after their workflow changes; only a missing
/// trigger or a rejected token ends the delete early
fn retry_unless_gone(error: &RemoteError) -> Classification {
    match error.kind() {
        RemoteErrorKind::NotFound | RemoteErrorKind::Unauthorized => Classification::Terminal,
        _ => match error.retry_after {
            Some(wait) => Classification::RetryAfter(wait),
            None => Classification::Retryable,
        },
    }
}

/// Zero means "not set" for both delay settings
fn positive_seconds(declared: &DynamicValue, name: &str) -> Result<Option<u32>> {
    let Some(seconds) = declared
        .get_optional_number(&AttributePath::new(name))?
        .filter(|seconds| *seconds > 0.0)
    else {
        return Ok(None);
    };
    if seconds.fract() != 0.0 || seconds > f64::from(u32::MAX) {
        return Err(invalid(
            TYPE_NAME,
            format!("{} must be a whole number of seconds, got {}", name, seconds),
        ));
    }
    Ok(Some(seconds as u32))
}

pub struct TriggerProxy {
    client: Arc<Client>,
}

#[async_trait]
impl EntityProxy for TriggerProxy {
    type Entity = Trigger;
    type Spec = Trigger;

    async fn create(&self, spec: &Trigger) -> std::result::Result<Trigger, RemoteError> {
        Ok(self.client.process_automation().create_trigger(spec).await?)
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<Trigger, RemoteError> {
        Ok(self.client.process_automation().get_trigger(id).await?)
    }

    async fn list_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> std::result::Result<Page<Trigger>, RemoteError> {
        let listing = self
            .client
            .process_automation()
            .list_triggers(&PaginationParams::page(page_number, page_size))
            .await?;
        Ok(listing.into())
    }

    async fn update(
        &self,
        id: &str,
        spec: &Trigger,
        expected_version: Option<i64>,
    ) -> std::result::Result<Trigger, RemoteError> {
        let trigger = Trigger {
            version: expected_version,
            ..spec.clone()
        };
        Ok(self
            .client
            .process_automation()
            .update_trigger(id, &trigger)
            .await?)
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        Ok(self.client.process_automation().delete_trigger(id).await?)
    }
}

pub struct TriggerResource {
    proxy: TriggerProxy,
    schema: Schema,
    timeouts: Timeouts,
}

impl TriggerResource {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            proxy: TriggerProxy { client },
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
            .description("Genesys Cloud process automation trigger")
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
                AttributeBuilder::new("topic_name", AttributeType::String)
                    .required()
                    .force_new()
                    .description("Topic that will cause the trigger to be invoked")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enabled", AttributeType::Bool)
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "target",
                    AttributeType::Object(HashMap::from([
                        ("type".to_string(), AttributeType::String),
                        ("id".to_string(), AttributeType::String),
                    ])),
                )
                .required()
                .description("Workflow the trigger invokes")
                .build(),
            )
            .attribute(
                AttributeBuilder::new("match_criteria", AttributeType::String)
                    .optional()
                    .description("JSON array of criteria the event must match")
                    .diff_suppress(suppress_equivalent_json)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("event_ttl_seconds", AttributeType::Number)
                    .optional()
                    .description("How old an event can be to still fire the trigger")
                    .validator(Box::new(NumberRangeValidator {
                        min: Some(10.0),
                        max: Some(f64::from(u32::MAX)),
                    }))
                    .validator(Box::new(WholeNumberValidator))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("delay_by_seconds", AttributeType::Number)
                    .optional()
                    .description("How long to delay processing of a matching event")
                    .validator(Box::new(NumberRangeValidator {
                        min: Some(60.0),
                        max: Some(900.0),
                    }))
                    .validator(Box::new(WholeNumberValidator))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("description", AttributeType::String)
                    .optional()
                    .build(),
            )
            .config_validator(Box::new(MutuallyExclusive::new([
                "event_ttl_seconds",
                "delay_by_seconds",
            ])))
            .build()
    }

    fn target(declared: &DynamicValue) -> Result<TriggerTarget> {
        let target = declared.get_map(&AttributePath::new("target"))?;
        let field = |name: &str| {
            target
                .get(name)
                .and_then(Dynamic::as_str)
                .map(str::to_string)
                .ok_or_else(|| invalid(TYPE_NAME, format!("target.{} is required", name)))
        };
        Ok(TriggerTarget {
            target_type: field("type")?,
            id: field("id")?,
        })
    }
}

#[async_trait]
impl ManagedResource for TriggerResource {
    type Proxy = TriggerProxy;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn proxy(&self) -> &TriggerProxy {
        &self.proxy
    }

    fn validate(&self, declared: &DynamicValue, diagnostics: &mut Diagnostics) {
        let target_type = declared
            .get_map(&AttributePath::new("target"))
            .ok()
            .and_then(|target| target.get("type").and_then(Dynamic::as_str).map(str::to_string));
        if let Some(target_type) = target_type {
            if target_type != WORKFLOW_TARGET {
                diagnostics.add_error(
                    format!("target.type must be {}", WORKFLOW_TARGET),
                    Some(format!("Got '{}'", target_type)),
                );
            }
        }
    }

    async fn build_spec(
        &self,
        _ctx: &Context,
        declared: &DynamicValue,
        _purpose: SpecPurpose,
    ) -> Result<Trigger> {
        let match_criteria = declared
            .get_optional_string(&AttributePath::new("match_criteria"))?
            .map(|criteria| {
                serde_json::from_str(&criteria).map_err(|e| {
                    invalid(TYPE_NAME, format!("match_criteria is not valid JSON: {}", e))
                })
            })
            .transpose()?;

        Ok(Trigger {
            id: None,
            name: declared.get_string(&AttributePath::new("name"))?,
            topic_name: declared.get_string(&AttributePath::new("topic_name"))?,
            enabled: declared.get_bool(&AttributePath::new("enabled"))?,
            target: Self::target(declared)?,
            match_criteria,
            event_ttl_seconds: positive_seconds(declared, "event_ttl_seconds")?,
            delay_by_seconds: positive_seconds(declared, "delay_by_seconds")?,
            description: declared.get_optional_string(&AttributePath::new("description"))?,
            version: None,
        })
    }

    fn flatten(&self, entity: &Trigger, state: &mut DynamicValue) -> Result<()> {
        state.set_string(&AttributePath::new("name"), entity.name.clone())?;
        state.set_string(&AttributePath::new("topic_name"), entity.topic_name.clone())?;
        state.set_bool(&AttributePath::new("enabled"), entity.enabled)?;
        state.set_value(
            &AttributePath::new("target"),
            Dynamic::Map(HashMap::from([
                ("type".to_string(), Dynamic::from(entity.target.target_type.as_str())),
                ("id".to_string(), Dynamic::from(entity.target.id.as_str())),
            ])),
        )?;
        let criteria = entity
            .match_criteria
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| invalid(TYPE_NAME, format!("unreadable match criteria: {}", e)))?;
        state.set_optional_string(&AttributePath::new("match_criteria"), criteria)?;
        state.set_optional_number(
            &AttributePath::new("event_ttl_seconds"),
            entity.event_ttl_seconds.map(f64::from),
        )?;
        state.set_optional_number(
            &AttributePath::new("delay_by_seconds"),
            entity.delay_by_seconds.map(f64::from),
        )?;
        state.set_optional_string(&AttributePath::new("description"), entity.description.clone())?;
        Ok(())
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // The target workflow may not be visible to triggers yet
    fn create_classifier(&self) -> RemoteClassifier {
        classify::bad_request
    }

    fn delete_classifier(&self) -> RemoteClassifier {
        retry_unless_gone
    }
}

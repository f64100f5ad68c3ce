use crate::api::webdeployments::{latest_version, ConfigurationVersionRef, WebDeployment};
use crate::api::{Client, DomainEntityRef};
use async_trait::async_trait;
use reconcile::resource::RemoteClassifier;
use reconcile::retry::classify;
use reconcile::{
    AttributeBuilder, AttributePath, AttributeType, Context, Diagnostics, Dynamic, DynamicValue,
    EntityProxy, ManagedResource, Operation, Page, Readiness, RemoteEntity, RemoteError, Result,
    Schema, SchemaBuilder, SpecPurpose, Timeouts,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::{api_failure, invalid};

pub const TYPE_NAME: &str = "genesyscloud_webdeployments_deployment";

const ACTIVE: &str = "Active";

impl RemoteEntity for WebDeployment {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn readiness(&self) -> Readiness {
        match self.status.as_deref() {
            None | Some(ACTIVE) => Readiness::Ready,
            Some(status) => Readiness::Pending(status.to_string()),
        }
    }
}

/// A configuration declared without a version follows whatever version the
/// deployment was pinned to
fn suppress_unpinned_version(declared: &Dynamic, actual: &Dynamic) -> bool {
    let (Some(declared), Some(actual)) = (declared.as_map(), actual.as_map()) else {
        return false;
    };
    let field = |map: &HashMap<String, Dynamic>, name: &str| {
        map.get(name).and_then(Dynamic::as_str).map(str::to_string)
    };
    if field(declared, "id") != field(actual, "id") {
        return false;
    }
    match field(declared, "version") {
        None => true,
        Some(version) => field(actual, "version") == Some(version),
    }
}

pub struct WebDeploymentProxy {
    client: Arc<Client>,
}

#[async_trait]
impl EntityProxy for WebDeploymentProxy {
    type Entity = WebDeployment;
    type Spec = WebDeployment;

    async fn create(&self, spec: &WebDeployment) -> std::result::Result<WebDeployment, RemoteError> {
        Ok(self.client.web_deployments().create(spec).await?)
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<WebDeployment, RemoteError> {
        Ok(self.client.web_deployments().get(id).await?)
    }

    /// Deployments are not paginated; everything arrives on page 1
    async fn list_page(
        &self,
        page_number: u32,
        _page_size: u32,
    ) -> std::result::Result<Page<WebDeployment>, RemoteError> {
        if page_number > 1 {
            return Ok(Page::empty());
        }
        let listing = self.client.web_deployments().list().await?;
        Ok(Page {
            page_count: Some(1),
            ..Page::from(listing)
        })
    }

    async fn update(
        &self,
        id: &str,
        spec: &WebDeployment,
        _expected_version: Option<i64>,
    ) -> std::result::Result<WebDeployment, RemoteError> {
        Ok(self.client.web_deployments().update(id, spec).await?)
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        Ok(self.client.web_deployments().delete(id).await?)
    }
}

/// Web messaging deployment pinned to a configuration version
pub struct WebDeploymentResource {
    proxy: WebDeploymentProxy,
    schema: Schema,
    timeouts: Timeouts,
}

impl WebDeploymentResource {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            proxy: WebDeploymentProxy { client },
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
            .description("Genesys Cloud web deployment")
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
                AttributeBuilder::new("allow_all_domains", AttributeType::Bool)
                    .optional()
                    .default_value(false)
                    .description("Whether the deployment can be embedded on any domain")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "allowed_domains",
                    AttributeType::List(Box::new(AttributeType::String)),
                )
                .optional()
                .description("Domains allowed to embed the deployment")
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "configuration",
                    AttributeType::Object(HashMap::from([
                        ("id".to_string(), AttributeType::String),
                        ("version".to_string(), AttributeType::String),
                    ])),
                )
                .required()
                .description("Configuration id and version; the version defaults to the latest published")
                .diff_suppress(suppress_unpinned_version)
                .build(),
            )
            .attribute(
                AttributeBuilder::new("flow_id", AttributeType::String)
                    .optional()
                    .description("Inbound message flow for the deployment")
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .computed()
                    .build(),
            )
            .build()
    }

    /// The declared version if it exists, else the latest published one
    async fn resolve_configuration(
        &self,
        declared: &DynamicValue,
        operation: Operation,
    ) -> Result<ConfigurationVersionRef> {
        let configuration = declared.get_map(&AttributePath::new("configuration"))?;
        let field = |name: &str| {
            configuration
                .get(name)
                .and_then(Dynamic::as_str)
                .map(str::to_string)
        };
        let id = field("id").ok_or_else(|| invalid(TYPE_NAME, "configuration.id is required"))?;

        let versions = self
            .proxy
            .client
            .web_deployments()
            .configuration_versions(&id)
            .await
            .map_err(|e| api_failure(TYPE_NAME, None, operation, e))?;

        let version = match field("version") {
            Some(version) if versions.iter().any(|v| v.version == version) => version,
            Some(version) => {
                return Err(invalid(
                    TYPE_NAME,
                    format!("configuration {} has no version {}", id, version),
                ))
            }
            None => latest_version(&versions).ok_or_else(|| {
                invalid(
                    TYPE_NAME,
                    format!("configuration {} has no published version", id),
                )
            })?,
        };
        tracing::debug!("Using configuration {} version {}", id, version);

        Ok(ConfigurationVersionRef { id, version })
    }
}

#[async_trait]
impl ManagedResource for WebDeploymentResource {
    type Proxy = WebDeploymentProxy;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn proxy(&self) -> &WebDeploymentProxy {
        &self.proxy
    }

    fn validate(&self, declared: &DynamicValue, diagnostics: &mut Diagnostics) {
        let allow_all = declared
            .get_optional_bool(&AttributePath::new("allow_all_domains"))
            .ok()
            .flatten()
            .unwrap_or(false);
        let has_domains = declared
            .get_string_list(&AttributePath::new("allowed_domains"))
            .is_ok_and(|domains| !domains.is_empty());

        if allow_all && has_domains {
            diagnostics.add_error(
                "allowed_domains cannot be set when allow_all_domains is true",
                None::<String>,
            );
        }
        if !allow_all && !has_domains {
            diagnostics.add_error(
                "allowed_domains must be set when allow_all_domains is false",
                None::<String>,
            );
        }
    }

    async fn build_spec(
        &self,
        _ctx: &Context,
        declared: &DynamicValue,
        purpose: SpecPurpose,
    ) -> Result<WebDeployment> {
        let operation = match purpose {
            SpecPurpose::Create => Operation::Create,
            SpecPurpose::Update => Operation::Update,
        };
        let allowed_domains = declared.get_string_list(&AttributePath::new("allowed_domains"))?;

        Ok(WebDeployment {
            id: None,
            name: declared.get_string(&AttributePath::new("name"))?,
            description: declared.get_optional_string(&AttributePath::new("description"))?,
            allow_all_domains: declared.get_optional_bool(&AttributePath::new("allow_all_domains"))?,
            allowed_domains: (!allowed_domains.is_empty()).then_some(allowed_domains),
            configuration: Some(self.resolve_configuration(declared, operation).await?),
            flow: declared
                .get_optional_string(&AttributePath::new("flow_id"))?
                .map(DomainEntityRef::new),
            status: None,
        })
    }

    fn flatten(&self, entity: &WebDeployment, state: &mut DynamicValue) -> Result<()> {
        state.set_string(&AttributePath::new("name"), entity.name.clone())?;
        state.set_optional_string(&AttributePath::new("description"), entity.description.clone())?;
        state.set_optional_bool(
            &AttributePath::new("allow_all_domains"),
            entity.allow_all_domains,
        )?;
        match &entity.allowed_domains {
            Some(domains) => state.set_value(
                &AttributePath::new("allowed_domains"),
                Dynamic::string_list(domains),
            )?,
            None => state.set_null(&AttributePath::new("allowed_domains"))?,
        }
        match &entity.configuration {
            Some(configuration) => state.set_value(
                &AttributePath::new("configuration"),
                Dynamic::Map(HashMap::from([
                    ("id".to_string(), Dynamic::from(configuration.id.as_str())),
                    (
                        "version".to_string(),
                        Dynamic::from(configuration.version.as_str()),
                    ),
                ])),
            )?,
            None => state.set_null(&AttributePath::new("configuration"))?,
        }
        state.set_optional_string(
            &AttributePath::new("flow_id"),
            entity.flow.as_ref().map(|flow| flow.id.clone()),
        )?;
        state.set_optional_string(&AttributePath::new("status"), entity.status.clone())?;
        Ok(())
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // A configuration version published a moment ago is rejected with 400
    fn create_classifier(&self) -> RemoteClassifier {
        classify::bad_request
    }

    fn update_classifier(&self) -> RemoteClassifier {
        classify::bad_request
    }

    fn delete_classifier(&self) -> RemoteClassifier {
        classify::never
    }
}

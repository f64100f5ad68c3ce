//! Genesys Cloud binding for `reconcile`
//!
//! The provider turns configuration into an API client plus shared caches,
//! then hands out a reconciler for each supported entity kind and a lookup
//! for each data source.

pub mod api;
pub mod config;
pub mod data_sources;
pub mod provider_data;
pub mod resources;

pub use config::ProviderConfig;
pub use provider_data::ProviderData;

use reconcile::{
    DataSource, Diagnostics, DynamicValue, ManagedResource, Reconciler, ResourceHandle,
    RetryPolicy, Schema, Timeouts,
};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider not configured")]
    NotConfigured,

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Unknown data source: {0}")]
    UnknownDataSource(String),
}

pub struct GenesysCloudProvider {
    data: Option<ProviderData>,
    timeouts: Option<Timeouts>,
    backoff: RetryPolicy,
    lookup_budget: Duration,
}

impl Default for GenesysCloudProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GenesysCloudProvider {
    pub fn new() -> Self {
        Self {
            data: None,
            timeouts: None,
            backoff: RetryPolicy::default(),
            lookup_budget: data_sources::DEFAULT_LOOKUP_BUDGET,
        }
    }

    /// Replace every kind's own budgets
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_lookup_budget(mut self, budget: Duration) -> Self {
        self.lookup_budget = budget;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.data.is_some()
    }

    pub fn configure(&mut self, config: &DynamicValue) -> Diagnostics {
        let settings = match ProviderConfig::from_config(config) {
            Ok(settings) => settings,
            Err(diags) => return diags,
        };

        let mut diags = Diagnostics::new();
        match ProviderData::from_config(&settings) {
            Ok(data) => {
                tracing::info!("Configured Genesys Cloud provider for {}", settings.base_url);
                self.data = Some(data);
            }
            Err(e) => {
                diags.add_error(format!("Failed to create API client: {}", e), None::<String>);
            }
        }
        diags
    }

    fn data(&self) -> Result<&ProviderData, ProviderError> {
        self.data.as_ref().ok_or(ProviderError::NotConfigured)
    }

    fn handle<R: ManagedResource>(
        &self,
        resource: R,
        with_timeouts: fn(R, Timeouts) -> R,
    ) -> Box<dyn ResourceHandle> {
        let resource = match self.timeouts {
            Some(timeouts) => with_timeouts(resource, timeouts),
            None => resource,
        };
        Box::new(Reconciler::new(resource).with_backoff(self.backoff))
    }

    pub fn create_resource(&self, name: &str) -> Result<Box<dyn ResourceHandle>, ProviderError> {
        use resources::*;

        let client = self.data()?.client.clone();
        let handle = match name {
            team::TYPE_NAME => self.handle(
                TeamResource::new(client).with_backoff(self.backoff),
                TeamResource::with_timeouts,
            ),
            outbound_sequence::TYPE_NAME => self.handle(
                OutboundSequenceResource::new(client),
                OutboundSequenceResource::with_timeouts,
            ),
            processautomation_trigger::TYPE_NAME => {
                self.handle(TriggerResource::new(client), TriggerResource::with_timeouts)
            }
            webdeployments_deployment::TYPE_NAME => self.handle(
                WebDeploymentResource::new(client),
                WebDeploymentResource::with_timeouts,
            ),
            trunkbasesettings::TYPE_NAME => self.handle(
                TrunkBaseSettingsResource::new(client),
                TrunkBaseSettingsResource::with_timeouts,
            ),
            integration_credential::TYPE_NAME => {
                self.handle(CredentialResource::new(client), CredentialResource::with_timeouts)
            }
            outbound_contact_list_contact::TYPE_NAME => {
                self.handle(ContactResource::new(client), ContactResource::with_timeouts)
            }
            _ => return Err(ProviderError::UnknownResource(name.to_string())),
        };
        Ok(handle)
    }

    pub fn create_data_source(&self, name: &str) -> Result<Box<dyn DataSource>, ProviderError> {
        let data = self.data()?;

        match name {
            data_sources::user::TYPE_NAME => Ok(Box::new(
                data_sources::UserDataSource::new(data.users.clone())
                    .with_lookup_budget(self.lookup_budget),
            )),
            data_sources::responsemanagement_response::TYPE_NAME => Ok(Box::new(
                data_sources::ResponseDataSource::new(data.client.clone())
                    .with_lookup_budget(self.lookup_budget),
            )),
            _ => Err(ProviderError::UnknownDataSource(name.to_string())),
        }
    }

    pub fn resource_schemas(&self) -> &'static HashMap<String, Schema> {
        static SCHEMAS: OnceLock<HashMap<String, Schema>> = OnceLock::new();

        SCHEMAS.get_or_init(|| {
            use resources::*;

            HashMap::from([
                (team::TYPE_NAME.to_string(), TeamResource::schema_static()),
                (
                    outbound_sequence::TYPE_NAME.to_string(),
                    OutboundSequenceResource::schema_static(),
                ),
                (
                    processautomation_trigger::TYPE_NAME.to_string(),
                    TriggerResource::schema_static(),
                ),
                (
                    webdeployments_deployment::TYPE_NAME.to_string(),
                    WebDeploymentResource::schema_static(),
                ),
                (
                    trunkbasesettings::TYPE_NAME.to_string(),
                    TrunkBaseSettingsResource::schema_static(),
                ),
                (
                    integration_credential::TYPE_NAME.to_string(),
                    CredentialResource::schema_static(),
                ),
                (
                    outbound_contact_list_contact::TYPE_NAME.to_string(),
                    ContactResource::schema_static(),
                ),
            ])
        })
    }

    pub fn data_source_schemas(&self) -> &'static HashMap<String, Schema> {
        static SCHEMAS: OnceLock<HashMap<String, Schema>> = OnceLock::new();

        SCHEMAS.get_or_init(|| {
            HashMap::from([
                (
                    data_sources::user::TYPE_NAME.to_string(),
                    data_sources::UserDataSource::schema_static(),
                ),
                (
                    data_sources::responsemanagement_response::TYPE_NAME.to_string(),
                    data_sources::ResponseDataSource::schema_static(),
                ),
            ])
        })
    }
}

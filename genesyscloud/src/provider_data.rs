//! Shared state handed to every resource and data source

use crate::api::{Client, RetryConfig};
use crate::config::ProviderConfig;
use crate::data_sources::UserDirectory;
use reconcile::NameCache;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProviderData {
    pub client: Arc<Client>,
    /// One user cache per provider, shared by every user lookup
    pub users: Arc<NameCache<UserDirectory>>,
}

impl ProviderData {
    pub fn new(client: Client) -> Self {
        let client = Arc::new(client);
        Self {
            users: Arc::new(NameCache::new(UserDirectory::new(client.clone()))),
            client,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, crate::api::ApiError> {
        let client = Client::with_config(
            &config.base_url,
            &config.access_token,
            RetryConfig {
                timeout_seconds: config.request_timeout_seconds,
                ..RetryConfig::default()
            },
        )?;
        Ok(Self::new(client))
    }
}

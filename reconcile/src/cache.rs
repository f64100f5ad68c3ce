//! Name-resolution cache
//!
//! Resolves human-readable keys (names, emails) to entity ids. The cache is
//! filled once, lazily, from a full listing and never invalidated. A key
//! that is not cached costs exactly one direct search before it is reported
//! missing.

use crate::error::{LookupError, RemoteError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::{OnceCell, RwLock};

/// Where a cache gets its entries from
#[async_trait]
pub trait NameSource: Send + Sync {
    type Key: Eq + Hash + Clone + std::fmt::Display + Send + Sync;

    /// Every known key and the id it maps to
    async fn hydrate(&self) -> Result<Vec<(Self::Key, String)>, RemoteError>;

    /// Direct lookup for a key the listing did not contain
    async fn search(&self, key: &Self::Key) -> Result<Option<String>, RemoteError>;
}

pub struct NameCache<S: NameSource> {
    source: S,
    hydrated: OnceCell<()>,
    entries: RwLock<HashMap<S::Key, String>>,
}

impl<S: NameSource> NameCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            hydrated: OnceCell::new(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Concurrent first callers wait on a single hydration. A failed
    /// hydration is not remembered; the next call tries again.
    async fn ensure_hydrated(&self) -> Result<(), RemoteError> {
        self.hydrated
            .get_or_try_init(|| async {
                let listed = self.source.hydrate().await?;
                let mut entries = self.entries.write().await;
                tracing::debug!("Hydrated name cache with {} entries", listed.len());
                entries.extend(listed);
                Ok::<(), RemoteError>(())
            })
            .await
            .map(|_| ())
    }

    pub async fn resolve(&self, key: &S::Key) -> Result<String, LookupError> {
        self.ensure_hydrated().await?;

        if let Some(id) = self.entries.read().await.get(key) {
            return Ok(id.clone());
        }

        tracing::debug!("Name cache miss for {}, searching", key);
        match self.source.search(key).await? {
            Some(id) => {
                self.entries.write().await.insert(key.clone(), id.clone());
                Ok(id)
            }
            None => Err(LookupError::NotFound(key.to_string())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

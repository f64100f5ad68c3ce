//! Entity proxy contract
//!
//! A proxy adapts abstract CRUD intents for one entity kind onto concrete
//! remote calls. Reconcilers only see this trait, so tests swap in doubles.

use crate::error::{LookupError, RemoteError};
use async_trait::async_trait;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Server-side provisioning status of an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Still provisioning; carries the reported status
    Pending(String),
    /// Soft-deleted: still readable but in a terminal deleted status
    Deleted,
}

pub trait RemoteEntity: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn name(&self) -> Option<&str>;

    /// Optimistic concurrency token, for kinds that have one
    fn version(&self) -> Option<i64> {
        None
    }

    fn readiness(&self) -> Readiness {
        Readiness::Ready
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub entities: Option<Vec<T>>,
    pub page_count: Option<u32>,
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            entities: None,
            page_count: None,
            total: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            entities: self
                .entities
                .map(|entities| entities.into_iter().map(f).collect()),
            page_count: self.page_count,
            total: self.total,
        }
    }
}

/// Whether a listing loop should stop after `page` (1-based `page_number`)
fn is_last_page<T>(page: &Page<T>, page_number: u32, page_size: u32) -> bool {
    let returned = page.entities.as_ref().map_or(0, Vec::len);
    returned == 0
        || (returned as u64) < page_size as u64
        || page.page_count.is_some_and(|count| page_number >= count)
}

#[async_trait]
pub trait EntityProxy: Send + Sync {
    type Entity: RemoteEntity;
    type Spec: Send + Sync;

    async fn create(&self, spec: &Self::Spec) -> Result<Self::Entity, RemoteError>;

    async fn get_by_id(&self, id: &str) -> Result<Self::Entity, RemoteError>;

    /// Fetch one page; `page_number` starts at 1
    async fn list_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> Result<Page<Self::Entity>, RemoteError>;

    async fn update(
        &self,
        id: &str,
        spec: &Self::Spec,
        expected_version: Option<i64>,
    ) -> Result<Self::Entity, RemoteError>;

    async fn delete(&self, id: &str) -> Result<(), RemoteError>;

    fn page_size(&self) -> u32 {
        DEFAULT_PAGE_SIZE
    }

    /// Every entity of this kind. Pages are requested from 1 until one comes
    /// back empty, short, or the reported page count is reached.
    async fn list_all(&self) -> Result<Vec<Self::Entity>, RemoteError> {
        let page_size = self.page_size();
        let mut all = Vec::new();
        let mut page_number = 1;

        loop {
            let page = self.list_page(page_number, page_size).await?;
            let last = is_last_page(&page, page_number, page_size);
            if let Some(entities) = page.entities {
                all.extend(entities);
            }
            if last {
                break;
            }
            page_number += 1;
        }

        tracing::debug!("Listed {} entities in {} pages", all.len(), page_number);
        Ok(all)
    }

    /// First entity whose name matches exactly (case-sensitive)
    async fn get_by_name(&self, name: &str) -> Result<Self::Entity, LookupError> {
        let page_size = self.page_size();
        let mut page_number = 1;

        loop {
            let page = self.list_page(page_number, page_size).await?;
            let last = is_last_page(&page, page_number, page_size);
            if let Some(found) = page
                .entities
                .into_iter()
                .flatten()
                .find(|entity| entity.name() == Some(name))
            {
                return Ok(found);
            }
            if last {
                return Err(LookupError::NotFound(name.to_string()));
            }
            page_number += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Named {
        id: String,
        name: String,
    }

    impl RemoteEntity for Named {
        fn id(&self) -> &str {
            &self.id
        }

        fn name(&self) -> Option<&str> {
            Some(&self.name)
        }
    }

    struct Listing {
        entities: Vec<Named>,
        report_page_count: bool,
        requests: AtomicU32,
        page_lengths: Mutex<Vec<usize>>,
    }

    impl Listing {
        fn with(count: usize, report_page_count: bool) -> Self {
            Self {
                entities: (0..count)
                    .map(|i| Named {
                        id: format!("id-{}", i),
                        name: format!("entity-{}", i),
                    })
                    .collect(),
                report_page_count,
                requests: AtomicU32::new(0),
                page_lengths: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EntityProxy for Listing {
        type Entity = Named;
        type Spec = ();

        async fn create(&self, _spec: &()) -> Result<Named, RemoteError> {
            Err(RemoteError::new(405, "read only"))
        }

        async fn get_by_id(&self, id: &str) -> Result<Named, RemoteError> {
            self.entities
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or_else(|| RemoteError::new(404, "not found"))
        }

        async fn list_page(&self, page_number: u32, page_size: u32) -> Result<Page<Named>, RemoteError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let start = ((page_number - 1) * page_size) as usize;
            let slice: Vec<Named> = self
                .entities
                .iter()
                .skip(start)
                .take(page_size as usize)
                .cloned()
                .collect();
            self.page_lengths.lock().unwrap().push(slice.len());
            let page_count = self.entities.len().div_ceil(page_size as usize) as u32;
            Ok(Page {
                entities: Some(slice),
                page_count: self.report_page_count.then_some(page_count),
                total: Some(self.entities.len() as u64),
            })
        }

        async fn update(&self, _id: &str, _spec: &(), _v: Option<i64>) -> Result<Named, RemoteError> {
            Err(RemoteError::new(405, "read only"))
        }

        async fn delete(&self, _id: &str) -> Result<(), RemoteError> {
            Err(RemoteError::new(405, "read only"))
        }
    }

    #[tokio::test]
    async fn list_all_enumerates_250_entities_in_three_pages() {
        let proxy = Listing::with(250, false);

        let all = proxy.list_all().await.unwrap();

        assert_eq!(all.len(), 250);
        assert_eq!(proxy.requests.load(Ordering::SeqCst), 3);
        assert_eq!(*proxy.page_lengths.lock().unwrap(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn list_all_stops_at_reported_page_count() {
        let proxy = Listing::with(200, true);

        let all = proxy.list_all().await.unwrap();

        assert_eq!(all.len(), 200);
        assert_eq!(proxy.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn list_all_follows_full_pages_until_empty() {
        let proxy = Listing::with(200, false);

        let all = proxy.list_all().await.unwrap();

        assert_eq!(all.len(), 200);
        // two full pages, then an empty one
        assert_eq!(proxy.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn get_by_name_is_exact_and_case_sensitive() {
        let proxy = Listing::with(150, false);

        let found = proxy.get_by_name("entity-120").await.unwrap();
        assert_eq!(found.id, "id-120");

        let missing = proxy.get_by_name("Entity-120").await;
        assert!(matches!(missing, Err(LookupError::NotFound(ref name)) if name == "Entity-120"));
    }

    #[tokio::test]
    async fn get_by_name_stops_at_first_match() {
        let proxy = Listing::with(250, false);

        proxy.get_by_name("entity-5").await.unwrap();

        assert_eq!(proxy.requests.load(Ordering::SeqCst), 1);
    }
}

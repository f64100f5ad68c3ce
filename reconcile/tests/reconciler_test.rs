//! Lifecycle tests for Reconciler against an in-memory, eventually
//! consistent remote

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use async_trait::async_trait;
use reconcile::error::{ErrorKind, ReconcileError, RemoteError};
use reconcile::proxy::{EntityProxy, Page, Readiness, RemoteEntity};
use reconcile::resource::{EntityOf, SpecOf};
use reconcile::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use reconcile::types::{AttributePath, Dynamic, DynamicValue};
use reconcile::validator::MutuallyExclusive;
use reconcile::{
    Context, Lifecycle, LocalState, ManagedResource, Reconciler, ResourceHandle, Result,
    RetryPolicy, SpecPurpose, Timeouts,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
struct Widget {
    id: String,
    name: String,
    color: Option<String>,
    version: i64,
    status: String,
}

impl RemoteEntity for Widget {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn version(&self) -> Option<i64> {
        Some(self.version)
    }

    fn readiness(&self) -> Readiness {
        match self.status.as_str() {
            "active" => Readiness::Ready,
            "deleted" => Readiness::Deleted,
            other => Readiness::Pending(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct WidgetSpec {
    name: String,
    color: Option<String>,
}

/// Remote double. Counters record calls; the knobs make it lag.
#[derive(Default)]
struct FakeRemote {
    entities: Mutex<HashMap<String, Widget>>,
    next_id: AtomicU32,

    create_failures: Mutex<VecDeque<RemoteError>>,
    get_failures: Mutex<VecDeque<RemoteError>>,
    delete_failures: Mutex<VecDeque<RemoteError>>,

    /// Reads answering 404 right after a create
    invisible_reads: AtomicU32,
    /// Reads reporting "provisioning" before the entity turns active
    pending_reads: AtomicU32,
    /// Reads still returning the pre-update snapshot
    stale_reads: AtomicU32,
    /// Reads still returning the entity after a delete
    lingering_reads: AtomicU32,
    /// Reads after which someone else bumps the version
    concurrent_bumps: AtomicU32,

    previous: Mutex<Option<Widget>>,
    update_versions: Mutex<Vec<Option<i64>>>,

    creates: AtomicU32,
    gets: AtomicU32,
    updates: AtomicU32,
    deletes: AtomicU32,
}

impl FakeRemote {
    fn insert(&self, widget: Widget) {
        self.entities
            .lock()
            .unwrap()
            .insert(widget.id.clone(), widget);
    }

    fn stored(&self, id: &str) -> Option<Widget> {
        self.entities.lock().unwrap().get(id).cloned()
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EntityProxy for FakeRemote {
    type Entity = Widget;
    type Spec = WidgetSpec;

    async fn create(&self, spec: &WidgetSpec) -> std::result::Result<Widget, RemoteError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.create_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let id = format!("w-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let status = if self.pending_reads.load(Ordering::SeqCst) > 0 {
            "provisioning"
        } else {
            "active"
        };
        let widget = Widget {
            id,
            name: spec.name.clone(),
            color: spec.color.clone(),
            version: 1,
            status: status.to_string(),
        };
        let mut stored = widget.clone();
        stored.status = "active".to_string();
        self.insert(stored);
        Ok(widget)
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<Widget, RemoteError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.get_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if FakeRemote::take(&self.invisible_reads) {
            return Err(RemoteError::new(404, "not found"));
        }
        let Some(current) = self.stored(id) else {
            if FakeRemote::take(&self.lingering_reads) {
                if let Some(previous) = self.previous.lock().unwrap().clone() {
                    return Ok(previous);
                }
            }
            return Err(RemoteError::new(404, format!("widget {} not found", id)));
        };
        if FakeRemote::take(&self.pending_reads) {
            let mut pending = current;
            pending.status = "provisioning".to_string();
            return Ok(pending);
        }
        if let Some(previous) = self.previous.lock().unwrap().clone() {
            if FakeRemote::take(&self.stale_reads) {
                return Ok(previous);
            }
        }
        if FakeRemote::take(&self.concurrent_bumps) {
            let mut entities = self.entities.lock().unwrap();
            if let Some(entity) = entities.get_mut(id) {
                entity.version += 1;
            }
        }
        Ok(current)
    }

    async fn list_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> std::result::Result<Page<Widget>, RemoteError> {
        let mut all: Vec<Widget> = self.entities.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        let entities: Vec<Widget> = all
            .into_iter()
            .skip(((page_number - 1) * page_size) as usize)
            .take(page_size as usize)
            .collect();
        Ok(Page {
            entities: Some(entities),
            page_count: None,
            total: None,
        })
    }

    async fn update(
        &self,
        id: &str,
        spec: &WidgetSpec,
        expected_version: Option<i64>,
    ) -> std::result::Result<Widget, RemoteError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.update_versions.lock().unwrap().push(expected_version);

        let mut entities = self.entities.lock().unwrap();
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| RemoteError::new(404, "not found"))?;
        if expected_version != Some(entity.version) {
            return Err(RemoteError::new(
                409,
                format!(
                    "version {:?} does not match current version {}",
                    expected_version, entity.version
                ),
            ));
        }
        *self.previous.lock().unwrap() = Some(entity.clone());
        entity.name = spec.name.clone();
        entity.color = spec.color.clone();
        entity.version += 1;
        Ok(entity.clone())
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), RemoteError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.delete_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        match self.entities.lock().unwrap().remove(id) {
            Some(removed) => {
                *self.previous.lock().unwrap() = Some(removed);
                Ok(())
            }
            None => Err(RemoteError::new(404, "not found")),
        }
    }
}

struct WidgetResource {
    remote: Arc<FakeRemote>,
    schema: Schema,
    timeouts: Timeouts,
}

impl WidgetResource {
    fn new(remote: Arc<FakeRemote>) -> Self {
        let schema = SchemaBuilder::new()
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
                AttributeBuilder::new("color", AttributeType::String)
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("region", AttributeType::String)
                    .optional()
                    .force_new()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("api_key", AttributeType::String)
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("event_ttl_seconds", AttributeType::Number)
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("delay_by_seconds", AttributeType::Number)
                    .optional()
                    .build(),
            )
            .config_validator(Box::new(MutuallyExclusive::new([
                "event_ttl_seconds",
                "delay_by_seconds",
            ])))
            .build();

        Self {
            remote,
            schema,
            timeouts: Timeouts::uniform(Duration::from_millis(400)),
        }
    }
}

#[async_trait]
impl ManagedResource for WidgetResource {
    type Proxy = FakeRemote;

    fn type_name(&self) -> &'static str {
        "test_widget"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn proxy(&self) -> &FakeRemote {
        &self.remote
    }

    async fn build_spec(
        &self,
        _ctx: &Context,
        declared: &DynamicValue,
        _purpose: SpecPurpose,
    ) -> Result<SpecOf<Self>> {
        Ok(WidgetSpec {
            name: declared.get_string(&AttributePath::new("name"))?,
            color: declared.get_optional_string(&AttributePath::new("color"))?,
        })
    }

    fn flatten(&self, entity: &EntityOf<Self>, state: &mut DynamicValue) -> Result<()> {
        state.set_string(&AttributePath::new("name"), entity.name.clone())?;
        state.set_optional_string(&AttributePath::new("color"), entity.color.clone())?;
        Ok(())
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }
}

fn reconciler(remote: &Arc<FakeRemote>) -> Reconciler<WidgetResource> {
    Reconciler::new(WidgetResource::new(Arc::clone(remote))).with_backoff(
        RetryPolicy::default()
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(20)),
    )
}

fn declared(name: &str, color: &str) -> DynamicValue {
    DynamicValue::from_pairs([
        ("name", Dynamic::from(name)),
        ("color", Dynamic::from(color)),
        ("api_key", Dynamic::from("s3cret")),
    ])
}

async fn created(remote: &Arc<FakeRemote>) -> LocalState {
    let mut state = LocalState::absent();
    reconciler(remote)
        .create(&Context::new(), &mut state, &declared("gear", "red"))
        .await
        .unwrap();
    state
}

#[tokio::test]
async fn create_then_read_round_trips_declared_fields() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let ctx = Context::new();

    let mut state = LocalState::absent();
    reconciler
        .create(&ctx, &mut state, &declared("gear", "red"))
        .await
        .unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Active);
    let id = state.id.clone().unwrap();

    let mut fresh = LocalState::existing(id.clone());
    reconciler.read(&ctx, &mut fresh).await.unwrap();

    let name = AttributePath::new("name");
    let color = AttributePath::new("color");
    assert_eq!(fresh.values.get_string(&name).unwrap(), "gear");
    assert_eq!(fresh.values.get_string(&color).unwrap(), "red");
    assert_eq!(fresh.values.get_string(&AttributePath::new("id")).unwrap(), id);
    // secrets are never read back, so they stay as declared
    assert_eq!(
        state.values.get_string(&AttributePath::new("api_key")).unwrap(),
        "s3cret"
    );
}

#[tokio::test]
async fn read_twice_yields_identical_state() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let ctx = Context::new();
    let mut state = created(&remote).await;

    reconciler.read(&ctx, &mut state).await.unwrap();
    let first = state.clone();
    reconciler.read(&ctx, &mut state).await.unwrap();

    assert_eq!(state, first);
}

#[tokio::test]
async fn create_waits_out_read_after_write_lag() {
    let remote = Arc::new(FakeRemote::default());
    remote.invisible_reads.store(2, Ordering::SeqCst);

    let state = created(&remote).await;

    assert_eq!(state.lifecycle, Lifecycle::Active);
    assert_eq!(remote.creates.load(Ordering::SeqCst), 1);
    assert_eq!(remote.gets.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn create_waits_for_entity_to_become_ready() {
    let remote = Arc::new(FakeRemote::default());
    remote.pending_reads.store(2, Ordering::SeqCst);

    let state = created(&remote).await;

    assert_eq!(state.lifecycle, Lifecycle::Active);
    assert_eq!(remote.pending_reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn readiness_timeout_keeps_the_id() {
    let remote = Arc::new(FakeRemote::default());
    remote.pending_reads.store(u32::MAX, Ordering::SeqCst);
    let reconciler = reconciler(&remote);

    let mut state = LocalState::absent();
    let err = reconciler
        .create(&Context::new(), &mut state, &declared("gear", "red"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(state.lifecycle, Lifecycle::Failed);
    assert_eq!(state.id.as_deref(), Some("w-1"));
}

#[tokio::test]
async fn create_retries_rate_limits() {
    let remote = Arc::new(FakeRemote::default());
    remote
        .create_failures
        .lock()
        .unwrap()
        .extend([RemoteError::new(429, "slow down"), RemoteError::new(503, "busy")]);

    let state = created(&remote).await;

    assert_eq!(state.lifecycle, Lifecycle::Active);
    assert_eq!(remote.creates.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn create_stops_on_terminal_failure() {
    let remote = Arc::new(FakeRemote::default());
    remote
        .create_failures
        .lock()
        .unwrap()
        .push_back(RemoteError::new(400, "name is invalid"));
    let reconciler = reconciler(&remote);

    let mut state = LocalState::absent();
    let err = reconciler
        .create(&Context::new(), &mut state, &declared("gear", "red"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Remote { .. }));
    assert_eq!(err.remote().and_then(|r| r.status), Some(400));
    assert_eq!(remote.creates.load(Ordering::SeqCst), 1);
    assert_eq!(state.lifecycle, Lifecycle::Absent);
    assert!(state.id.is_none());
}

#[tokio::test]
async fn mutually_exclusive_fields_fail_before_any_remote_call() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let config = DynamicValue::from_pairs([
        ("name", Dynamic::from("gear")),
        ("event_ttl_seconds", Dynamic::from(15i64)),
        ("delay_by_seconds", Dynamic::from(90i64)),
    ]);

    let mut state = LocalState::absent();
    let err = reconciler
        .create(&Context::new(), &mut state, &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("Only one of"));
    assert_eq!(remote.creates.load(Ordering::SeqCst), 0);
    assert_eq!(remote.gets.load(Ordering::SeqCst), 0);
    assert_eq!(state.lifecycle, Lifecycle::Absent);
}

#[tokio::test]
async fn update_retries_once_after_version_conflict() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let ctx = Context::new();
    let mut state = created(&remote).await;
    let id = state.id.clone().unwrap();

    // Bring the entity to version 2, then let a concurrent writer move it to 3
    // right after our first refetch
    remote.entities.lock().unwrap().get_mut(&id).unwrap().version = 2;
    remote.concurrent_bumps.store(1, Ordering::SeqCst);
    let gets_before = remote.gets.load(Ordering::SeqCst);

    reconciler
        .update(&ctx, &mut state, &declared("gear", "blue"))
        .await
        .unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Active);
    assert_eq!(
        *remote.update_versions.lock().unwrap(),
        vec![Some(2), Some(3)]
    );
    assert_eq!(remote.updates.load(Ordering::SeqCst), 2);
    // two refetches plus the confirming read
    assert_eq!(remote.gets.load(Ordering::SeqCst) - gets_before, 3);
    assert_eq!(remote.stored(&id).unwrap().color.as_deref(), Some("blue"));
}

#[tokio::test]
async fn update_confirms_through_stale_reads() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    // the two reads after the write still see the old color
    remote.stale_reads.store(2, Ordering::SeqCst);
    let gets_before = remote.gets.load(Ordering::SeqCst);

    reconciler
        .update(&Context::new(), &mut state, &declared("gear", "green"))
        .await
        .unwrap();

    assert_eq!(
        state.values.get_string(&AttributePath::new("color")).unwrap(),
        "green"
    );
    // refetch, two stale confirms, one fresh confirm
    assert_eq!(remote.gets.load(Ordering::SeqCst) - gets_before, 4);
    assert_eq!(remote.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn update_that_never_converges_reports_inconsistency() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    remote.stale_reads.store(u32::MAX, Ordering::SeqCst);

    let err = reconciler
        .update(&Context::new(), &mut state, &declared("gear", "violet"))
        .await
        .unwrap_err();

    match &err {
        ReconcileError::Inconsistent { source, .. } => {
            assert_eq!(source.attribute, "color");
            assert_eq!(source.expected, Dynamic::from("violet"));
        }
        other => panic!("expected inconsistency, got {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Inconsistent);
    assert_eq!(state.lifecycle, Lifecycle::Failed);
    assert!(state.id.is_some());
}

#[tokio::test]
async fn update_requires_an_active_entity() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = LocalState::absent();

    let err = reconciler
        .update(&Context::new(), &mut state, &declared("gear", "red"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::InvalidTransition { .. }));
    assert_eq!(remote.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn read_of_deleted_entity_clears_identity() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    remote.entities.lock().unwrap().clear();

    reconciler.read(&Context::new(), &mut state).await.unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Absent);
    assert!(state.id.is_none());
}

#[tokio::test]
async fn read_failure_leaves_state_untouched() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    let before = state.clone();
    {
        let mut failures = remote.get_failures.lock().unwrap();
        for _ in 0..1000 {
            failures.push_back(RemoteError::new(500, "internal error"));
        }
    }

    let err = reconciler
        .read(&Context::new(), &mut state)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.remote().and_then(|r| r.status), Some(500));
    assert_eq!(state, before);
}

#[tokio::test]
async fn read_drift_is_accepted() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    let id = state.id.clone().unwrap();
    remote.entities.lock().unwrap().get_mut(&id).unwrap().color = Some("changed".to_string());

    reconciler.read(&Context::new(), &mut state).await.unwrap();

    assert_eq!(
        state.values.get_string(&AttributePath::new("color")).unwrap(),
        "changed"
    );
}

#[tokio::test]
async fn delete_confirmed_by_first_404() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    let gets_before = remote.gets.load(Ordering::SeqCst);

    reconciler.delete(&Context::new(), &mut state).await.unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Absent);
    assert!(state.id.is_none());
    assert_eq!(remote.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(remote.gets.load(Ordering::SeqCst) - gets_before, 1);
}

#[tokio::test]
async fn delete_waits_for_lingering_entity() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    remote.lingering_reads.store(2, Ordering::SeqCst);
    let gets_before = remote.gets.load(Ordering::SeqCst);

    reconciler.delete(&Context::new(), &mut state).await.unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Absent);
    assert_eq!(remote.gets.load(Ordering::SeqCst) - gets_before, 3);
}

#[tokio::test]
async fn delete_of_missing_entity_succeeds() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = LocalState::existing("w-404");

    reconciler.delete(&Context::new(), &mut state).await.unwrap();

    assert!(state.is_absent());
}

#[tokio::test]
async fn delete_that_never_confirms_keeps_the_id() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    remote.lingering_reads.store(u32::MAX, Ordering::SeqCst);

    let started = Instant::now();
    let err = reconciler
        .delete(&Context::new(), &mut state)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.to_string().contains("still exists"));
    assert_eq!(state.lifecycle, Lifecycle::Failed);
    assert!(state.id.is_some());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn cancellation_is_distinct_from_timeout() {
    let remote = Arc::new(FakeRemote::default());
    remote.pending_reads.store(u32::MAX, Ordering::SeqCst);
    let reconciler = reconciler(&remote);
    let ctx = Context::new();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let mut state = LocalState::absent();
    let err = reconciler
        .create(&ctx, &mut state, &declared("gear", "red"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(state.lifecycle, Lifecycle::Failed);
}

#[tokio::test]
async fn import_adopts_existing_entity() {
    let remote = Arc::new(FakeRemote::default());
    remote.insert(Widget {
        id: "w-77".to_string(),
        name: "imported".to_string(),
        color: None,
        version: 4,
        status: "active".to_string(),
    });
    let reconciler = reconciler(&remote);

    let state = reconciler.import(&Context::new(), "w-77").await.unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Active);
    assert_eq!(
        state.values.get_string(&AttributePath::new("name")).unwrap(),
        "imported"
    );

    let missing = reconciler.import(&Context::new(), "w-78").await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn apply_converges_from_any_starting_point() {
    let remote = Arc::new(FakeRemote::default());
    let handle: Box<dyn ResourceHandle> = Box::new(reconciler(&remote));
    let ctx = Context::new();
    let mut state = LocalState::absent();

    handle
        .apply(&ctx, &mut state, &declared("gear", "red"))
        .await
        .unwrap();
    assert_eq!(remote.creates.load(Ordering::SeqCst), 1);

    // unchanged declaration is a no-op
    handle
        .apply(&ctx, &mut state, &declared("gear", "red"))
        .await
        .unwrap();
    assert_eq!(remote.updates.load(Ordering::SeqCst), 0);

    handle
        .apply(&ctx, &mut state, &declared("gear", "blue"))
        .await
        .unwrap();
    assert_eq!(remote.updates.load(Ordering::SeqCst), 1);

    // entity deleted out of band gets recreated
    remote.entities.lock().unwrap().clear();
    handle
        .apply(&ctx, &mut state, &declared("gear", "blue"))
        .await
        .unwrap();
    assert_eq!(remote.creates.load(Ordering::SeqCst), 2);
    assert_eq!(state.lifecycle, Lifecycle::Active);
}

#[tokio::test]
async fn force_new_attribute_change_replaces_entity() {
    let remote = Arc::new(FakeRemote::default());
    let handle: Box<dyn ResourceHandle> = Box::new(reconciler(&remote));
    let ctx = Context::new();
    let mut state = LocalState::absent();

    let mut first = declared("gear", "red");
    first
        .set_string(&AttributePath::new("region"), "eu".to_string())
        .unwrap();
    handle.apply(&ctx, &mut state, &first).await.unwrap();
    let original_id = state.id.clone().unwrap();

    let mut moved = declared("gear", "red");
    moved
        .set_string(&AttributePath::new("region"), "us".to_string())
        .unwrap();
    assert_eq!(handle.requires_replace(&state, &moved), vec!["region".to_string()]);

    handle.apply(&ctx, &mut state, &moved).await.unwrap();

    assert_eq!(remote.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(remote.creates.load(Ordering::SeqCst), 2);
    assert_ne!(state.id.unwrap(), original_id);
}

#[tokio::test]
async fn dropping_an_attribute_clears_it_remotely() {
    let remote = Arc::new(FakeRemote::default());
    let handle: Box<dyn ResourceHandle> = Box::new(reconciler(&remote));
    let ctx = Context::new();
    let mut state = LocalState::absent();

    let colored = DynamicValue::from_pairs([
        ("name", Dynamic::from("gear")),
        ("color", Dynamic::from("red")),
    ]);
    handle.apply(&ctx, &mut state, &colored).await.unwrap();
    let id = state.id.clone().unwrap();

    let plain = DynamicValue::from_pairs([("name", Dynamic::from("gear"))]);
    assert!(handle.has_changes(&state, &plain));
    handle.apply(&ctx, &mut state, &plain).await.unwrap();

    assert!(remote.updates.load(Ordering::SeqCst) >= 1);
    assert_eq!(remote.stored(&id).unwrap().color, None);
    assert!(state
        .values
        .get(&AttributePath::new("color"))
        .map_or(true, Dynamic::is_null));
    assert!(!handle.has_changes(&state, &plain));
}

#[tokio::test]
async fn dropping_a_force_new_attribute_replaces_the_entity() {
    let remote = Arc::new(FakeRemote::default());
    let handle: Box<dyn ResourceHandle> = Box::new(reconciler(&remote));
    let ctx = Context::new();
    let mut state = LocalState::absent();

    let mut pinned = declared("gear", "red");
    pinned
        .set_string(&AttributePath::new("region"), "eu".to_string())
        .unwrap();
    handle.apply(&ctx, &mut state, &pinned).await.unwrap();

    assert_eq!(
        handle.requires_replace(&state, &declared("gear", "red")),
        vec!["region".to_string()]
    );
}

#[tokio::test]
async fn apply_after_a_readiness_timeout_keeps_waiting() {
    let remote = Arc::new(FakeRemote::default());
    remote.pending_reads.store(u32::MAX, Ordering::SeqCst);
    let handle: Box<dyn ResourceHandle> = Box::new(reconciler(&remote));
    let ctx = Context::new();
    let mut state = LocalState::absent();

    let first = handle
        .apply(&ctx, &mut state, &declared("gear", "red"))
        .await
        .unwrap_err();
    assert_eq!(first.kind(), ErrorKind::Timeout);
    assert_eq!(state.lifecycle, Lifecycle::Failed);

    let second = handle
        .apply(&ctx, &mut state, &declared("gear", "red"))
        .await
        .unwrap_err();
    assert_eq!(second.kind(), ErrorKind::Timeout);
    assert_eq!(state.lifecycle, Lifecycle::Failed);
    assert_eq!(state.id.as_deref(), Some("w-1"));
    assert_eq!(remote.creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn apply_finishes_a_create_once_the_entity_is_ready() {
    let remote = Arc::new(FakeRemote::default());
    remote.pending_reads.store(u32::MAX, Ordering::SeqCst);
    let handle: Box<dyn ResourceHandle> = Box::new(reconciler(&remote));
    let ctx = Context::new();
    let mut state = LocalState::absent();

    handle
        .apply(&ctx, &mut state, &declared("gear", "red"))
        .await
        .unwrap_err();
    remote.pending_reads.store(0, Ordering::SeqCst);

    handle
        .apply(&ctx, &mut state, &declared("gear", "red"))
        .await
        .unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Active);
    assert_eq!(state.id.as_deref(), Some("w-1"));
    assert_eq!(remote.creates.load(Ordering::SeqCst), 1);
    assert_eq!(
        state.values.get_string(&AttributePath::new("color")).unwrap(),
        "red"
    );
}

#[tokio::test]
async fn read_of_a_pending_entity_does_not_mark_it_active() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let ctx = Context::new();
    let mut state = created(&remote).await;
    state.lifecycle = Lifecycle::Failed;
    remote.pending_reads.store(u32::MAX, Ordering::SeqCst);

    reconciler.read(&ctx, &mut state).await.unwrap();
    assert_eq!(state.lifecycle, Lifecycle::Failed);

    let gets_before = remote.gets.load(Ordering::SeqCst);
    let err = reconciler.resume(&ctx, &mut state).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(remote.gets.load(Ordering::SeqCst) - gets_before > 1);
    assert_eq!(state.lifecycle, Lifecycle::Failed);
    assert!(state.id.is_some());
}

#[tokio::test]
async fn read_of_a_pending_active_entity_stays_active() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    remote.pending_reads.store(1, Ordering::SeqCst);

    reconciler.read(&Context::new(), &mut state).await.unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Active);
}

#[tokio::test]
async fn apply_updates_an_entity_left_failed() {
    let remote = Arc::new(FakeRemote::default());
    let handle: Box<dyn ResourceHandle> = Box::new(reconciler(&remote));
    let ctx = Context::new();
    let mut state = created(&remote).await;
    let id = state.id.clone().unwrap();

    remote.stale_reads.store(u32::MAX, Ordering::SeqCst);
    handle
        .update(&ctx, &mut state, &declared("gear", "violet"))
        .await
        .unwrap_err();
    assert_eq!(state.lifecycle, Lifecycle::Failed);
    remote.stale_reads.store(0, Ordering::SeqCst);

    handle
        .apply(&ctx, &mut state, &declared("gear", "blue"))
        .await
        .unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Active);
    assert_eq!(state.id.as_deref(), Some(id.as_str()));
    assert_eq!(remote.updates.load(Ordering::SeqCst), 2);
    assert_eq!(remote.creates.load(Ordering::SeqCst), 1);
    assert_eq!(remote.stored(&id).unwrap().color.as_deref(), Some("blue"));
}

#[tokio::test]
async fn update_out_of_failed_is_an_invalid_transition() {
    let remote = Arc::new(FakeRemote::default());
    let reconciler = reconciler(&remote);
    let mut state = created(&remote).await;
    state.lifecycle = Lifecycle::Failed;
    let gets_before = remote.gets.load(Ordering::SeqCst);

    let err = reconciler
        .update(&Context::new(), &mut state, &declared("gear", "blue"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::InvalidTransition {
            from: Lifecycle::Failed,
            ..
        }
    ));
    assert_eq!(remote.gets.load(Ordering::SeqCst), gets_before);
    assert_eq!(remote.updates.load(Ordering::SeqCst), 0);
}

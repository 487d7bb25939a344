// ── Collection synchronizer ──
//
// Mirrors one remote collection into a `LiveSet`. Each delivered
// snapshot replaces the whole mirror; records that fail to decode are
// dropped and reported without aborting the rest of the snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use relaydesk_api::{CollectionPath, Document, Query, RemoteStore, Snapshot, SnapshotStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::live_set::{LiveSet, Records};
use super::stream::RecordStream;
use crate::bus::ErrorBus;
use crate::error::CoreError;
use crate::model::Record;

/// Bookkeeping for the running subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub collection: CollectionPath,
    pub query: Query,
    pub last_snapshot_version: u64,
    pub records: usize,
}

/// Keeps a local, observable mirror of one remote collection.
///
/// Cheaply cloneable; clones share the mirror and the subscription.
/// `subscribe` and `unsubscribe` are both idempotent. The subscription
/// ends on `unsubscribe`, when the parent scope is cancelled, or when
/// the last clone is dropped.
pub struct CollectionSynchronizer<T: Record> {
    inner: Arc<SyncInner<T>>,
}

impl<T: Record> Clone for CollectionSynchronizer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SyncInner<T: Record> {
    store: Arc<dyn RemoteStore>,
    mirror: Arc<Mirror<T>>,
    active: Mutex<Option<ActiveSubscription>>,
    scope: CancellationToken,
}

struct ActiveSubscription {
    query: Query,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State shared with the background pump task.
struct Mirror<T: Record> {
    collection: CollectionPath,
    live: LiveSet<T>,
    last_version: AtomicU64,
    errors: ErrorBus,
}

impl<T: Record> CollectionSynchronizer<T> {
    /// Create an idle synchronizer for `collection`, bound to `scope`.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        errors: ErrorBus,
        collection: CollectionPath,
        scope: &CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                mirror: Arc::new(Mirror {
                    collection,
                    live: LiveSet::new(),
                    last_version: AtomicU64::new(0),
                    errors,
                }),
                active: Mutex::new(None),
                scope: scope.child_token(),
            }),
        }
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.inner.mirror.collection
    }

    /// Start mirroring. A second call while a listener is live returns
    /// the existing view without touching the store.
    pub async fn subscribe(&self, query: Query) -> Result<RecordStream<T>, CoreError> {
        let mirror = &self.inner.mirror;
        if query.collection != mirror.collection {
            return Err(CoreError::validation(format!(
                "query for {} sent to the {} synchronizer",
                query.collection, mirror.collection
            )));
        }

        let mut active = self.inner.active.lock().await;
        if let Some(ref current) = *active {
            if !current.task.is_finished() {
                if current.query != query {
                    debug!(
                        collection = %mirror.collection,
                        "already subscribed with a different query, keeping the live one"
                    );
                }
                return Ok(self.stream());
            }
            debug!(collection = %mirror.collection, "previous listener ended, resubscribing");
        }

        if self.inner.scope.is_cancelled() {
            return Err(mirror
                .errors
                .report(CoreError::sync(mirror.collection.as_str(), "session scope has ended")));
        }

        let stream = self
            .inner
            .store
            .subscribe(query.clone())
            .await
            .map_err(|e| {
                mirror
                    .errors
                    .report(CoreError::sync(mirror.collection.as_str(), e))
            })?;

        let cancel = self.inner.scope.child_token();
        mirror.last_version.store(0, Ordering::SeqCst);
        let task = tokio::spawn(pump(stream, Arc::clone(mirror), cancel.clone()));
        info!(collection = %mirror.collection, "subscribed");

        *active = Some(ActiveSubscription {
            query,
            cancel,
            task,
        });
        Ok(self.stream())
    }

    /// Release the remote listener and clear the mirror. Safe to call
    /// when not subscribed.
    pub async fn unsubscribe(&self) {
        let mirror = &self.inner.mirror;
        let mut active = self.inner.active.lock().await;
        if let Some(sub) = active.take() {
            sub.cancel.cancel();
            if let Err(e) = sub.task.await {
                warn!(collection = %mirror.collection, error = %e, "sync task failed");
            }
            info!(collection = %mirror.collection, "unsubscribed");
        }
        mirror.live.clear();
        mirror.last_version.store(0, Ordering::SeqCst);
    }

    /// Whether a listener is currently live.
    pub async fn is_active(&self) -> bool {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .is_some_and(|sub| !sub.task.is_finished())
    }

    pub async fn subscription(&self) -> Option<SubscriptionInfo> {
        let active = self.inner.active.lock().await;
        let sub = active.as_ref()?;
        Some(SubscriptionInfo {
            collection: self.inner.mirror.collection.clone(),
            query: sub.query.clone(),
            last_snapshot_version: self.inner.mirror.last_version.load(Ordering::SeqCst),
            records: self.inner.mirror.live.len(),
        })
    }

    /// Wait until the running subscription has applied its first
    /// snapshot. `None` when there is no live subscription.
    pub async fn loaded(&self) -> Option<Records<T>> {
        let mut rx = self.inner.mirror.live.subscribe();
        loop {
            if !self.is_active().await {
                return None;
            }
            if self.inner.mirror.last_version.load(Ordering::SeqCst) > 0 {
                return Some(self.snapshot());
            }
            rx.changed().await.ok()?;
        }
    }

    /// A live view of the mirror.
    pub fn stream(&self) -> RecordStream<T> {
        RecordStream::new(self.inner.mirror.live.subscribe())
    }

    pub fn snapshot(&self) -> Records<T> {
        self.inner.mirror.live.snapshot()
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.inner.mirror.live.get(key)
    }

    pub(crate) fn live(&self) -> &LiveSet<T> {
        &self.inner.mirror.live
    }
}

impl<T: Record> Drop for SyncInner<T> {
    fn drop(&mut self) {
        if let Some(sub) = self.active.get_mut().take() {
            sub.cancel.cancel();
        }
    }
}

// ── Snapshot handling ────────────────────────────────────────────────

impl<T: Record> Mirror<T> {
    fn apply(&self, snapshot: Snapshot) {
        let last = self.last_version.load(Ordering::SeqCst);
        if snapshot.version <= last {
            debug!(
                collection = %self.collection,
                version = snapshot.version,
                last,
                "stale snapshot discarded"
            );
            return;
        }

        let (records, failures) = decode_snapshot::<T>(&self.collection, &snapshot.documents);
        debug!(
            collection = %self.collection,
            version = snapshot.version,
            records = records.len(),
            rejected = failures.len(),
            "snapshot applied"
        );
        for err in &failures {
            self.errors.publish(err);
        }
        self.live.replace_all_and(records, || {
            self.last_version.store(snapshot.version, Ordering::SeqCst);
        });
    }
}

/// Decode every document of a snapshot, keeping source order. Documents
/// that fail to decode are returned as `DataShape` errors.
pub fn decode_snapshot<T: Record>(
    collection: &CollectionPath,
    documents: &[Document],
) -> (Vec<T>, Vec<CoreError>) {
    let mut records = Vec::with_capacity(documents.len());
    let mut failures = Vec::new();
    for doc in documents {
        match T::decode(doc) {
            Ok(record) => records.push(record),
            Err(shape) => {
                warn!(%collection, id = %doc.id, error = %shape, "record dropped");
                failures.push(CoreError::DataShape {
                    collection: collection.to_string(),
                    id: doc.id.clone(),
                    reason: shape.to_string(),
                });
            }
        }
    }
    (records, failures)
}

/// Drain the listener into the mirror until cancelled or the listener ends.
async fn pump<T: Record>(
    mut stream: SnapshotStream,
    mirror: Arc<Mirror<T>>,
    cancel: CancellationToken,
) {
    loop {
        let delivery = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            delivery = stream.next() => delivery,
        };
        match delivery {
            Some(Ok(snapshot)) => mirror.apply(snapshot),
            // Last-known-good data stays in place.
            Some(Err(e)) => {
                mirror
                    .errors
                    .publish(&CoreError::sync(mirror.collection.as_str(), e));
            }
            None => {
                if !cancel.is_cancelled() {
                    mirror.errors.publish(&CoreError::sync(
                        mirror.collection.as_str(),
                        "listener ended",
                    ));
                }
                break;
            }
        }
    }
    stream.cancel();
    debug!(collection = %mirror.collection, "sync task exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use relaydesk_api::memory::MemoryStore;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::model::CustomerRecord;

    fn clients() -> CollectionPath {
        CollectionPath::new("clients").unwrap()
    }

    fn synchronizer(store: &MemoryStore, bus: &ErrorBus) -> CollectionSynchronizer<CustomerRecord> {
        CollectionSynchronizer::new(
            Arc::new(store.clone()),
            bus.clone(),
            clients(),
            &CancellationToken::new(),
        )
    }

    async fn settle(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn second_subscribe_reuses_listener() {
        let store = MemoryStore::new();
        let bus = ErrorBus::new();
        let sync = synchronizer(&store, &bus);

        sync.subscribe(Query::collection(clients())).await.unwrap();
        sync.subscribe(Query::collection(clients())).await.unwrap();

        assert_eq!(store.subscribe_calls(), 1);
        assert!(sync.is_active().await);
    }

    #[tokio::test]
    async fn snapshots_replace_mirror() {
        let store = MemoryStore::new();
        store.seed("clients", "c1", json!({"name": "Ana"}));
        let bus = ErrorBus::new();
        let sync = synchronizer(&store, &bus);

        let mut view = sync.subscribe(Query::collection(clients())).await.unwrap();
        view.wait_for(|s| s.len() == 1).await.unwrap();

        store.remove("clients/c1");
        store.seed("clients", "c2", json!({"name": "Bob"}));
        let snap = view
            .wait_for(|s| s.len() == 1 && s[0].name == "Bob")
            .await
            .unwrap();
        assert!(sync.get("c1").is_none());
        assert_eq!(snap[0].id.as_str(), "c2");
    }

    #[tokio::test]
    async fn bad_record_is_isolated() {
        let store = MemoryStore::new();
        store.seed("clients", "good", json!({"name": "Ana", "score": 3}));
        store.seed("clients", "bad", json!({"name": "Eve", "score": "lots"}));
        store.seed("clients", "also-good", json!({"name": "Bob"}));
        let bus = ErrorBus::new();
        let sync = synchronizer(&store, &bus);

        let mut view = sync.subscribe(Query::collection(clients())).await.unwrap();
        let snap = view.wait_for(|s| s.len() == 2).await.unwrap();

        let names: Vec<_> = snap.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Ana", "Bob"]);
        let signal = bus.latest().unwrap();
        assert_eq!(signal.kind, ErrorKind::DataShape);
        assert!(signal.message.contains("bad"));
    }

    #[tokio::test]
    async fn unsubscribe_releases_and_clears() {
        let store = MemoryStore::new();
        store.seed("clients", "c1", json!({"name": "Ana"}));
        let bus = ErrorBus::new();
        let sync = synchronizer(&store, &bus);

        let mut view = sync.subscribe(Query::collection(clients())).await.unwrap();
        view.wait_for(|s| !s.is_empty()).await.unwrap();

        sync.unsubscribe().await;
        sync.unsubscribe().await;

        assert!(sync.snapshot().is_empty());
        assert!(!sync.is_active().await);
        settle(|| store.active_listeners() == 0).await;
    }

    #[tokio::test]
    async fn listener_error_keeps_last_known_good() {
        let store = MemoryStore::new();
        store.seed("clients", "c1", json!({"name": "Ana"}));
        let bus = ErrorBus::new();
        let sync = synchronizer(&store, &bus);

        let mut view = sync.subscribe(Query::collection(clients())).await.unwrap();
        view.wait_for(|s| s.len() == 1).await.unwrap();

        store.break_listeners("clients", "permission denied");
        settle(|| bus.latest().is_some()).await;

        assert_eq!(bus.latest().unwrap().kind, ErrorKind::Sync);
        assert_eq!(sync.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn failed_subscribe_is_reported() {
        let store = MemoryStore::new();
        store.fail_next(relaydesk_api::memory::Operation::Subscribe, "quota");
        let bus = ErrorBus::new();
        let sync = synchronizer(&store, &bus);

        let err = sync
            .subscribe(Query::collection(clients()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Sync);
        assert_eq!(bus.published_count(), 1);

        // A later attempt goes through.
        sync.subscribe(Query::collection(clients())).await.unwrap();
        assert!(sync.is_active().await);
    }

    #[test]
    fn stale_versions_are_discarded() {
        let mirror: Mirror<CustomerRecord> = Mirror {
            collection: clients(),
            live: LiveSet::new(),
            last_version: AtomicU64::new(0),
            errors: ErrorBus::new(),
        };
        let doc = |id: &str, name: &str| {
            Document::new(id, json!({"name": name}).as_object().unwrap().clone())
        };

        mirror.apply(Snapshot {
            version: 2,
            documents: vec![doc("c2", "new")],
        });
        mirror.apply(Snapshot {
            version: 1,
            documents: vec![doc("c1", "old")],
        });

        let snap = mirror.live.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name, "new");
    }

    #[tokio::test]
    async fn loaded_waits_for_first_snapshot() {
        let store = MemoryStore::new();
        let bus = ErrorBus::new();
        let sync = synchronizer(&store, &bus);
        assert!(sync.loaded().await.is_none());

        sync.subscribe(Query::collection(clients())).await.unwrap();
        let snap = sync.loaded().await.unwrap();
        assert!(snap.is_empty());
        assert!(sync.subscription().await.unwrap().last_snapshot_version > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn loaded_sees_version_with_first_snapshot() {
        for round in 0..200 {
            let store = MemoryStore::new();
            store.seed("clients", "c1", json!({"name": "Ana"}));
            let bus = ErrorBus::new();
            let sync = synchronizer(&store, &bus);

            sync.subscribe(Query::collection(clients())).await.unwrap();
            let snap = tokio::time::timeout(Duration::from_secs(2), sync.loaded())
                .await
                .unwrap_or_else(|_| panic!("loaded() stalled in round {round}"))
                .unwrap();
            assert_eq!(snap.len(), 1);
        }
    }

    #[test]
    fn decode_snapshot_keeps_source_order() {
        let docs: Vec<Document> = ["z", "a", "m"]
            .iter()
            .map(|id| Document::new(*id, serde_json::Map::new()))
            .collect();
        let (records, failures) = decode_snapshot::<CustomerRecord>(&clients(), &docs);
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["z", "a", "m"]);
        assert!(failures.is_empty());
    }
}

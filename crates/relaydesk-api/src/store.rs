// ── Remote store contract ──
//
// Point reads/writes plus cancellable snapshot listeners. Implemented by
// `HttpClient` (network) and `MemoryStore` (in-process).

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::document::{CollectionPath, Document, DocumentPath, Fields, Query, Snapshot};
use crate::error::Error;

/// Capacity of a listener's delivery channel.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// A remote document store.
///
/// Implementations must be safe for concurrent use: every synchronizer in
/// a session shares the same instance.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read a single document. `Ok(None)` when it does not exist.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, Error>;

    /// Create or overwrite a document.
    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), Error>;

    /// Patch only the given fields of an existing document.
    async fn update(&self, path: &DocumentPath, patch: Fields) -> Result<(), Error>;

    /// Add a document with a store-assigned id, returning the id.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String, Error>;

    /// Start a listener delivering full ordered snapshots of a collection.
    async fn subscribe(&self, query: Query) -> Result<SnapshotStream, Error>;
}

// ── SnapshotStream ───────────────────────────────────────────────────

/// Handle to a running collection listener.
///
/// Snapshots arrive in delivery order. Cancelling the handle (or dropping
/// it) is the only way to stop delivery; it releases the listener slot on
/// the store side.
#[derive(Debug)]
pub struct SnapshotStream {
    collection: CollectionPath,
    rx: mpsc::Receiver<Result<Snapshot, Error>>,
    cancel: CancellationToken,
}

impl SnapshotStream {
    /// Create a stream and the sender half its producer task feeds.
    ///
    /// The producer must stop once `cancel` fires.
    pub fn channel(
        collection: CollectionPath,
        cancel: CancellationToken,
    ) -> (mpsc::Sender<Result<Snapshot, Error>>, Self) {
        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        (
            tx,
            Self {
                collection,
                rx,
                cancel,
            },
        )
    }

    /// The watched collection.
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Next delivery. `None` once the listener has terminated.
    pub async fn next(&mut self) -> Option<Result<Snapshot, Error>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Stop delivery and release the listener.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── In-process store and auth ──
//
// A complete, concurrent-safe implementation of the store and auth
// contracts that lives entirely in memory. Used by the test suites and
// for running the core without a backend. Adds hooks the network
// implementation cannot offer: one-shot failure injection, a pause
// gate, and listener/write counters.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::auth::{Identity, RemoteAuth};
use crate::document::{
    CollectionPath, Direction, Document, DocumentPath, Fields, OrderBy, Query, Snapshot,
    is_server_timestamp,
};
use crate::error::Error;
use crate::store::{RemoteStore, SnapshotStream};

const LISTENER_ERROR_CAPACITY: usize = 16;

/// Store operations that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Set,
    Update,
    Add,
    Subscribe,
}

type Collections = IndexMap<String, IndexMap<String, Fields>>;

// ── MemoryStore ──────────────────────────────────────────────────────

/// In-memory document store. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    collections: Mutex<Collections>,
    /// Bumped after every write; listeners rebuild on change.
    revision: watch::Sender<u64>,
    /// Injected listener errors: (collection, message).
    listener_errors: broadcast::Sender<(String, String)>,
    failures: Mutex<HashMap<Operation, String>>,
    paused: watch::Sender<bool>,
    active_listeners: AtomicUsize,
    subscribe_calls: AtomicUsize,
    writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0u64);
        let (listener_errors, _) = broadcast::channel(LISTENER_ERROR_CAPACITY);
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(StoreInner {
                collections: Mutex::new(IndexMap::new()),
                revision,
                listener_errors,
                failures: Mutex::new(HashMap::new()),
                paused,
                active_listeners: AtomicUsize::new(0),
                subscribe_calls: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }),
        }
    }

    // ── Test hooks ───────────────────────────────────────────────────

    /// Insert a document as if another client wrote it. Not counted as a write.
    pub fn seed(&self, collection: &str, id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            other => {
                let mut map = Fields::new();
                map.insert("value".into(), other);
                map
            }
        };
        self.write_document(collection, id, resolve_sentinels(fields), false);
        self.notify();
    }

    /// Remove a document as if another client deleted it.
    pub fn remove(&self, path: &str) -> bool {
        let Ok(path) = DocumentPath::new(path) else {
            return false;
        };
        let removed = {
            let mut cols = self.lock_collections();
            cols.get_mut(path.parent().as_str())
                .and_then(|docs| docs.shift_remove(path.id()))
                .is_some()
        };
        if removed {
            self.notify();
        }
        removed
    }

    /// Current fields of a document, bypassing failure injection.
    pub fn document(&self, path: &str) -> Option<Fields> {
        let path = DocumentPath::new(path).ok()?;
        self.lock_collections()
            .get(path.parent().as_str())
            .and_then(|docs| docs.get(path.id()))
            .cloned()
    }

    /// Number of documents in a collection.
    pub fn collection_len(&self, collection: &str) -> usize {
        self.lock_collections().get(collection).map_or(0, IndexMap::len)
    }

    /// Make the next call of `op` fail with `message`.
    pub fn fail_next(&self, op: Operation, message: impl Into<String>) {
        self.inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, message.into());
    }

    /// Deliver an error to every listener on `collection`.
    pub fn break_listeners(&self, collection: &str, message: impl Into<String>) {
        let _ = self
            .inner
            .listener_errors
            .send((collection.to_owned(), message.into()));
    }

    /// Hold every store call until the returned guard is dropped.
    pub fn pause(&self) -> PauseGuard {
        self.inner.paused.send_replace(true);
        PauseGuard(Arc::clone(&self.inner))
    }

    /// Listeners currently running.
    pub fn active_listeners(&self) -> usize {
        self.inner.active_listeners.load(AtomicOrdering::SeqCst)
    }

    /// Total successful `subscribe` calls.
    pub fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.load(AtomicOrdering::SeqCst)
    }

    /// Total successful writes (`set`, `update`, `add`).
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(AtomicOrdering::SeqCst)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn lock_collections(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, op: Operation) -> Result<(), Error> {
        let mut paused = self.inner.paused.subscribe();
        let _ = paused.wait_for(|p| !*p).await;

        let injected = self
            .inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&op);
        match injected {
            Some(message) => {
                debug!(?op, %message, "injected failure");
                Err(Error::Injected(message))
            }
            None => Ok(()),
        }
    }

    fn write_document(&self, collection: &str, id: &str, fields: Fields, counted: bool) {
        self.lock_collections()
            .entry(collection.to_owned())
            .or_default()
            .insert(id.to_owned(), fields);
        if counted {
            self.inner.writes.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    fn notify(&self) {
        self.inner.revision.send_modify(|r| *r += 1);
    }

    fn snapshot_documents(&self, query: &Query) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .lock_collections()
            .get(query.collection.as_str())
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(ref order) = query.order_by {
            sort_documents(&mut documents, order);
        }
        documents
    }
}

/// Releases a [`MemoryStore::pause`] on drop.
pub struct PauseGuard(Arc<StoreInner>);

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.0.paused.send_replace(false);
    }
}

/// Decrements the active listener count when a listener task ends.
struct ListenerSlot(Arc<StoreInner>);

impl Drop for ListenerSlot {
    fn drop(&mut self) {
        self.0.active_listeners.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, Error> {
        self.enter(Operation::Get).await?;
        Ok(self
            .document(path.as_str())
            .map(|fields| Document::new(path.id(), fields)))
    }

    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), Error> {
        self.enter(Operation::Set).await?;
        self.write_document(
            path.parent().as_str(),
            path.id(),
            resolve_sentinels(fields),
            true,
        );
        trace!(path = %path, "set");
        self.notify();
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, patch: Fields) -> Result<(), Error> {
        self.enter(Operation::Update).await?;
        {
            let mut cols = self.lock_collections();
            let doc = cols
                .get_mut(path.parent().as_str())
                .and_then(|docs| docs.get_mut(path.id()))
                .ok_or_else(|| Error::NotFound {
                    path: path.to_string(),
                })?;
            for (key, value) in resolve_sentinels(patch) {
                doc.insert(key, value);
            }
        }
        self.inner.writes.fetch_add(1, AtomicOrdering::SeqCst);
        trace!(path = %path, "update");
        self.notify();
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String, Error> {
        self.enter(Operation::Add).await?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.write_document(collection.as_str(), &id, resolve_sentinels(fields), true);
        trace!(collection = %collection, %id, "add");
        self.notify();
        Ok(id)
    }

    async fn subscribe(&self, query: Query) -> Result<SnapshotStream, Error> {
        self.enter(Operation::Subscribe).await?;

        let cancel = CancellationToken::new();
        let (tx, stream) = SnapshotStream::channel(query.collection.clone(), cancel.clone());

        let mut revision = self.inner.revision.subscribe();
        let mut errors = self.inner.listener_errors.subscribe();
        self.inner.active_listeners.fetch_add(1, AtomicOrdering::SeqCst);
        self.inner.subscribe_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let slot = ListenerSlot(Arc::clone(&self.inner));
        let store = self.clone();

        tokio::spawn(async move {
            let _slot = slot;
            let collection = query.collection.as_str().to_owned();
            let mut version = 0u64;

            let _ = revision.borrow_and_update();
            loop {
                version += 1;
                let snapshot = Snapshot {
                    version,
                    documents: store.snapshot_documents(&query),
                };
                if tx.send(Ok(snapshot)).await.is_err() {
                    break;
                }

                // Wait for the next relevant event.
                let keep_going = loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break false,
                        changed = revision.changed() => break changed.is_ok(),
                        injected = errors.recv() => {
                            if let Ok((target, message)) = injected {
                                if target == collection
                                    && tx.send(Err(Error::Injected(message))).await.is_err()
                                {
                                    break false;
                                }
                            }
                        }
                    }
                };
                if !keep_going {
                    break;
                }
            }
            debug!(%collection, "memory listener released");
        });

        Ok(stream)
    }
}

// ── Ordering & sentinels ─────────────────────────────────────────────

fn resolve_sentinels(mut fields: Fields) -> Fields {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    for value in fields.values_mut() {
        if is_server_timestamp(value) {
            *value = Value::String(now.clone());
        }
    }
    fields
}

fn sort_documents(documents: &mut [Document], order: &OrderBy) {
    documents.sort_by(|a, b| {
        let ord = compare_values(a.fields.get(&order.field), b.fields.get(&order.field));
        match order.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    });
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over JSON field values. Timestamps (RFC 3339 strings)
/// compare chronologically; mixed types order by type rank.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(tx), Ok(ty)) => tx.cmp(&ty),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// ── MemoryAuth ───────────────────────────────────────────────────────

struct Account {
    password: String,
    uid: String,
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<Identity>>,
    sign_in_calls: AtomicUsize,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account; returns the identity it signs in as.
    pub fn register(&self, email: &str, password: &str) -> Identity {
        let uid = format!("uid-{}", uuid::Uuid::new_v4().simple());
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                email.to_owned(),
                Account {
                    password: password.to_owned(),
                    uid: uid.clone(),
                },
            );
        Identity {
            uid,
            email: email.to_owned(),
        }
    }

    /// Pretend `identity` is already signed in (a persisted session).
    pub fn set_current(&self, identity: Option<Identity>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = identity;
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl RemoteAuth for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Identity, Error> {
        self.sign_in_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let identity = {
            let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            match accounts.get(email) {
                Some(account) if account.password == password.expose_secret() => Identity {
                    uid: account.uid.clone(),
                    email: email.to_owned(),
                },
                _ => {
                    return Err(Error::Authentication {
                        message: "invalid email or password".into(),
                    });
                }
            }
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.set_current(None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

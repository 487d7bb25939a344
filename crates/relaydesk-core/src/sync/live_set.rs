// ── Observable local mirror ──
//
// Ordered record storage with O(1) id lookups and push-based change
// notification via a `watch` snapshot.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::Record;

/// Shared snapshot type handed to observers.
pub type Records<T> = Arc<Vec<Arc<T>>>;

/// The local mirror of one synchronized collection.
///
/// The ordered `Vec` inside the watch channel is authoritative; `by_id`
/// indexes it. Every mutation publishes a fresh snapshot.
pub(crate) struct LiveSet<T: Record> {
    by_id: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Records<T>>,
}

impl<T: Record> LiveSet<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Replace the whole mirror, keeping `items` in the given order.
    pub(crate) fn replace_all(&self, items: Vec<T>) {
        self.replace_all_and(items, || ());
    }

    /// Like [`replace_all`](Self::replace_all), running `commit` under the
    /// snapshot's write lock so observers woken by this change also see
    /// whatever `commit` records.
    pub(crate) fn replace_all_and(&self, items: Vec<T>, commit: impl FnOnce()) {
        let items: Vec<Arc<T>> = items.into_iter().map(Arc::new).collect();
        self.snapshot.send_modify(|snap| {
            self.by_id.clear();
            for item in &items {
                self.by_id.insert(item.key().to_owned(), Arc::clone(item));
            }
            *snap = Arc::new(items);
            commit();
        });
    }

    pub(crate) fn clear(&self) {
        self.replace_all(Vec::new());
    }

    /// Replace the record with id `key` in place. Returns the new value, or
    /// `None` if the mirror does not hold `key`.
    pub(crate) fn patch(&self, key: &str, f: impl FnOnce(&T) -> T) -> Option<Arc<T>> {
        let mut patched = None;
        self.snapshot.send_if_modified(|snap| {
            let Some(pos) = snap.iter().position(|item| item.key() == key) else {
                return false;
            };
            let updated = Arc::new(f(&snap[pos]));
            let mut items = snap.to_vec();
            items[pos] = Arc::clone(&updated);
            self.by_id.insert(key.to_owned(), Arc::clone(&updated));
            *snap = Arc::new(items);
            patched = Some(updated);
            true
        });
        patched
    }

    /// Append a record unless its id is already present.
    pub(crate) fn push_if_absent(&self, item: T) -> bool {
        self.snapshot.send_if_modified(|snap| {
            if self.by_id.contains_key(item.key()) {
                return false;
            }
            let item = Arc::new(item);
            let mut items = snap.to_vec();
            items.push(Arc::clone(&item));
            self.by_id.insert(item.key().to_owned(), item);
            *snap = Arc::new(items);
            true
        })
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_id.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Records<T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Records<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }
}

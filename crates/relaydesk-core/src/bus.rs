// ── Error signal bus ──
//
// A single most-recent-error slot for the presentation layer. Not a
// queue: each publish overwrites the slot, and `acknowledge` clears it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{CoreError, ErrorKind};

/// One published error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSignal {
    /// Monotonic publish sequence, starting at 1.
    pub seq: u64,
    pub kind: ErrorKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Shared handle to the session's error slot. Clones share the slot.
#[derive(Clone)]
pub struct ErrorBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    slot: watch::Sender<Option<Arc<ErrorSignal>>>,
    seq: AtomicU64,
}

impl Default for ErrorBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorBus {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            inner: Arc::new(BusInner {
                slot,
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Overwrite the slot with `err`. Local errors are refused and `None`
    /// is returned.
    pub fn publish(&self, err: &CoreError) -> Option<Arc<ErrorSignal>> {
        if err.is_local() {
            debug!(kind = %err.kind(), "local error not published");
            return None;
        }

        // The sequence is taken under the slot's write lock so the slot
        // always holds the highest seq handed out.
        let mut published = None;
        self.inner.slot.send_modify(|slot| {
            let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
            let signal = Arc::new(ErrorSignal {
                seq,
                kind: err.kind(),
                message: err.to_string(),
                raised_at: Utc::now(),
            });
            *slot = Some(Arc::clone(&signal));
            published = Some(signal);
        });
        if let Some(signal) = &published {
            warn!(kind = %signal.kind, seq = signal.seq, "{}", signal.message);
        }
        published
    }

    /// Publish `err` and hand it back, for `return Err(bus.report(e))`.
    pub fn report(&self, err: CoreError) -> CoreError {
        self.publish(&err);
        err
    }

    /// The current unacknowledged error, if any.
    pub fn latest(&self) -> Option<Arc<ErrorSignal>> {
        self.inner.slot.borrow().clone()
    }

    /// Clear the slot, returning what was in it.
    pub fn acknowledge(&self) -> Option<Arc<ErrorSignal>> {
        self.inner.slot.send_replace(None)
    }

    /// Watch the slot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ErrorSignal>>> {
        self.inner.slot.subscribe()
    }

    /// Total errors published since creation.
    pub fn published_count(&self) -> u64 {
        self.inner.seq.load(Ordering::SeqCst)
    }
}

// ── Busy indicator ───────────────────────────────────────────────────

/// Loading flag raised while a login or mutation is in flight.
///
/// Nested operations are counted; the flag drops only when the last
/// [`BusyGuard`] is released.
#[derive(Clone)]
pub struct BusyIndicator {
    inner: Arc<BusyInner>,
}

struct BusyInner {
    depth: AtomicU64,
    flag: watch::Sender<bool>,
}

impl Default for BusyIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl BusyIndicator {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            inner: Arc::new(BusyInner {
                depth: AtomicU64::new(0),
                flag,
            }),
        }
    }

    pub fn enter(&self) -> BusyGuard {
        self.inner.shift(true);
        BusyGuard(Arc::clone(&self.inner))
    }

    pub fn is_busy(&self) -> bool {
        *self.inner.flag.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.flag.subscribe()
    }
}

/// Lowers the busy flag on drop.
pub struct BusyGuard(Arc<BusyInner>);

impl BusyInner {
    /// Move the depth one step and derive the flag from the result, both
    /// under the flag's write lock.
    fn shift(&self, raise: bool) {
        self.flag.send_if_modified(|busy| {
            let depth = if raise {
                self.depth.fetch_add(1, Ordering::SeqCst) + 1
            } else {
                self.depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
            };
            let changed = *busy != (depth > 0);
            *busy = depth > 0;
            changed
        });
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.shift(false);
    }
}

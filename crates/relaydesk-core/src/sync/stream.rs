// ── Reactive record streams ──
//
// Subscription handle over a synchronizer's local mirror.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::live_set::Records;
use crate::model::Record;

/// A live view of one synchronized collection.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct RecordStream<T: Record> {
    current: Records<T>,
    receiver: watch::Receiver<Records<T>>,
}

impl<T: Record> RecordStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Records<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Records<T> {
        &self.current
    }

    /// The latest snapshot (may have changed since `current`).
    pub fn latest(&self) -> Records<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the synchronizer has been dropped.
    pub async fn changed(&mut self) -> Option<Records<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Wait until the mirror satisfies `predicate`, returning that snapshot.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&[Arc<T>]) -> bool,
    ) -> Option<Records<T>> {
        let snap = self
            .receiver
            .wait_for(|snap| predicate(snap))
            .await
            .ok()?
            .clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> RecordWatchStream<T> {
        RecordWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a snapshot each time the mirror changes.
pub struct RecordWatchStream<T: Record> {
    inner: WatchStream<Records<T>>,
}

impl<T: Record> Stream for RecordWatchStream<T> {
    type Item = Records<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

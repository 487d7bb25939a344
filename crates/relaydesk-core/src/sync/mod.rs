// ── Collection synchronization ──

mod live_set;
mod stream;
mod synchronizer;

pub use live_set::Records;
pub use stream::{RecordStream, RecordWatchStream};
pub use synchronizer::{CollectionSynchronizer, SubscriptionInfo, decode_snapshot};

// ── Domain model ──
//
// Typed records decoded from raw store documents.

mod chat;
mod customer;
mod ids;
mod profile;
mod schema;

pub use chat::{ChatMessage, SENT_AT_FIELD, Topic};
pub use customer::CustomerRecord;
pub use ids::{ClientId, MessageId, TopicId, UserId};
pub use profile::{Profile, Role};
pub use schema::{Record, SCHEMA_VERSION, SCHEMA_VERSION_FIELD, SentAt, ShapeError};

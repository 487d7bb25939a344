//! Client-side state layer between `relaydesk-api` and its consumers.
//!
//! This crate owns the session, the local mirrors of remote collections,
//! and every write the application makes:
//!
//! - **[`SessionController`]**: State machine for sign-in:
//!   `SignedOut → Authenticating → ProfileResolving → Ready(role)`. The
//!   transition function refuses `Ready` without a resolved profile, and
//!   the `Ready` role decides whether the `clients` collection is mirrored.
//!
//! - **[`CollectionSynchronizer<T>`]**: Mirrors one remote collection into
//!   a `DashMap` + `tokio::sync::watch` store. Every snapshot replaces the
//!   mirror; undecodable records are dropped and reported individually.
//!
//! - **[`RecordStream<T>`]**: Subscription handle over a mirror, with
//!   `current()` / `latest()` / `changed()` and a `Stream` adapter.
//!
//! - **[`FilteredView`]** / [`project`]: Case-insensitive search over the
//!   client mirror, recomputed whenever the mirror or the query changes.
//!
//! - **[`MutationCoordinator`]**: Quick notes, chat messages, campaigns
//!   and push-token registration, reflected into the mirrors.
//!
//! - **[`ErrorBus`]**: Single-slot, most-recent-error signal for UI
//!   consumers. Local validation errors never reach it.
//!
//! All collaborators are passed in through a [`SessionContext`]; nothing
//! here is global.

pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod model;
pub mod mutation;
pub mod paths;
pub mod session;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{BusyIndicator, ErrorBus, ErrorSignal};
pub use config::{ConnectionConfig, Credentials, TlsVerification};
pub use context::SessionContext;
pub use error::{CoreError, ErrorKind};
pub use filter::{ClientFilter, FilteredView, project};
pub use mutation::{
    CampaignDispatcher, CampaignReceipt, CampaignRequest, LoggingDispatcher, MutationCoordinator,
    SendOutcome,
};
pub use session::{Session, SessionController, SessionPhase};
pub use sync::{CollectionSynchronizer, RecordStream, Records, SubscriptionInfo};

pub use model::{
    ChatMessage, ClientId, CustomerRecord, MessageId, Profile, Record, Role, SentAt, ShapeError,
    Topic, TopicId, UserId,
};

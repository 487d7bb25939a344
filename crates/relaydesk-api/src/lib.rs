//! Remote collaborators for relaydesk: the document store and the auth
//! service.
//!
//! - [`RemoteStore`] / [`RemoteAuth`]: the contracts `relaydesk-core`
//!   depends on. Every operation is fallible and async.
//! - [`HttpClient`]: REST + WebSocket implementation of both.
//! - [`memory`]: in-process implementations with failure injection.

pub mod auth;
pub mod document;
pub mod error;
pub mod http;
pub mod memory;
pub mod store;
pub mod transport;

pub use auth::{Identity, RemoteAuth};
pub use document::{
    CollectionPath, Direction, Document, DocumentPath, Fields, OrderBy, Query, Snapshot,
    is_server_timestamp, server_timestamp,
};
pub use error::Error;
pub use http::{HttpClient, ReconnectConfig};
pub use store::{RemoteStore, SnapshotStream};
pub use transport::{TlsMode, TransportConfig};

use thiserror::Error;

/// Top-level error type for the `relaydesk-api` crate.
///
/// Covers every failure mode of the remote collaborators: authentication,
/// transport, document reads/writes, and snapshot listeners.
/// `relaydesk-core` classifies these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Sign-in rejected (wrong credentials, disabled account, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A store call was made before any identity signed in.
    #[error("Not signed in")]
    NotSignedIn,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Documents ───────────────────────────────────────────────────
    /// Malformed document or collection path.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Update targeted a document that does not exist.
    #[error("Document not found: {path}")]
    NotFound { path: String },

    /// Structured error returned by the store.
    #[error("Remote store error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Listeners ───────────────────────────────────────────────────
    /// Listener connection failed.
    #[error("Listener connection failed: {0}")]
    ListenerConnect(String),

    /// Listener closed by the server.
    #[error("Listener closed (code {code}): {reason}")]
    ListenerClosed { code: u16, reason: String },

    /// The store gave up on a listener (retry budget exhausted, store dropped).
    #[error("Listener for {collection} terminated")]
    ListenerTerminated { collection: String },

    /// Deliberately injected failure (in-memory store only).
    #[error("Injected failure: {0}")]
    Injected(String),
}

impl Error {
    /// Whether the error is an authentication/authorization failure.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::NotSignedIn)
    }

    /// Whether the error is a missing-document condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

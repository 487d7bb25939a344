// ── Core error types ──
//
// The failure taxonomy seen by consumers of relaydesk-core. Transport
// details from `relaydesk_api::Error` are folded into the variant that
// names *which* component failed; the raw error only survives as text.

use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Discriminant of a [`CoreError`], used by the error bus and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    ProfileLoad,
    DataShape,
    Sync,
    Mutation,
    NoRecipients,
    SessionBusy,
    NotSignedIn,
    Config,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Local ────────────────────────────────────────────────────────
    #[error("{message}")]
    Validation { message: String },

    #[error("A sign-in is already in progress")]
    SessionBusy,

    #[error("Not signed in")]
    NotSignedIn,

    // ── Session ──────────────────────────────────────────────────────
    #[error("Sign-in failed: {message}")]
    Auth { message: String },

    #[error("Could not load profile for {uid}: {message}")]
    ProfileLoad { uid: String, message: String },

    // ── Sync ─────────────────────────────────────────────────────────
    #[error("Record {collection}/{id} has an unexpected shape: {reason}")]
    DataShape {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Sync of {collection} failed: {message}")]
    Sync { collection: String, message: String },

    // ── Mutations ────────────────────────────────────────────────────
    #[error("{operation} failed: {message}")]
    Mutation {
        operation: &'static str,
        message: String,
    },

    #[error("No clients are tagged '{segment}'")]
    NoRecipients { segment: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn mutation(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Mutation {
            operation,
            message: err.to_string(),
        }
    }

    pub fn sync(collection: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Sync {
            collection: collection.into(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::SessionBusy => ErrorKind::SessionBusy,
            Self::NotSignedIn => ErrorKind::NotSignedIn,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::ProfileLoad { .. } => ErrorKind::ProfileLoad,
            Self::DataShape { .. } => ErrorKind::DataShape,
            Self::Sync { .. } => ErrorKind::Sync,
            Self::Mutation { .. } => ErrorKind::Mutation,
            Self::NoRecipients { .. } => ErrorKind::NoRecipients,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Errors resolved at the call site that never reach the error bus.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::SessionBusy | Self::NotSignedIn | Self::Config { .. }
        )
    }
}

impl From<relaydesk_api::Error> for CoreError {
    /// Fallback mapping for call sites without a more specific context.
    fn from(err: relaydesk_api::Error) -> Self {
        match err {
            relaydesk_api::Error::Authentication { message } => Self::Auth { message },
            relaydesk_api::Error::NotSignedIn => Self::NotSignedIn,
            relaydesk_api::Error::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            relaydesk_api::Error::Tls(message) => Self::Config {
                message: format!("TLS error: {message}"),
            },
            relaydesk_api::Error::InvalidPath { path, reason } => Self::Validation {
                message: format!("Invalid path '{path}': {reason}"),
            },
            other => Self::Sync {
                collection: String::new(),
                message: other.to_string(),
            },
        }
    }
}

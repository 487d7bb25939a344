//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use relaydesk_config::ConfigError;
use relaydesk_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not sync {collection}: {message}")]
    #[diagnostic(
        code(relaydesk::sync_failed),
        help(
            "Check that the store is reachable and its listener endpoint is correct.\n\
             Set listen_endpoint in your profile if it differs from the store URL."
        )
    )]
    SyncFailed { collection: String, message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Sign-in failed: {message}")]
    #[diagnostic(
        code(relaydesk::auth_failed),
        help(
            "Verify the email and password for this profile.\n\
             Run: relaydesk config set-password --profile <name>"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(relaydesk::no_credentials),
        help(
            "Set email in the profile and store a password with: relaydesk config set-password\n\
             Or pass --email and set RELAYDESK_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    #[error("Could not load the profile for this account: {message}")]
    #[diagnostic(code(relaydesk::profile_load))]
    ProfileLoad { message: String },

    #[error("'{command}' needs an operator account")]
    #[diagnostic(
        code(relaydesk::operator_only),
        help("Client lists and campaigns are only mirrored for operator profiles.")
    )]
    OperatorOnly { command: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(relaydesk::not_found),
        help("Run: relaydesk {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Record {id} in {collection} could not be read: {reason}")]
    #[diagnostic(code(relaydesk::data_shape))]
    DataShape {
        collection: String,
        id: String,
        reason: String,
    },

    // ── Writes ───────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(relaydesk::write_failed))]
    WriteFailed { message: String },

    #[error("No clients are tagged '{segment}'")]
    #[diagnostic(
        code(relaydesk::no_recipients),
        help("Segment tags match exactly, including case. Run: relaydesk clients list")
    )]
    NoRecipients { segment: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(relaydesk::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(relaydesk::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Add one to the config file or pass --endpoint."
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No store configured")]
    #[diagnostic(
        code(relaydesk::no_config),
        help(
            "Pass --endpoint or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(relaydesk::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s waiting for {what}")]
    #[diagnostic(
        code(relaydesk::timeout),
        help("Increase the timeout with --timeout or check the store's responsiveness.")
    )]
    Timeout { what: String, seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(relaydesk::render))]
    Render(String),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SyncFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::OperatorOnly { .. } => exit_code::PERMISSION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::SessionBusy | CoreError::NotSignedIn => Self::AuthFailed {
                message: err.to_string(),
            },

            CoreError::Auth { message } => Self::AuthFailed { message },

            CoreError::ProfileLoad { message, .. } => Self::ProfileLoad { message },

            CoreError::DataShape {
                collection,
                id,
                reason,
            } => Self::DataShape {
                collection,
                id,
                reason,
            },

            CoreError::Sync {
                collection,
                message,
            } => Self::SyncFailed {
                collection,
                message,
            },

            CoreError::Mutation { .. } => Self::WriteFailed {
                message: err.to_string(),
            },

            CoreError::NoRecipients { segment } => Self::NoRecipients { segment },

            CoreError::Config { message } => Self::Validation {
                field: "connection".into(),
                reason: message,
            },
        }
    }
}

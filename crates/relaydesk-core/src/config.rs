// ── Runtime connection configuration ──
//
// Describes *how* to reach the document store. Carries credentials and
// connection tuning but never touches disk; the CLI builds one from its
// config file and hands it in.

use std::time::Duration;

use relaydesk_api::ReconnectConfig;
use secrecy::SecretString;
use url::Url;

/// Email/password pair used by `login`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed development servers).
    DangerAcceptInvalid,
}

/// Configuration for one store endpoint.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Store base URL (e.g., `https://store.example.com`).
    pub url: Url,
    /// Listener base URL. Derived from `url` when `None`.
    pub listen_url: Option<Url>,
    /// Credentials, when the caller already has them.
    pub credentials: Option<Credentials>,
    pub tls: TlsVerification,
    /// Per-request transport timeout.
    pub timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            listen_url: None,
            credentials: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

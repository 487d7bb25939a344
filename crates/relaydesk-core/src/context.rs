// ── Shared session context ──
//
// The collaborators every component of a session talks to. Constructed
// once and cloned into the controller, synchronizers and mutations.

use std::sync::Arc;

use relaydesk_api::{HttpClient, RemoteAuth, RemoteStore, TlsMode, TransportConfig};
use tracing::debug;

use crate::bus::ErrorBus;
use crate::config::{ConnectionConfig, TlsVerification};
use crate::error::CoreError;
use crate::mutation::{CampaignDispatcher, LoggingDispatcher};

/// Explicit dependency bundle for a session.
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn RemoteStore>,
    pub auth: Arc<dyn RemoteAuth>,
    pub errors: ErrorBus,
    pub dispatcher: Arc<dyn CampaignDispatcher>,
}

impl SessionContext {
    /// Context with a fresh error bus and a logging campaign dispatcher.
    pub fn new(store: Arc<dyn RemoteStore>, auth: Arc<dyn RemoteAuth>) -> Self {
        Self {
            store,
            auth,
            errors: ErrorBus::new(),
            dispatcher: Arc::new(LoggingDispatcher),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn CampaignDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Build a network-backed context: one [`HttpClient`] serves as both
    /// the store and the auth service.
    pub fn connect(config: &ConnectionConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: tls_mode(&config.tls),
            timeout: config.timeout,
        };
        let client = HttpClient::new(
            config.url.clone(),
            config.listen_url.clone(),
            config.reconnect.clone(),
            &transport,
        )
        .map_err(|e| CoreError::Config {
            message: e.to_string(),
        })?;
        debug!(url = %client.base_url(), listen = %client.listen_url(), "store client ready");

        let client = Arc::new(client);
        Ok(Self::new(
            Arc::clone(&client) as Arc<dyn RemoteStore>,
            client as Arc<dyn RemoteAuth>,
        ))
    }
}

fn tls_mode(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;

    #[test]
    fn connect_builds_http_context() {
        let config = ConnectionConfig::new(Url::parse("https://store.example.com").unwrap());
        let ctx = SessionContext::connect(&config).unwrap();
        assert!(ctx.auth.current_identity().is_none());
        assert!(ctx.errors.latest().is_none());
    }

    #[test]
    fn missing_ca_file_is_a_config_error() {
        let mut config = ConnectionConfig::new(Url::parse("https://store.example.com").unwrap());
        config.tls = TlsVerification::CustomCa("/nonexistent/ca.pem".into());
        let Err(err) = SessionContext::connect(&config) else {
            panic!("expected a config error");
        };
        assert!(matches!(err, CoreError::Config { .. }));
    }
}

// ── Remote auth contract ──

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An authenticated identity as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

/// Credential sign-in/sign-out.
#[async_trait]
pub trait RemoteAuth: Send + Sync {
    /// Exchange email + password for an identity.
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Identity, Error>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), Error>;

    /// The identity currently signed in, if any.
    fn current_identity(&self) -> Option<Identity>;
}

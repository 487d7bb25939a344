// HTTP document-store client
//
// Wraps `reqwest::Client` with document URL construction, bearer-token
// session handling, and status mapping. Listeners run over WebSocket in
// `listener.rs`; this module only spawns them.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::listener::{self, ReconnectConfig};
use crate::auth::{Identity, RemoteAuth};
use crate::document::{CollectionPath, Document, DocumentPath, Fields, Query};
use crate::error::Error;
use crate::store::{RemoteStore, SnapshotStream};
use crate::transport::TransportConfig;

/// Maximum number of body bytes quoted in error messages.
const ERROR_PREVIEW_LEN: usize = 200;

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct FieldsBody<'a> {
    fields: &'a Fields,
}

#[derive(Deserialize)]
struct AddResponse {
    id: String,
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct SignInResponse {
    uid: String,
    email: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

struct AuthSession {
    identity: Identity,
    token: SecretString,
}

// ── HttpClient ───────────────────────────────────────────────────────

/// Network client for the document store and its auth endpoints.
///
/// Implements both [`RemoteStore`] and [`RemoteAuth`]: the bearer token
/// obtained by `sign_in` is attached to every subsequent store call and
/// listener upgrade.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    listen_url: Url,
    reconnect: ReconnectConfig,
    session: RwLock<Option<AuthSession>>,
}

impl HttpClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `listen_url` defaults to `base_url` with the scheme switched to
    /// `ws`/`wss`.
    pub fn new(
        base_url: Url,
        listen_url: Option<Url>,
        reconnect: ReconnectConfig,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url, listen_url, reconnect)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        listen_url: Option<Url>,
        reconnect: ReconnectConfig,
    ) -> Result<Self, Error> {
        let listen_url = match listen_url {
            Some(url) => url,
            None => derive_listen_url(&base_url)?,
        };
        Ok(Self {
            http,
            base_url,
            listen_url,
            reconnect,
            session: RwLock::new(None),
        })
    }

    /// The store base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The listener base URL.
    pub fn listen_url(&self) -> &Url {
        &self.listen_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/v1/{path}"))?)
    }

    fn document_url(&self, path: &str) -> Result<Url, Error> {
        self.endpoint(&format!("documents/{path}"))
    }

    pub(crate) fn listen_endpoint(&self, query: &Query) -> Result<Url, Error> {
        let base = self.listen_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/v1/listen/{}", query.collection))?;
        if let Some(ref order) = query.order_by {
            url.query_pairs_mut()
                .append_pair("orderBy", &order.field)
                .append_pair("direction", order.direction.as_str());
        }
        Ok(url)
    }

    // ── Session helpers ──────────────────────────────────────────────

    fn bearer(&self) -> Option<String> {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map(|s| s.token.expose_secret().to_owned())
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.bearer() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn set_session(&self, session: Option<AuthSession>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    // ── Response handling ────────────────────────────────────────────

    /// Map non-success statuses into [`Error`] variants.
    async fn check(resp: reqwest::Response, path: &str) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| body.chars().take(ERROR_PREVIEW_LEN).collect());

        Err(match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Error::Authentication { message }
            }
            reqwest::StatusCode::NOT_FOUND => Error::NotFound { path: path.into() },
            _ => Error::Remote {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(ERROR_PREVIEW_LEN).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }
}

// ── RemoteStore ──────────────────────────────────────────────────────

#[async_trait]
impl RemoteStore for HttpClient {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, Error> {
        let url = self.document_url(path.as_str())?;
        debug!("GET {}", url);

        let resp = self.authorize(self.http.get(url)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check(resp, path.as_str()).await?;
        Self::decode(resp).await.map(Some)
    }

    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), Error> {
        let url = self.document_url(path.as_str())?;
        debug!("PUT {}", url);

        let builder = self.http.put(url).json(&FieldsBody { fields: &fields });
        let resp = self.authorize(builder).send().await?;
        Self::check(resp, path.as_str()).await?;
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, patch: Fields) -> Result<(), Error> {
        let url = self.document_url(path.as_str())?;
        debug!("PATCH {}", url);

        let builder = self.http.patch(url).json(&FieldsBody { fields: &patch });
        let resp = self.authorize(builder).send().await?;
        Self::check(resp, path.as_str()).await?;
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String, Error> {
        let url = self.document_url(collection.as_str())?;
        debug!("POST {}", url);

        let builder = self.http.post(url).json(&FieldsBody { fields: &fields });
        let resp = self.authorize(builder).send().await?;
        let resp = Self::check(resp, collection.as_str()).await?;
        let added: AddResponse = Self::decode(resp).await?;
        Ok(added.id)
    }

    async fn subscribe(&self, query: Query) -> Result<SnapshotStream, Error> {
        let url = self.listen_endpoint(&query)?;
        let cancel = CancellationToken::new();
        let (tx, stream) = SnapshotStream::channel(query.collection.clone(), cancel.clone());

        let bearer = self.bearer();
        let reconnect = self.reconnect.clone();
        tokio::spawn(async move {
            listener::run(url, bearer, reconnect, tx, cancel).await;
        });

        debug!(collection = %query.collection, "listener spawned");
        Ok(stream)
    }
}

// ── RemoteAuth ───────────────────────────────────────────────────────

#[async_trait]
impl RemoteAuth for HttpClient {
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Identity, Error> {
        let url = self.endpoint("auth/sign-in")?;
        debug!("POST {}", url);

        let body = SignInRequest {
            email,
            password: password.expose_secret(),
        };
        let resp = self.http.post(url).json(&body).send().await?;
        let resp = Self::check(resp, "auth/sign-in").await?;
        let signed: SignInResponse = Self::decode(resp).await?;

        let identity = Identity {
            uid: signed.uid,
            email: signed.email,
        };
        self.set_session(Some(AuthSession {
            identity: identity.clone(),
            token: SecretString::from(signed.token),
        }));
        info!(uid = %identity.uid, "signed in");
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        if self.bearer().is_none() {
            return Ok(());
        }
        let url = self.endpoint("auth/sign-out")?;
        debug!("POST {}", url);

        let result = match self.authorize(self.http.post(url)).send().await {
            Ok(resp) => Self::check(resp, "auth/sign-out").await.map(|_| ()),
            Err(e) => Err(Error::Transport(e)),
        };
        // The local session is gone regardless of what the server said.
        self.set_session(None);
        result
    }

    fn current_identity(&self) -> Option<Identity> {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|s| s.identity.clone())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Switch `http`→`ws` / `https`→`wss`, keeping host, port, and path.
fn derive_listen_url(base: &Url) -> Result<Url, Error> {
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => other,
    };
    let rest = base
        .as_str()
        .split_once("://")
        .map_or(base.as_str(), |(_, rest)| rest);
    Ok(Url::parse(&format!("{scheme}://{rest}"))?)
}

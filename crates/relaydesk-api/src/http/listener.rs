//! WebSocket snapshot listener with auto-reconnect.
//!
//! Each text frame from the store carries a full snapshot of the watched
//! collection. Frames are parsed and pushed, in order, into the
//! [`SnapshotStream`](crate::store::SnapshotStream) channel. Reconnection
//! uses exponential backoff + jitter; because every frame is a full
//! snapshot, a reconnect needs no replay logic.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::document::{Document, Snapshot};
use crate::error::Error;

type SnapshotSender = mpsc::Sender<Result<Snapshot, Error>>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for listener reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────

/// Raw frame the store sends over the listener socket.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Frame {
    Snapshot {
        documents: Vec<Document>,
    },
    Error {
        error: String,
        #[serde(default)]
        code: Option<u16>,
    },
}

/// Tracks the per-listener delivery version across reconnects, so the
/// consumer sees a monotonic sequence even when the server restarts its own.
#[derive(Debug, Default)]
struct Delivery {
    version: u64,
}

impl Delivery {
    fn parse(&mut self, text: &str) -> Result<Snapshot, Error> {
        match serde_json::from_str::<Frame>(text) {
            Ok(Frame::Snapshot { documents }) => {
                self.version += 1;
                Ok(Snapshot {
                    version: self.version,
                    documents,
                })
            }
            Ok(Frame::Error { error, code }) => Err(Error::Remote {
                status: code.unwrap_or(500),
                message: error,
            }),
            Err(e) => Err(Error::Deserialization {
                message: e.to_string(),
                body: text.to_owned(),
            }),
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
///
/// Exits when `cancel` fires, when the consumer drops its stream, or when
/// the retry budget is exhausted (after reporting
/// [`Error::ListenerTerminated`]).
pub(crate) async fn run(
    url: Url,
    bearer: Option<String>,
    reconnect: ReconnectConfig,
    tx: SnapshotSender,
    cancel: CancellationToken,
) {
    let collection = url.path().trim_start_matches("/v1/listen/").to_owned();
    let mut delivery = Delivery::default();
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&url, bearer.as_deref(), &tx, &cancel, &mut delivery) => {
                match result {
                    Ok(ReadOutcome::Cancelled | ReadOutcome::ConsumerGone) => break,
                    // Server closed cleanly. Reset attempts and reconnect immediately.
                    Ok(ReadOutcome::Closed) => {
                        tracing::info!(%collection, "listener disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, %collection, "listener error");
                        if tx.send(Err(e)).await.is_err() {
                            break;
                        }

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    %collection,
                                    "listener reconnection limit reached, giving up"
                                );
                                let _ = tx
                                    .send(Err(Error::ListenerTerminated { collection: collection.clone() }))
                                    .await;
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::debug!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    tracing::debug!(%collection, "listener loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

enum ReadOutcome {
    Cancelled,
    ConsumerGone,
    Closed,
}

/// Establish a single listener connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    bearer: Option<&str>,
    tx: &SnapshotSender,
    cancel: &CancellationToken,
    delivery: &mut Delivery,
) -> Result<ReadOutcome, Error> {
    tracing::debug!(url = %url, "connecting listener");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::ListenerConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(token) = bearer {
        request = request.with_header("Authorization", format!("Bearer {token}"));
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::ListenerConnect(e.to_string()))?;

    tracing::debug!("listener connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(ReadOutcome::Cancelled),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        // A malformed frame is reported but does not end the listener.
                        if tx.send(delivery.parse(&text)).await.is_err() {
                            return Ok(ReadOutcome::ConsumerGone);
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            let code = u16::from(cf.code);
                            // 1000 = normal closure; anything else is worth reporting.
                            if code != 1000 {
                                return Err(Error::ListenerClosed {
                                    code,
                                    reason: cf.reason.to_string(),
                                });
                            }
                        }
                        return Ok(ReadOutcome::Closed);
                    }
                    Some(Err(e)) => {
                        return Err(Error::ListenerConnect(e.to_string()));
                    }
                    None => return Ok(ReadOutcome::Closed),
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary: tungstenite answers pings itself.
                        tracing::trace!("listener control frame");
                    }
                }
            }
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`, jitter within ±25%.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_grows_then_caps() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d0 = calculate_backoff(0, &config);
        let d2 = calculate_backoff(2, &config);
        assert!(d2 > d0, "d2 ({d2:?}) should exceed d0 ({d0:?})");

        let d10 = calculate_backoff(10, &config);
        assert!(d10 <= Duration::from_millis(12_500), "capped near max: {d10:?}");
    }

    #[test]
    fn snapshot_frames_get_monotonic_versions() {
        let mut delivery = Delivery::default();
        let frame = r#"{"version": 7, "documents": [{"id": "a", "fields": {"name": "Ana"}}]}"#;

        let first = delivery.parse(frame).unwrap();
        let second = delivery.parse(frame).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(first.documents[0].id, "a");
    }

    #[test]
    fn error_frames_become_remote_errors() {
        let mut delivery = Delivery::default();
        let err = delivery
            .parse(r#"{"error": "listener quota exceeded", "code": 429}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Remote { status: 429, .. }));
    }

    #[test]
    fn malformed_frames_are_reported() {
        let mut delivery = Delivery::default();
        let err = delivery.parse("not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
        assert_eq!(delivery.version, 0);
    }
}

//! HTTP client that asks the labeling service to re-scan its storage.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Url, header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::SyncConfig;

const COMPLETED_STATUS: &str = "completed";

/// Result of a single sync trigger invocation.
///
/// Every variant other than `Completed` is a non-success, but none of them is
/// escalated past the batch that requested the sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    NotCompleted {
        http_status: u16,
        status: Option<String>,
    },
    Failed {
        error: String,
    },
    Skipped,
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid sync endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("failed to build sync HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),
    #[error("sync request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("failed to read sync response body: {0}")]
    Body(#[source] reqwest::Error),
}

impl SyncError {
    fn is_transport(&self) -> bool {
        matches!(self, SyncError::Request(_))
    }
}

/// Collaborator invoked once after every batch.
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    async fn trigger(&self) -> SyncOutcome;
}

/// Used when no sync endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSyncTrigger;

#[async_trait]
impl SyncTrigger for DisabledSyncTrigger {
    async fn trigger(&self) -> SyncOutcome {
        debug!("sync endpoint not configured; skipping sync");
        SyncOutcome::Skipped
    }
}

#[derive(Debug, Deserialize)]
struct SyncStatusBody {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug)]
struct SyncReply {
    http_status: u16,
    status: Option<String>,
}

/// `POST`s to the configured endpoint with the configured authorization
/// header and inspects the JSON `status` field of the reply.
#[derive(Debug, Clone)]
pub struct HttpSyncTrigger {
    http: Client,
    endpoint: Url,
    authorization: Option<String>,
    backoff: ExponentialBuilder,
}

impl HttpSyncTrigger {
    /// Builds a trigger from config, or `Ok(None)` when sync is disabled.
    pub fn from_config(cfg: &SyncConfig) -> Result<Option<Self>, SyncError> {
        let Some(endpoint) = cfg.enabled_endpoint() else {
            return Ok(None);
        };

        let endpoint = Url::parse(endpoint).map_err(|err| SyncError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.get()))
            .user_agent(concat!("pagefeed-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SyncError::BuildClient)?;

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(cfg.max_retries)
            .with_jitter();

        Ok(Some(Self {
            http,
            endpoint,
            authorization: cfg.authorization(),
            backoff,
        }))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post_once(&self) -> Result<SyncReply, SyncError> {
        let mut request = self.http.post(self.endpoint.clone());
        if let Some(authorization) = &self.authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(SyncError::Request)?;
        let http_status = response.status().as_u16();
        let body = response.bytes().await.map_err(SyncError::Body)?;

        // A non-JSON reply is not an error here; it simply carries no status.
        let status = serde_json::from_slice::<SyncStatusBody>(&body)
            .ok()
            .and_then(|parsed| parsed.status);

        Ok(SyncReply {
            http_status,
            status,
        })
    }
}

#[async_trait]
impl SyncTrigger for HttpSyncTrigger {
    async fn trigger(&self) -> SyncOutcome {
        let endpoint = self.endpoint.as_str();
        let reply = (|| self.post_once())
            .retry(self.backoff.clone())
            .sleep(sleep)
            .when(SyncError::is_transport)
            .notify(|err: &SyncError, delay: Duration| {
                warn!(
                    endpoint,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "retrying sync request"
                );
            })
            .await;

        match reply {
            Ok(reply) if reply.status.as_deref() == Some(COMPLETED_STATUS) => {
                debug!(endpoint, http_status = reply.http_status, "sync completed");
                SyncOutcome::Completed
            }
            Ok(reply) => {
                warn!(
                    endpoint,
                    http_status = reply.http_status,
                    status = reply.status.as_deref().unwrap_or("<missing>"),
                    "sync did not complete"
                );
                SyncOutcome::NotCompleted {
                    http_status: reply.http_status,
                    status: reply.status,
                }
            }
            Err(err) => {
                warn!(endpoint, error = %err, "sync request failed");
                SyncOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
    use serde_json::{Value, json};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    type SeenAuth = Arc<Mutex<Vec<Option<String>>>>;

    async fn spawn_endpoint(reply: Value) -> (String, SeenAuth) {
        let seen: SeenAuth = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/sync",
                post(
                    |State((seen, reply)): State<(SeenAuth, Value)>, headers: HeaderMap| async move {
                        let auth = headers
                            .get(header::AUTHORIZATION)
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_string);
                        seen.lock().expect("seen lock").push(auth);
                        Json(reply)
                    },
                ),
            )
            .with_state((Arc::clone(&seen), reply));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        (format!("http://{addr}/sync"), seen)
    }

    /// Accepts connections, reads the request, and hangs up without replying.
    async fn spawn_silent_endpoint() -> (String, Arc<AtomicUsize>) {
        let accepted = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                drop(socket);
            }
        });

        (format!("http://{addr}/sync"), accepted)
    }

    fn config_for(endpoint: String) -> SyncConfig {
        SyncConfig {
            endpoint: Some(endpoint),
            token: Some("secret".to_string()),
            max_retries: 0,
            ..SyncConfig::default()
        }
    }

    #[test]
    fn missing_endpoint_disables_trigger() {
        let trigger = HttpSyncTrigger::from_config(&SyncConfig::default()).expect("config ok");
        assert!(trigger.is_none());
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        let cfg = config_for("not a url".to_string());
        assert!(matches!(
            HttpSyncTrigger::from_config(&cfg),
            Err(SyncError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn disabled_trigger_reports_skipped() {
        assert_eq!(DisabledSyncTrigger.trigger().await, SyncOutcome::Skipped);
    }

    #[tokio::test]
    async fn completed_status_is_success_and_sends_auth() {
        let (endpoint, seen) = spawn_endpoint(json!({ "status": "completed" })).await;
        let trigger = HttpSyncTrigger::from_config(&config_for(endpoint))
            .expect("config ok")
            .expect("enabled");

        let outcome = trigger.trigger().await;

        assert!(outcome.is_completed());
        let seen = seen.lock().expect("seen lock");
        assert_eq!(seen.as_slice(), &[Some("Bearer secret".to_string())]);
    }

    #[tokio::test]
    async fn other_status_is_captured_as_not_completed() {
        let (endpoint, _) = spawn_endpoint(json!({ "status": "queued" })).await;
        let trigger = HttpSyncTrigger::from_config(&config_for(endpoint))
            .expect("config ok")
            .expect("enabled");

        let outcome = trigger.trigger().await;

        assert_eq!(
            outcome,
            SyncOutcome::NotCompleted {
                http_status: 200,
                status: Some("queued".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn transport_error_is_captured_as_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let trigger = HttpSyncTrigger::from_config(&config_for(format!("http://{addr}/sync")))
            .expect("config ok")
            .expect("enabled");

        let outcome = trigger.trigger().await;

        assert!(matches!(outcome, SyncOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn default_config_posts_once_per_trigger() {
        let (endpoint, accepted) = spawn_silent_endpoint().await;
        let cfg = SyncConfig {
            endpoint: Some(endpoint),
            ..SyncConfig::default()
        };
        let trigger = HttpSyncTrigger::from_config(&cfg)
            .expect("config ok")
            .expect("enabled");

        let outcome = trigger.trigger().await;

        assert!(matches!(outcome, SyncOutcome::Failed { .. }));
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn configured_retries_repeat_after_transport_error() {
        let (endpoint, accepted) = spawn_silent_endpoint().await;
        let cfg = SyncConfig {
            max_retries: 2,
            ..config_for(endpoint)
        };
        let trigger = HttpSyncTrigger::from_config(&cfg)
            .expect("config ok")
            .expect("enabled");

        let outcome = trigger.trigger().await;

        assert!(matches!(outcome, SyncOutcome::Failed { .. }));
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let value = serde_json::to_value(SyncOutcome::NotCompleted {
            http_status: 502,
            status: None,
        })
        .expect("serialize");
        assert_eq!(
            value,
            json!({ "outcome": "not_completed", "http_status": 502, "status": null })
        );
        assert_eq!(
            serde_json::to_value(SyncOutcome::Completed).expect("serialize"),
            json!({ "outcome": "completed" })
        );
    }
}

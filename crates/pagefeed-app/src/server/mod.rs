//! HTTP intake: health check plus a batch endpoint accepting queue events.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::{Mutex, watch},
    task::JoinError,
};

use crate::config::AppConfig;
use crate::pipeline::{QueueEvent, QueueRecord};
use crate::services::{BatchCoordinator, BatchResult};

const HEALTHZ_PATH: &str = "/v1/healthz";
const EVENTS_PATH: &str = "/v1/events";
const HEALTHZ_STATUS: &str = "ok";
/// Grace period for open connections after a shutdown signal. Batches already
/// started keep running past it; `serve` waits for them before returning.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
struct HealthzResponse {
    status: &'static str,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    ListenerFailed,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

/// Shared handler state.
///
/// Batches are run one at a time: sequence allocation scans then writes, so
/// two overlapping batches in one process could hand out the same number.
/// A started batch runs on its own task holding the gate, so a dropped
/// request cannot cut it off between an upload and its work item.
#[derive(Clone)]
pub struct AppState {
    coordinator: BatchCoordinator,
    gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(coordinator: BatchCoordinator) -> Self {
        Self {
            coordinator,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one batch to completion, even if the caller stops waiting.
    pub async fn run_batch(&self, records: Vec<QueueRecord>) -> Result<BatchResult, JoinError> {
        let serialized = Arc::clone(&self.gate).lock_owned().await;
        let coordinator = self.coordinator.clone();
        let handle = tokio::spawn(async move {
            let _serialized = serialized;
            coordinator.run(&records).await
        });
        handle.await
    }

    /// Resolves once no batch is running.
    pub async fn wait_idle(&self) {
        let _idle = self.gate.lock().await;
    }
}

pub fn build_api_router(state: AppState) -> Router {
    debug_assert!(HEALTHZ_PATH.starts_with("/v1/"));
    debug_assert!(EVENTS_PATH.starts_with("/v1/"));

    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(EVENTS_PATH, post(events))
        .with_state(state)
}

pub async fn serve(config: AppConfig, state: AppState) -> Result<(), ServerError> {
    let listen_addr = parse_listen_addr(&config.server.listen_addr)?;

    let listener = bind_listener(listen_addr).await?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "pagefeed server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownEvent::Pending);

    let shutdown_future = broadcast_shutdown(shutdown_tx);

    let app = build_api_router(state.clone());

    let mut server_future = Box::pin(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_future)
            .await
    });

    let drain_rx = shutdown_rx.clone();
    let mut drain_timeout = Box::pin(drain_timeout_future(drain_rx));

    tokio::select! {
        result = server_future.as_mut() => {
            if let Err(source) = result {
                return Err(ServerError::Serve { source });
            }
        }
        _ = drain_timeout.as_mut() => {
            // Timeout elapsed; open connections are dropped, started batches are not.
        }
    }

    tracing::info!("waiting for in-flight batches");
    state.wait_idle().await;

    let final_event = *shutdown_rx.borrow();
    if final_event == ShutdownEvent::Pending {
        tracing::info!("server stopped without external shutdown signal");
    } else {
        tracing::info!(?final_event, "server shutdown complete");
    }

    Ok(())
}

async fn healthz() -> impl IntoResponse {
    debug_assert_eq!(HEALTHZ_STATUS, "ok");

    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
    })
}

async fn events(State(state): State<AppState>, Json(event): Json<QueueEvent>) -> Response {
    tracing::info!(records = event.records.len(), "received batch");
    match state.run_batch(event.records).await {
        Ok(result) => Json(result).into_response(),
        Err(error) => {
            tracing::error!(%error, "batch task aborted");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn wait_for_shutdown() -> ShutdownEvent {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }

    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })
}

fn broadcast_shutdown(
    sender: watch::Sender<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    debug_assert!(!sender.is_closed());
    async move {
        let event = wait_for_shutdown().await;
        debug_assert!(event != ShutdownEvent::Pending);
        if let Err(error) = sender.send(event) {
            tracing::warn!(?event, %error, "failed to broadcast shutdown event");
        }
    }
}

fn drain_timeout_future(
    mut receiver: watch::Receiver<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        if receiver.changed().await.is_ok() {
            let event = *receiver.borrow_and_update();
            debug_assert!(event != ShutdownEvent::Pending);
            tracing::info!(?event, "shutdown signal received; draining connections");
            tokio::time::sleep(DRAIN_TIMEOUT).await;
            tracing::warn!(
                ?event,
                seconds = DRAIN_TIMEOUT.as_secs(),
                "graceful shutdown timed out; continuing shutdown"
            );
        }
    }
}

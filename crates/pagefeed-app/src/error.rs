//! Application-level error type for the binary and its subcommands.

use std::path::PathBuf;

use pagefeed_sync::SyncError;
use thiserror::Error;

use crate::config;
use crate::paths::PathError;
use crate::server;
use crate::services::{ContextError, StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Server(#[from] server::ServerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read event from stdin: {0}")]
    Stdin(#[source] std::io::Error),
}

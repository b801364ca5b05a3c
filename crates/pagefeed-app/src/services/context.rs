use std::path::PathBuf;
use std::sync::Arc;

use bon::Builder;
use thiserror::Error;

use crate::config::{AppConfig, StorageBackend};
use crate::paths::{AppPaths, PathError};
use crate::pipeline::{DecodeError, IngestPolicy, KeyError, PolicyError};
use crate::raster::{PdfiumRasterizer, RasterError, Rasterizer};
use crate::services::object_store::{DurableWrite, FsObjectStore, ObjectStore, StoreError};

/// Failure of one record. Contained at the batch boundary; never fatal to
/// the process.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("document `{key}` has no pages")]
    NoPages { key: String },
    #[error("failed to stage {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rasterizer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("failed to serialize work item: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Explicit collaborators shared by every component of the pipeline.
///
/// Constructed once at process start and handed to the dispatcher; nothing
/// in the pipeline reaches for ambient clients.
#[derive(Clone, Builder)]
pub struct IngestContext {
    pub store: Arc<dyn ObjectStore>,
    pub rasterizer: Arc<dyn Rasterizer>,
    #[builder(default)]
    pub policy: IngestPolicy,
    #[builder(into, default = crate::constants::DEFAULT_URI_SCHEME.to_string())]
    pub uri_scheme: String,
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Wires store, rasterizer, and policy from configuration.
pub async fn build_ingest_context(config: &AppConfig) -> Result<IngestContext, ContextError> {
    let policy = config.ingest.policy()?;
    if config.raster.dpi == 0 {
        return Err(ContextError::Config(
            "raster.dpi must be greater than zero".to_string(),
        ));
    }
    let store = build_object_store(config).await?;
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::new(config.raster.dpi));

    let scheme = config.storage.scheme.trim();
    if scheme.is_empty() {
        return Err(ContextError::Config(
            "storage.scheme may not be empty".to_string(),
        ));
    }

    tracing::debug!(
        extensions = ?policy.extensions().collect::<Vec<_>>(),
        dpi = config.raster.dpi,
        scheme,
        "ingest context ready"
    );

    Ok(IngestContext::builder()
        .store(store)
        .rasterizer(rasterizer)
        .policy(policy)
        .uri_scheme(scheme)
        .build())
}

async fn build_object_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>, ContextError> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Fs => {
            let paths = AppPaths::new(&storage.path)?;
            let store: Arc<dyn ObjectStore> = Arc::new(
                FsObjectStore::builder()
                    .paths(paths)
                    .durability(DurableWrite::FileOnly)
                    .build(),
            );
            tracing::debug!(path = ?storage.path, "initialized FsObjectStore");
            Ok(store)
        }
        StorageBackend::S3 => {
            #[cfg(not(feature = "s3"))]
            {
                Err(ContextError::Config(
                    "S3 backend requested but s3 feature not enabled".to_string(),
                ))
            }
            #[cfg(feature = "s3")]
            {
                use crate::services::s3_store::S3ObjectStore;

                let s3 = storage.s3.clone().unwrap_or_default();
                let store = S3ObjectStore::from_config(
                    s3.region,
                    s3.endpoint_url,
                    s3.force_path_style,
                )
                .await;
                tracing::debug!("initialized S3ObjectStore");
                Ok(Arc::new(store))
            }
        }
    }
}

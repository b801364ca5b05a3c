//! Turns one fetched source into raster artifacts and their work items.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::constants::TASK_PREFIX;
use crate::pipeline::{
    Materialization, SourceKind, object_uri, page_artifact_key, single_artifact_key,
};
use crate::raster::{RasterImage, Rasterizer};
use crate::services::context::{IngestContext, IngestError, IngestResult};
use crate::services::object_store::ObjectStore;
use crate::services::sequence::SequenceAllocator;
use crate::services::tasks::TaskEmitter;

/// Fetched payload of one notification, staged into a private temp dir.
///
/// The directory is removed when the document is dropped, on success and on
/// every failure path alike.
#[derive(Debug)]
pub struct SourceDocument {
    pub object_key: String,
    pub base_name: String,
    pub extension: String,
    pub kind: SourceKind,
    pub bytes: Bytes,
    local_path: PathBuf,
    workdir: TempDir,
}

impl SourceDocument {
    pub async fn stage(
        object_key: impl Into<String>,
        base_name: impl Into<String>,
        extension: impl Into<String>,
        kind: SourceKind,
        bytes: Bytes,
    ) -> IngestResult<Self> {
        let workdir = tempfile::Builder::new()
            .prefix("pagefeed-")
            .tempdir()
            .map_err(|source| IngestError::Io {
                path: std::env::temp_dir(),
                source,
            })?;

        let extension = extension.into();
        let local_path = workdir.path().join(format!("input{extension}"));
        write_local(&local_path, &bytes).await?;

        Ok(Self {
            object_key: object_key.into(),
            base_name: base_name.into(),
            extension,
            kind,
            bytes,
            local_path,
            workdir,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }
}

/// A rendered page waiting for upload. Dropping `stored` unanswered stops
/// rendering.
struct RenderedPage {
    page_number: usize,
    raster: RasterImage,
    stored: oneshot::Sender<()>,
}

/// One normalized raster, written locally and to the durable namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterArtifact {
    /// 1-based; `None` for single-raster sources.
    pub page_number: Option<usize>,
    pub local_path: PathBuf,
    pub remote_key: String,
}

#[derive(Clone)]
pub struct PageMaterializer {
    store: Arc<dyn ObjectStore>,
    rasterizer: Arc<dyn Rasterizer>,
    allocator: SequenceAllocator,
    emitter: TaskEmitter,
    uri_scheme: String,
}

impl PageMaterializer {
    pub fn new(ctx: &IngestContext) -> Self {
        Self {
            store: ctx.store.clone(),
            rasterizer: ctx.rasterizer.clone(),
            allocator: SequenceAllocator::new(ctx.store.clone()),
            emitter: TaskEmitter::new(ctx.store.clone()),
            uri_scheme: ctx.uri_scheme.clone(),
        }
    }

    /// Returns the durable keys of every artifact produced, in page order.
    ///
    /// Pages are handled one at a time: render, upload, allocate, emit. A
    /// failure on page `k` keeps pages `1..k` and stops before `k + 1`.
    pub async fn materialize(
        &self,
        doc: &SourceDocument,
        bucket: &str,
    ) -> IngestResult<Vec<String>> {
        match doc.kind.materialization {
            Materialization::Paged => self.materialize_pages(doc, bucket).await,
            Materialization::Single => self.materialize_single(doc, bucket).await,
        }
    }

    async fn materialize_pages(
        &self,
        doc: &SourceDocument,
        bucket: &str,
    ) -> IngestResult<Vec<String>> {
        let (page_tx, mut page_rx) = mpsc::channel::<RenderedPage>(1);
        let render = {
            let rasterizer = self.rasterizer.clone();
            let pdf = doc.bytes.clone();
            tokio::task::spawn_blocking(move || {
                rasterizer.render_pages(&pdf, &mut |page_number, raster| {
                    let (stored_tx, stored_rx) = oneshot::channel();
                    let page = RenderedPage {
                        page_number,
                        raster,
                        stored: stored_tx,
                    };
                    if page_tx.blocking_send(page).is_err() {
                        return ControlFlow::Break(());
                    }
                    // Hold the next page until this one has its work item.
                    match stored_rx.blocking_recv() {
                        Ok(()) => ControlFlow::Continue(()),
                        Err(_) => ControlFlow::Break(()),
                    }
                })
            })
        };

        let mut keys = Vec::new();
        while let Some(page) = page_rx.recv().await {
            let remote_key = page_artifact_key(&doc.base_name, page.page_number);
            let artifact = self
                .store_artifact(doc, bucket, Some(page.page_number), remote_key, page.raster)
                .await?;
            self.emit_for(bucket, &artifact).await?;
            keys.push(artifact.remote_key);
            let _ = page.stored.send(());
        }

        let page_count = render.await??;
        if page_count == 0 {
            return Err(IngestError::NoPages {
                key: doc.object_key.clone(),
            });
        }
        debug!(key = %doc.object_key, page_count, "rendered pages");

        debug_assert_eq!(keys.len(), page_count);
        Ok(keys)
    }

    async fn materialize_single(
        &self,
        doc: &SourceDocument,
        bucket: &str,
    ) -> IngestResult<Vec<String>> {
        let raster = {
            let rasterizer = self.rasterizer.clone();
            let bytes = doc.bytes.clone();
            tokio::task::spawn_blocking(move || rasterizer.normalize_image(&bytes)).await??
        };

        let remote_key = single_artifact_key(&doc.base_name);
        let artifact = self
            .store_artifact(doc, bucket, None, remote_key, raster)
            .await?;
        self.emit_for(bucket, &artifact).await?;
        Ok(vec![artifact.remote_key])
    }

    async fn store_artifact(
        &self,
        doc: &SourceDocument,
        bucket: &str,
        page_number: Option<usize>,
        remote_key: String,
        raster: RasterImage,
    ) -> IngestResult<RasterArtifact> {
        let file_name = remote_key.rsplit('/').next().unwrap_or(&remote_key);
        let local_path = doc.workdir().join(file_name);
        let png = Bytes::from(raster.png_data);

        write_local(&local_path, &png).await?;
        self.store.put(bucket, &remote_key, png).await?;
        info!(
            bucket,
            key = %remote_key,
            page = ?page_number,
            width = raster.width,
            height = raster.height,
            "stored raster artifact"
        );

        Ok(RasterArtifact {
            page_number,
            local_path,
            remote_key,
        })
    }

    async fn emit_for(&self, bucket: &str, artifact: &RasterArtifact) -> IngestResult<String> {
        let sequence = self.allocator.next_sequence(bucket, TASK_PREFIX).await?;
        let image = object_uri(&self.uri_scheme, bucket, &artifact.remote_key);
        self.emitter.emit(bucket, &image, sequence).await
    }
}

async fn write_local(path: &Path, bytes: &[u8]) -> IngestResult<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })
}

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::pipeline::{Relocation, raw_original_key};
use crate::services::context::{IngestError, IngestResult};
use crate::services::materializer::SourceDocument;
use crate::services::object_store::ObjectStore;

/// Moves originals out of the staging namespace when their kind asks for it.
#[derive(Clone)]
pub struct RelocationPolicy {
    store: Arc<dyn ObjectStore>,
}

impl RelocationPolicy {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Returns the new key when the original was moved, `None` when it stays
    /// at its staging key.
    pub async fn apply(&self, doc: &SourceDocument, bucket: &str) -> IngestResult<Option<String>> {
        match doc.kind.relocation {
            Relocation::LeaveInPlace => {
                debug!(bucket, key = %doc.object_key, "original left in place");
                Ok(None)
            }
            Relocation::MoveOnIngest => self
                .relocate(
                    doc.local_path(),
                    bucket,
                    &doc.object_key,
                    &doc.base_name,
                    &doc.extension,
                )
                .await
                .map(Some),
        }
    }

    /// Uploads the local copy to `raw/<base><ext>`, then deletes `original_key`.
    pub async fn relocate(
        &self,
        local_path: &Path,
        bucket: &str,
        original_key: &str,
        base_name: &str,
        extension: &str,
    ) -> IngestResult<String> {
        let raw_key = raw_original_key(base_name, extension);
        debug_assert_ne!(raw_key, original_key);

        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| IngestError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;
        self.store.put(bucket, &raw_key, Bytes::from(bytes)).await?;
        self.store.delete(bucket, original_key).await?;

        info!(bucket, key = original_key, raw_key = %raw_key, "relocated original");
        Ok(raw_key)
    }
}

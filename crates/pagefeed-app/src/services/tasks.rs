use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use crate::pipeline::{WorkItem, task_key};
use crate::services::context::IngestResult;
use crate::services::object_store::ObjectStore;

/// Persists one work item per raster artifact.
#[derive(Clone)]
pub struct TaskEmitter {
    store: Arc<dyn ObjectStore>,
}

impl TaskEmitter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Writes `ingest/TASK_<sequence>.json` referencing `image_reference` and
    /// returns its key. A single write, never retried.
    pub async fn emit(
        &self,
        bucket: &str,
        image_reference: &str,
        sequence: u64,
    ) -> IngestResult<String> {
        let key = task_key(sequence);
        let document = WorkItem::for_image(image_reference).to_document()?;
        self.store.put(bucket, &key, Bytes::from(document)).await?;
        info!(bucket, task_key = %key, sequence, image = image_reference, "emitted work item");
        Ok(key)
    }
}

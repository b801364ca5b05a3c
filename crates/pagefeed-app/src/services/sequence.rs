use std::sync::Arc;

use tracing::debug;

use crate::pipeline::next_sequence;
use crate::services::object_store::{ObjectStore, StoreError};

/// Allocates work-item sequence numbers by scanning the task namespace.
///
/// There is no persisted counter: every call lists the whole prefix. Two
/// allocators racing on the same bucket can hand out the same number, so
/// callers that need strict uniqueness serialize invocations.
#[derive(Clone)]
pub struct SequenceAllocator {
    store: Arc<dyn ObjectStore>,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn next_sequence(&self, bucket: &str, prefix: &str) -> Result<u64, StoreError> {
        let keys = self.store.list(bucket, prefix).await?;
        let next = next_sequence(&keys);
        debug!(bucket, prefix, listed = keys.len(), next, "allocated sequence");
        Ok(next)
    }
}

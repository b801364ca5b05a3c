//! Per-notification state machine.
//!
//! `Received -> Validated -> Fetched -> Relocated -> Materialized -> Done`,
//! with any step able to end the record in failure. Skips are outcomes, not
//! errors.

use std::sync::Arc;

use tracing::{debug, info};

use crate::pipeline::{IngestPolicy, QueueRecord, is_staged, split_file_name, unescape_key};
use crate::services::context::{IngestContext, IngestResult};
use crate::services::materializer::{PageMaterializer, SourceDocument};
use crate::services::object_store::ObjectStore;
use crate::services::relocation::RelocationPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    OutsideStaging,
    UnsupportedExtension { extension: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Skipped {
        bucket: String,
        key: String,
        reason: SkipReason,
    },
    Done {
        bucket: String,
        key: String,
        relocated_to: Option<String>,
        artifacts: Vec<String>,
    },
}

#[derive(Clone)]
pub struct RecordDispatcher {
    store: Arc<dyn ObjectStore>,
    policy: IngestPolicy,
    relocation: RelocationPolicy,
    materializer: PageMaterializer,
}

impl RecordDispatcher {
    pub fn new(ctx: &IngestContext) -> Self {
        Self {
            store: ctx.store.clone(),
            policy: ctx.policy.clone(),
            relocation: RelocationPolicy::new(ctx.store.clone()),
            materializer: PageMaterializer::new(ctx),
        }
    }

    pub async fn dispatch(&self, record: &QueueRecord) -> IngestResult<RecordOutcome> {
        let notification = record.decode()?;
        let bucket = notification.bucket;
        let key = unescape_key(&notification.key)?;

        if !is_staged(&key) {
            info!(bucket = %bucket, key = %key, "skipping object outside staging prefix");
            return Ok(RecordOutcome::Skipped {
                bucket,
                key,
                reason: SkipReason::OutsideStaging,
            });
        }

        let (base_name, extension) = split_file_name(&key);
        let Some(kind) = self.policy.lookup(&extension) else {
            info!(bucket = %bucket, key = %key, extension = %extension, "skipping unsupported file type");
            return Ok(RecordOutcome::Skipped {
                bucket,
                key,
                reason: SkipReason::UnsupportedExtension { extension },
            });
        };
        debug!(
            bucket = %bucket,
            key = %key,
            materialization = kind.materialization.as_ref(),
            relocation = kind.relocation.as_ref(),
            "validated record"
        );

        let bytes = self.store.get(&bucket, &key).await?;
        let doc = SourceDocument::stage(key.as_str(), base_name, extension, kind, bytes).await?;
        debug!(bucket = %bucket, key = %key, local = ?doc.local_path(), "fetched source");

        let relocated_to = self.relocation.apply(&doc, &bucket).await?;
        let artifacts = self.materializer.materialize(&doc, &bucket).await?;
        info!(
            bucket = %bucket,
            key = %key,
            artifacts = artifacts.len(),
            relocated = relocated_to.is_some(),
            "record done"
        );

        Ok(RecordOutcome::Done {
            bucket,
            key,
            relocated_to,
            artifacts,
        })
    }
}

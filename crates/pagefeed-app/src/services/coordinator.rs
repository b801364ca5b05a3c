use std::sync::Arc;

use pagefeed_sync::{SyncOutcome, SyncTrigger};
use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};

use crate::pipeline::QueueRecord;
use crate::services::dispatcher::{RecordDispatcher, RecordOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Always `success`; only `sync` and the counters reflect what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub sync: SyncOutcome,
    pub summary: BatchSummary,
}

#[derive(Clone)]
pub struct BatchCoordinator {
    dispatcher: RecordDispatcher,
    sync: Arc<dyn SyncTrigger>,
}

impl BatchCoordinator {
    pub fn new(dispatcher: RecordDispatcher, sync: Arc<dyn SyncTrigger>) -> Self {
        Self { dispatcher, sync }
    }

    /// Attempts every record in delivery order, then triggers sync once.
    pub async fn run(&self, records: &[QueueRecord]) -> BatchResult {
        let mut summary = BatchSummary::default();

        for (index, record) in records.iter().enumerate() {
            let span = info_span!("record", index, message_id = record.message_id.as_deref());
            match self.dispatcher.dispatch(record).instrument(span).await {
                Ok(RecordOutcome::Done { .. }) => summary.processed += 1,
                Ok(RecordOutcome::Skipped { .. }) => summary.skipped += 1,
                Err(err) => {
                    summary.failed += 1;
                    error!(
                        index,
                        message_id = record.message_id.as_deref().unwrap_or("-"),
                        body = %record.body,
                        error = %err,
                        "record failed"
                    );
                }
            }
        }
        debug_assert_eq!(
            summary.processed + summary.skipped + summary.failed,
            records.len()
        );

        let sync = self.sync.trigger().await;
        if sync.is_completed() {
            info!(?summary, "batch complete, sync completed");
        } else {
            warn!(?summary, ?sync, "batch complete, sync not completed");
        }

        BatchResult {
            status: BatchStatus::Success,
            sync,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use pagefeed_sync::DisabledSyncTrigger;
    use serde_json::json;

    use super::*;

    #[test]
    fn batch_result_shape() {
        let result = BatchResult {
            status: BatchStatus::Success,
            sync: SyncOutcome::Failed {
                error: "connection refused".into(),
            },
            summary: BatchSummary {
                processed: 1,
                skipped: 2,
                failed: 3,
            },
        };

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "status": "success",
                "sync": {"outcome": "failed", "error": "connection refused"},
                "summary": {"processed": 1, "skipped": 2, "failed": 3}
            })
        );
    }

    #[tokio::test]
    async fn empty_batch_still_triggers_sync() {
        let ctx = crate::services::context::IngestContext::builder()
            .store(Arc::new(crate::services::object_store::MemoryObjectStore::new()))
            .rasterizer(Arc::new(crate::raster::PdfiumRasterizer::default()))
            .build();
        let coordinator =
            BatchCoordinator::new(RecordDispatcher::new(&ctx), Arc::new(DisabledSyncTrigger));

        let result = coordinator.run(&[]).await;
        assert_eq!(result.status, BatchStatus::Success);
        assert_eq!(result.sync, SyncOutcome::Skipped);
        assert_eq!(result.summary, BatchSummary::default());
    }
}

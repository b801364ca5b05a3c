//! IO-bound pipeline services.
//!
//! Pure key, sequence, and policy logic lives in `crate::pipeline`; modules
//! here talk to the object store, the rasterizer, and the sync trigger.

pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod materializer;
pub mod object_store;
pub mod relocation;
#[cfg(feature = "s3")]
pub mod s3_store;
pub mod sequence;
pub mod tasks;

pub use context::{
    ContextError, IngestContext, IngestError, IngestResult, build_ingest_context,
};
pub use coordinator::{BatchCoordinator, BatchResult, BatchStatus, BatchSummary};
pub use dispatcher::{RecordDispatcher, RecordOutcome, SkipReason};
pub use materializer::{PageMaterializer, RasterArtifact, SourceDocument};
pub use object_store::{DurableWrite, FsObjectStore, MemoryObjectStore, ObjectStore, StoreError};
pub use relocation::RelocationPolicy;
#[cfg(feature = "s3")]
pub use s3_store::S3ObjectStore;
pub use sequence::SequenceAllocator;
pub use tasks::TaskEmitter;

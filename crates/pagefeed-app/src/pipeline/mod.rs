//! Pure ingestion logic: key layout, sequence derivation, the extension
//! policy table, and wire formats.
//!
//! Modules under this namespace must remain free of IO so the orchestration
//! in `crate::services` and the tests can share them.

pub mod keys;
pub mod notification;
pub mod policy;
pub mod sequence;
pub mod task;

pub use keys::{
    KeyError, is_staged, object_uri, page_artifact_key, raw_original_key, single_artifact_key,
    split_file_name, task_key, unescape_key,
};
pub use notification::{DecodeError, Notification, QueueEvent, QueueRecord, storage_event_record};
pub use policy::{IngestPolicy, Materialization, PolicyError, Relocation, SourceKind};
pub use sequence::{next_sequence, parse_task_sequence};
pub use task::{TaskData, WorkItem};

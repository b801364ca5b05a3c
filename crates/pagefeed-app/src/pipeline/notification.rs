//! Wire format of inbound queue batches and the storage events they carry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A batch of queue messages as delivered to the worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

/// One queue message. Its `body` is an opaque JSON string holding a storage
/// event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub body: String,
}

impl QueueRecord {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            message_id: None,
            body: body.into(),
        }
    }

    /// Decodes the body into the notification it carries. Only the first
    /// storage record of the body is used.
    pub fn decode(&self) -> Result<Notification, DecodeError> {
        let event: StorageEvent = serde_json::from_str(&self.body).map_err(DecodeError::Json)?;
        let record = event
            .records
            .into_iter()
            .next()
            .ok_or(DecodeError::NoRecords)?;

        Ok(Notification {
            bucket: record.s3.bucket.name,
            key: record.s3.object.key,
        })
    }
}

/// A "new object" notification. `key` is still URL-escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("notification body is not a storage event: {0}")]
    Json(#[source] serde_json::Error),
    #[error("storage event carries no records")]
    NoRecords,
}

#[derive(Debug, Serialize, Deserialize)]
struct StorageEvent {
    #[serde(rename = "Records", default)]
    records: Vec<StorageEventRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StorageEventRecord {
    s3: StorageEntity,
}

#[derive(Debug, Serialize, Deserialize)]
struct StorageEntity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectEntity {
    key: String,
}

/// Builds the queue record a storage service would deliver for `bucket/key`.
/// The key is taken as-is, so callers pass the escaped form.
pub fn storage_event_record(bucket: &str, key: &str) -> QueueRecord {
    let event = StorageEvent {
        records: vec![StorageEventRecord {
            s3: StorageEntity {
                bucket: BucketEntity {
                    name: bucket.to_string(),
                },
                object: ObjectEntity {
                    key: key.to_string(),
                },
            },
        }],
    };
    let body = serde_json::to_string(&event).expect("storage event serializes");
    QueueRecord::new(body)
}

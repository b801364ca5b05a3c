//! Work-item documents consumed by the labeling service.

use serde::{Deserialize, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskData {
    pub image: String,
}

/// One labeling task. Persisted as a single-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub data: TaskData,
}

impl WorkItem {
    pub fn for_image(image: impl Into<String>) -> Self {
        Self {
            data: TaskData {
                image: image.into(),
            },
        }
    }

    /// Serializes `[self]` with four-space indentation.
    pub fn to_document(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
        [self].serialize(&mut serializer)?;
        Ok(out)
    }

    pub fn from_document(bytes: &[u8]) -> Result<Vec<WorkItem>, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

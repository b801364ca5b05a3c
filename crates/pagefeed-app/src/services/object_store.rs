use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::paths::{AppPaths, PathError};

// Object storage abstractions.
//
// The ingestion pipeline only needs four capabilities from a store: fetch,
// write, delete, and prefix listing. Backends: filesystem (default), in-memory
// (tests and dry runs), and S3 behind the `s3` feature.

/// Prefix of in-flight temp files; never reported by `list`.
const PARTIAL_FILE_PREFIX: &str = ".pagefeed-partial-";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{bucket}/{key}` not found")]
    NotFound { bucket: String, key: String },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Capability set the ingestion pipeline needs from an object store.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Return the full object or `StoreError::NotFound`.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

    /// Create or replace the object at `key`.
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Delete the object. Deleting a missing object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Every key in `bucket` starting with `prefix`, in no guaranteed order.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Durability policy for filesystem writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableWrite {
    /// No explicit fsync (fastest, least durable).
    None,
    /// Fsync the file only.
    FileOnly,
    /// Fsync file and parent directory.
    FileAndDir,
}

/// Filesystem object store rooted at an [`AppPaths`] directory.
///
/// Writes go to a temp file in the destination directory and are renamed
/// into place, so readers never observe a partial object.
#[derive(Debug, Clone, bon::Builder)]
pub struct FsObjectStore {
    paths: AppPaths,
    #[builder(default = DurableWrite::None)]
    durability: DurableWrite,
}

impl FsObjectStore {
    async fn fsync_dir(&self, dir_path: &Path) {
        // Directory fsync is best-effort; some platforms don't support it.
        match fs::File::open(dir_path).await {
            Ok(dir_file) => {
                if let Err(e) = dir_file.sync_all().await {
                    tracing::warn!("directory fsync unsupported or failed: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("failed to open directory for fsync: {}", e);
            }
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let path = self.paths.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = self.paths.object_path(bucket, key)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::Backend(format!("object path {path:?} has no parent")))?;

        fs::create_dir_all(&parent)
            .await
            .map_err(|e| StoreError::io(&parent, e))?;

        let temp_file = tempfile::Builder::new()
            .prefix(PARTIAL_FILE_PREFIX)
            .tempfile_in(&parent)
            .map_err(|e| StoreError::io(&parent, e))?;

        let mut file = fs::File::from_std(
            temp_file
                .reopen()
                .map_err(|e| StoreError::io(temp_file.path(), e))?,
        );
        file.write_all(&data)
            .await
            .map_err(|e| StoreError::io(temp_file.path(), e))?;

        match self.durability {
            DurableWrite::FileOnly | DurableWrite::FileAndDir => {
                file.sync_all()
                    .await
                    .map_err(|e| StoreError::io(temp_file.path(), e))?;
            }
            DurableWrite::None => {}
        }
        drop(file);

        temp_file
            .persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        if self.durability == DurableWrite::FileAndDir {
            self.fsync_dir(&parent).await;
        }

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let path = self.paths.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let bucket_dir = self.paths.bucket_dir(bucket)?;
        let root = self.paths.listing_root(bucket, prefix)?;

        let mut keys = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&dir, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::io(&dir, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StoreError::io(&path, e))?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(PARTIAL_FILE_PREFIX)
                {
                    continue;
                }

                let Some(key) = key_from_path(&bucket_dir, &path) else {
                    continue;
                };
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

fn key_from_path(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let segments = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

type MemoryMap = BTreeMap<(String, String), Bytes>;

/// Process-local object store.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<MemoryMap>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key currently stored in `bucket`, sorted.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.lock().await;
        objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        let objects = self.objects.lock().await;
        objects.contains_key(&(bucket.to_string(), key.to_string()))
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let objects = self.objects.lock().await;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().await;
        objects.insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().await;
        objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.lock().await;
        Ok(objects
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }
}

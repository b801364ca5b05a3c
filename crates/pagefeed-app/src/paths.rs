//! Filesystem path helpers (XDG-aware) for the local object-store backend.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("unable to determine project directories")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid bucket name `{bucket}`")]
    InvalidBucket { bucket: String },
    #[error("invalid object key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

/// Root of the filesystem object store. In production this is
/// `$XDG_DATA_HOME/pagefeed/objects`; tests construct custom instances.
///
/// Objects live at `<root>/<bucket>/<key>`, with `/` in keys mapped to
/// directory separators.
#[derive(Debug, Clone)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    /// Construct paths rooted under `$XDG_DATA_HOME/pagefeed/objects`.
    pub fn from_project_dirs() -> Result<Self, PathError> {
        Self::new(default_objects_dir()?)
    }

    /// Construct paths rooted under the provided directory, ensuring it exists.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, PathError> {
        let base = base.as_ref().to_path_buf();
        ensure_dir(&base)?;
        Ok(Self { base_dir: base })
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }

    /// Directory holding every object of `bucket`. Not created.
    pub fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, PathError> {
        validate_bucket(bucket)?;
        Ok(self.base_dir.join(bucket))
    }

    /// Path of one object. Neither the file nor its parents are created.
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, PathError> {
        let mut path = self.bucket_dir(bucket)?;
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }

    /// Directory that contains every key starting with `prefix`.
    ///
    /// `ingest/` maps to `<bucket>/ingest`, `raw/doc_` to `<bucket>/raw`.
    pub fn listing_root(&self, bucket: &str, prefix: &str) -> Result<PathBuf, PathError> {
        let mut path = self.bucket_dir(bucket)?;
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        for segment in dir_part.split('/').filter(|segment| !segment.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(PathError::InvalidKey {
                    key: prefix.to_string(),
                    reason: "relative path segment",
                });
            }
            path.push(segment);
        }
        Ok(path)
    }
}

pub fn project_dirs() -> Result<ProjectDirs, PathError> {
    ProjectDirs::from("dev", "pagefeed", "pagefeed").ok_or(PathError::MissingProjectDirs)
}

pub fn default_objects_dir() -> Result<PathBuf, PathError> {
    Ok(project_dirs()?.data_dir().join("objects"))
}

fn validate_bucket(bucket: &str) -> Result<(), PathError> {
    let trimmed = bucket.trim();
    if trimmed.is_empty()
        || trimmed != bucket
        || bucket == "."
        || bucket == ".."
        || bucket.contains(['/', '\\'])
    {
        return Err(PathError::InvalidBucket {
            bucket: bucket.to_string(),
        });
    }
    Ok(())
}

fn key_segments(key: &str) -> Result<Vec<&str>, PathError> {
    let invalid = |reason| PathError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.starts_with('/') {
        return Err(invalid("leading slash"));
    }
    if key.ends_with('/') {
        return Err(invalid("trailing slash"));
    }

    let segments: Vec<&str> = key.split('/').collect();
    for segment in &segments {
        match *segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("relative path segment")),
            s if s.contains('\\') => return Err(invalid("backslash in key")),
            _ => {}
        }
    }
    Ok(segments)
}

fn ensure_dir(path: &Path) -> Result<PathBuf, PathError> {
    if let Err(err) = fs::create_dir_all(path)
        && err.kind() != io::ErrorKind::AlreadyExists
    {
        return Err(PathError::CreateDir {
            path: path.to_path_buf(),
            source: err,
        });
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn object_path_maps_key_segments() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::new(temp.path()).unwrap();

        let path = paths.object_path("bucket", "raw/doc_0001.png").unwrap();
        assert_eq!(path, temp.path().join("bucket").join("raw").join("doc_0001.png"));
    }

    #[test]
    fn keys_with_spaces_are_allowed() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::new(temp.path()).unwrap();
        assert!(paths.object_path("bucket", "upload/file with spaces.pdf").is_ok());
    }

    #[test]
    fn traversal_and_malformed_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::new(temp.path()).unwrap();

        for key in ["", "/abs", "raw/", "raw//x", "../escape", "raw/./x", "a\\b"] {
            assert!(
                matches!(paths.object_path("bucket", key), Err(PathError::InvalidKey { .. })),
                "key `{key}` should be rejected"
            );
        }
        for bucket in ["", "..", "a/b", " padded"] {
            assert!(
                matches!(paths.object_path(bucket, "k"), Err(PathError::InvalidBucket { .. })),
                "bucket `{bucket}` should be rejected"
            );
        }
    }

    #[test]
    fn listing_root_uses_directory_part_of_prefix() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::new(temp.path()).unwrap();

        assert_eq!(
            paths.listing_root("b", "ingest/").unwrap(),
            temp.path().join("b").join("ingest")
        );
        assert_eq!(
            paths.listing_root("b", "raw/doc_").unwrap(),
            temp.path().join("b").join("raw")
        );
        assert_eq!(paths.listing_root("b", "").unwrap(), temp.path().join("b"));
        assert!(paths.listing_root("b", "../").is_err());
    }
}

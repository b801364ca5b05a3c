//! Key derivation for the staging and durable namespaces.

use thiserror::Error;

use crate::constants::{
    PAGE_NUMBER_WIDTH, RASTER_EXTENSION, RAW_PREFIX, SEQUENCE_WIDTH, STAGING_PREFIX, TASK_PREFIX,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("object key `{key}` is not valid percent-encoded UTF-8")]
    InvalidEscape { key: String },
}

/// Unescapes an object key as delivered in storage notifications: `+` becomes
/// a space, then percent escapes are decoded.
pub fn unescape_key(raw: &str) -> Result<String, KeyError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| KeyError::InvalidEscape {
            key: raw.to_string(),
        })
}

pub fn is_staged(key: &str) -> bool {
    key.starts_with(STAGING_PREFIX)
}

/// Splits the final path segment of `key` into `(base_name, extension)`.
///
/// The extension keeps its leading dot and is lower-cased. Leading dots of
/// the file name do not start an extension, so `.hidden` has none.
pub fn split_file_name(key: &str) -> (String, String) {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let leading_dots = file_name.len() - file_name.trim_start_matches('.').len();

    match file_name[leading_dots..].rfind('.') {
        Some(offset) => {
            let split = leading_dots + offset;
            (
                file_name[..split].to_string(),
                file_name[split..].to_ascii_lowercase(),
            )
        }
        None => (file_name.to_string(), String::new()),
    }
}

/// `raw/<base><ext>`: where a relocated original lands.
pub fn raw_original_key(base_name: &str, extension: &str) -> String {
    format!("{RAW_PREFIX}{base_name}{extension}")
}

/// `raw/<base>_<page:04>.png`: one page of a multi-page source.
pub fn page_artifact_key(base_name: &str, page_number: usize) -> String {
    debug_assert!(page_number >= 1, "page numbers are 1-based");
    format!(
        "{RAW_PREFIX}{base_name}_{page_number:0width$}.{RASTER_EXTENSION}",
        width = PAGE_NUMBER_WIDTH
    )
}

/// `raw/<base>.png`: the artifact of a single-raster source.
pub fn single_artifact_key(base_name: &str) -> String {
    format!("{RAW_PREFIX}{base_name}.{RASTER_EXTENSION}")
}

/// File name of a work item, e.g. `TASK_0000042.json`.
pub fn task_file_name(sequence: u64) -> String {
    format!("TASK_{sequence:0width$}.json", width = SEQUENCE_WIDTH)
}

/// `ingest/TASK_<sequence:07>.json`.
pub fn task_key(sequence: u64) -> String {
    format!("{TASK_PREFIX}{}", task_file_name(sequence))
}

/// Fully-qualified locator of an object, e.g. `s3://bucket/raw/doc_0001.png`.
pub fn object_uri(scheme: &str, bucket: &str, key: &str) -> String {
    format!("{scheme}://{bucket}/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_and_percent_escapes_are_decoded() {
        assert_eq!(
            unescape_key("upload/file+with+spaces.pdf").unwrap(),
            "upload/file with spaces.pdf"
        );
        assert_eq!(
            unescape_key("upload/BD23-25943+FLR+PLN.pdf").unwrap(),
            "upload/BD23-25943 FLR PLN.pdf"
        );
        assert_eq!(
            unescape_key("upload/a%2Bb%20c.png").unwrap(),
            "upload/a+b c.png"
        );
    }

    #[test]
    fn invalid_utf8_escape_is_rejected() {
        assert!(matches!(
            unescape_key("upload/%FF.pdf"),
            Err(KeyError::InvalidEscape { .. })
        ));
    }

    #[test]
    fn staging_prefix_is_checked_on_decoded_key() {
        assert!(is_staged("upload/doc.pdf"));
        assert!(!is_staged("other/upload/doc.pdf"));
        assert!(!is_staged("uploads/doc.pdf"));
    }

    #[test]
    fn file_name_split_lowercases_extension() {
        assert_eq!(
            split_file_name("upload/Scan 01.TIFF"),
            ("Scan 01".to_string(), ".tiff".to_string())
        );
        assert_eq!(
            split_file_name("upload/archive.tar.PDF"),
            ("archive.tar".to_string(), ".pdf".to_string())
        );
    }

    #[test]
    fn file_name_without_extension() {
        assert_eq!(
            split_file_name("upload/README"),
            ("README".to_string(), String::new())
        );
        assert_eq!(
            split_file_name("upload/.hidden"),
            (".hidden".to_string(), String::new())
        );
        assert_eq!(
            split_file_name("upload/.hidden.png"),
            (".hidden".to_string(), ".png".to_string())
        );
    }

    #[test]
    fn durable_layout_is_bit_exact() {
        assert_eq!(raw_original_key("scan", ".tif"), "raw/scan.tif");
        assert_eq!(page_artifact_key("test_doc", 1), "raw/test_doc_0001.png");
        assert_eq!(page_artifact_key("test_doc", 10), "raw/test_doc_0010.png");
        assert_eq!(page_artifact_key("test_doc", 100), "raw/test_doc_0100.png");
        assert_eq!(single_artifact_key("test_image"), "raw/test_image.png");
        assert_eq!(task_key(5), "ingest/TASK_0000005.json");
        assert_eq!(task_key(12_345_678), "ingest/TASK_12345678.json");
        assert_eq!(
            object_uri("s3", "test-bucket", "raw/test.png"),
            "s3://test-bucket/raw/test.png"
        );
    }
}

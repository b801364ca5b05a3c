//! Extension-keyed behavior table.
//!
//! One lookup decides both how a source is materialized and whether its
//! original leaves the staging namespace.

use serde::Deserialize;
use strum::AsRefStr;
use thiserror::Error;

/// How a source becomes raster artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Materialization {
    /// Render every page of a document.
    Paged,
    /// Re-encode a single raster image.
    Single,
}

/// What happens to the original object once it has been fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Relocation {
    /// Copy to `raw/<base><ext>` and delete the staging object.
    MoveOnIngest,
    /// Leave the original at its staging key.
    LeaveInPlace,
}

/// Behavior selected for one supported extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceKind {
    pub extension: &'static str,
    pub materialization: Materialization,
    pub relocation: Relocation,
}

const SOURCE_KINDS: &[SourceKind] = &[
    SourceKind {
        extension: ".pdf",
        materialization: Materialization::Paged,
        relocation: Relocation::LeaveInPlace,
    },
    SourceKind {
        extension: ".png",
        materialization: Materialization::Single,
        relocation: Relocation::MoveOnIngest,
    },
    SourceKind {
        extension: ".tif",
        materialization: Materialization::Single,
        relocation: Relocation::MoveOnIngest,
    },
    SourceKind {
        extension: ".tiff",
        materialization: Materialization::Single,
        relocation: Relocation::MoveOnIngest,
    },
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("extension `{extension}` has no materialization strategy")]
    UnknownExtension { extension: String },
    #[error("at least one source extension must be accepted")]
    NothingAccepted,
}

/// Subset of the static table enabled for this deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestPolicy {
    kinds: Vec<SourceKind>,
}

impl IngestPolicy {
    /// Enables `accepted` extensions (case-insensitive, leading dot optional)
    /// and applies `paged_relocation` to paged sources.
    pub fn new<S: AsRef<str>>(
        accepted: &[S],
        paged_relocation: Relocation,
    ) -> Result<Self, PolicyError> {
        let mut kinds: Vec<SourceKind> = Vec::with_capacity(accepted.len());

        for raw in accepted {
            let extension = normalize_extension(raw.as_ref());
            let mut kind = SOURCE_KINDS
                .iter()
                .find(|kind| kind.extension == extension)
                .copied()
                .ok_or(PolicyError::UnknownExtension {
                    extension: extension.clone(),
                })?;

            if kind.materialization == Materialization::Paged {
                kind.relocation = paged_relocation;
            }
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        if kinds.is_empty() {
            return Err(PolicyError::NothingAccepted);
        }

        Ok(Self { kinds })
    }

    /// Looks up a lower-cased extension including its leading dot.
    pub fn lookup(&self, extension: &str) -> Option<SourceKind> {
        self.kinds
            .iter()
            .find(|kind| kind.extension == extension)
            .copied()
    }

    pub fn extensions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.iter().map(|kind| kind.extension)
    }
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            kinds: SOURCE_KINDS.to_vec(),
        }
    }
}

fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_leaves_pdf_in_place_and_moves_rasters() {
        let policy = IngestPolicy::default();

        let pdf = policy.lookup(".pdf").expect("pdf supported");
        assert_eq!(pdf.materialization, Materialization::Paged);
        assert_eq!(pdf.relocation, Relocation::LeaveInPlace);

        for ext in [".png", ".tif", ".tiff"] {
            let kind = policy.lookup(ext).expect("raster supported");
            assert_eq!(kind.materialization, Materialization::Single);
            assert_eq!(kind.relocation, Relocation::MoveOnIngest);
        }

        assert!(policy.lookup(".jpg").is_none());
        assert!(policy.lookup("").is_none());
    }

    #[test]
    fn accepted_set_is_configurable() {
        let policy = IngestPolicy::new(&["PDF", ".tiff"], Relocation::LeaveInPlace).unwrap();
        assert!(policy.lookup(".pdf").is_some());
        assert!(policy.lookup(".tiff").is_some());
        assert!(policy.lookup(".png").is_none());
        assert_eq!(policy.extensions().collect::<Vec<_>>(), vec![".pdf", ".tiff"]);
    }

    #[test]
    fn paged_relocation_variant_applies_to_pdf_only() {
        let policy =
            IngestPolicy::new(&[".pdf", ".png"], Relocation::MoveOnIngest).unwrap();
        assert_eq!(
            policy.lookup(".pdf").unwrap().relocation,
            Relocation::MoveOnIngest
        );
        assert_eq!(
            policy.lookup(".png").unwrap().relocation,
            Relocation::MoveOnIngest
        );
    }

    #[test]
    fn unknown_or_empty_accepted_sets_are_rejected() {
        assert_eq!(
            IngestPolicy::new(&[".docx"], Relocation::LeaveInPlace),
            Err(PolicyError::UnknownExtension {
                extension: ".docx".to_string()
            })
        );
        assert_eq!(
            IngestPolicy::new::<&str>(&[], Relocation::LeaveInPlace),
            Err(PolicyError::NothingAccepted)
        );
    }
}

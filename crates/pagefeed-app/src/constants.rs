//! Fixed object-store layout shared by every worker generation.

/// Prefix where new source files arrive.
pub const STAGING_PREFIX: &str = "upload/";

/// Prefix for relocated originals and derived raster artifacts.
pub const RAW_PREFIX: &str = "raw/";

/// Prefix for emitted work items.
pub const TASK_PREFIX: &str = "ingest/";

/// File extension (without dot) of every raster artifact.
pub const RASTER_EXTENSION: &str = "png";

/// Zero-padding width of page numbers in artifact keys.
pub const PAGE_NUMBER_WIDTH: usize = 4;

/// Zero-padding width of sequence numbers in work-item keys.
pub const SEQUENCE_WIDTH: usize = 7;

/// URI scheme used in work-item image references unless configured otherwise.
pub const DEFAULT_URI_SCHEME: &str = "s3";

/// Resolution PDF pages are rendered at unless configured otherwise.
pub const DEFAULT_RENDER_DPI: u32 = 300;

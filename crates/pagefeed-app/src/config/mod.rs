//! Layered configuration.
//!
//! Sources, later ones winning: built-in defaults, `/etc/pagefeed/settings.toml`
//! (directory overridable via `PAGEFEED_ETC_CONFIG_DIR`), the XDG config file,
//! `./config/settings.toml`, the file named by `PAGEFEED_CONFIG_FILE`, and
//! finally `PAGEFEED__SECTION__KEY` environment variables.

use std::env;
use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use pagefeed_sync::SyncConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{DEFAULT_RENDER_DPI, DEFAULT_URI_SCHEME};
use crate::paths::{self, PathError};
use crate::pipeline::{IngestPolicy, PolicyError, Relocation};

const ENV_PREFIX: &str = "PAGEFEED";
const ETC_DIR_VAR: &str = "PAGEFEED_ETC_CONFIG_DIR";
const CONFIG_FILE_VAR: &str = "PAGEFEED_CONFIG_FILE";
const SETTINGS_FILE: &str = "settings.toml";
const LOCAL_CONFIG_FILE: &str = "config/settings.toml";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub raster: RasterConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Fs,
    S3,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub path: PathBuf,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct S3Config {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_pdf_relocation")]
    pub pdf_relocation: Relocation,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            pdf_relocation: default_pdf_relocation(),
        }
    }
}

impl IngestConfig {
    pub fn policy(&self) -> Result<IngestPolicy, PolicyError> {
        IngestPolicy::new(&self.extensions, self.pdf_relocation)
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RasterConfig {
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self { dpi: default_dpi() }
    }
}

impl AppConfig {
    /// Defaults for every section with the filesystem store rooted at `path`.
    pub fn for_storage_path(path: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "127.0.0.1:8080".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Fs,
                path: path.into(),
                scheme: default_scheme(),
                s3: None,
            },
            ingest: IngestConfig::default(),
            raster: RasterConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_storage = paths::default_objects_dir()?;
    let mut builder = Config::builder()
        .set_default("server.listen_addr", "127.0.0.1:8080")?
        .set_default(
            "storage.path",
            default_storage.to_string_lossy().to_string(),
        )?;

    for path in config_files() {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
    }

    let cfg = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(" ")
                .with_list_parse_key("ingest.extensions")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    Ok(cfg)
}

/// Candidate config files in ascending precedence. Missing files are skipped.
fn config_files() -> Vec<PathBuf> {
    let mut files = Vec::with_capacity(4);

    let etc_dir = env::var_os(ETC_DIR_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc"));
    files.push(etc_dir.join("pagefeed").join(SETTINGS_FILE));

    if let Ok(dirs) = paths::project_dirs() {
        files.push(dirs.config_dir().join(SETTINGS_FILE));
    }

    files.push(PathBuf::from(LOCAL_CONFIG_FILE));

    if let Some(explicit) = env::var_os(CONFIG_FILE_VAR) {
        files.push(PathBuf::from(explicit));
    }

    files
}

fn default_scheme() -> String {
    DEFAULT_URI_SCHEME.to_string()
}

fn default_extensions() -> Vec<String> {
    [".pdf", ".png", ".tif", ".tiff"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_pdf_relocation() -> Relocation {
    Relocation::LeaveInPlace
}

fn default_dpi() -> u32 {
    DEFAULT_RENDER_DPI
}

//! Configuration loading and XDG path helpers.
//!
//! Sources are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. `/etc/jernih/settings.toml` (`JERNIH_ETC_CONFIG_DIR` replaces `/etc`)
//! 3. `$XDG_CONFIG_HOME/jernih/settings.toml`
//! 4. `./config/settings.toml`
//! 5. the file named by `JERNIH_CONFIG_FILE`
//! 6. `JERNIH__SECTION__KEY` environment variables

use std::env;
use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use jernih_server::{DEFAULT_LISTEN_ADDR, DEFAULT_MAX_UPLOAD_BYTES, ServerConfig};
use serde::Deserialize;
use thiserror::Error;

const APP_NAME: &str = "jernih";
const SETTINGS_FILE: &str = "settings.toml";
const LOCAL_CONFIG_FILE: &str = "config/settings";
const ETC_DIR_ENV: &str = "JERNIH_ETC_CONFIG_DIR";
const CONFIG_FILE_ENV: &str = "JERNIH_CONFIG_FILE";
const ENV_PREFIX: &str = "JERNIH";
const DEFAULT_ETC_DIR: &str = "/etc";

pub const DEFAULT_SLANG_PATH: &str = "data/new_kamusalay.csv";
pub const DEFAULT_ABUSIVE_PATH: &str = "data/abusive.csv";
pub const DEFAULT_ABUSIVE_COLUMN: &str = "ABUSIVE";
pub const DEFAULT_TARGET_FIELD: &str = "Tweet";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub lexicon: LexiconConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// When false, processing records are kept in memory only.
    #[serde(default = "StorageConfig::default_history")]
    pub history: bool,
}

impl StorageConfig {
    fn default_history() -> bool {
        true
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LexiconConfig {
    /// Headerless two-column CSV (slang token, canonical token), Latin-1.
    pub slang_path: PathBuf,
    /// CSV with a header row; one column holds the abusive patterns.
    pub abusive_path: PathBuf,
    #[serde(default = "LexiconConfig::default_abusive_column")]
    pub abusive_column: String,
}

impl LexiconConfig {
    fn default_abusive_column() -> String {
        DEFAULT_ABUSIVE_COLUMN.to_string()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Column cleansed in uploaded tables when the request does not name one.
    #[serde(default = "PipelineConfig::default_target_field")]
    pub target_field: String,
}

impl PipelineConfig {
    fn default_target_field() -> String {
        DEFAULT_TARGET_FIELD.to_string()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_field: Self::default_target_field(),
        }
    }
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let dirs = project_dirs()?;
    let default_storage = dirs.data_dir().join("lmdb");

    let mut builder = Config::builder()
        .set_default("server.listen_addr", DEFAULT_LISTEN_ADDR)?
        .set_default("server.max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES as u64)?
        .set_default(
            "storage.path",
            default_storage.to_string_lossy().to_string(),
        )?
        .set_default("storage.history", true)?
        .set_default("lexicon.slang_path", DEFAULT_SLANG_PATH)?
        .set_default("lexicon.abusive_path", DEFAULT_ABUSIVE_PATH)?
        .set_default("lexicon.abusive_column", DEFAULT_ABUSIVE_COLUMN)?
        .set_default("pipeline.target_field", DEFAULT_TARGET_FIELD)?;

    let etc_root = env::var_os(ETC_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ETC_DIR));
    builder = builder
        .add_source(optional_toml(etc_root.join(APP_NAME).join(SETTINGS_FILE)))
        .add_source(optional_toml(dirs.config_dir().join(SETTINGS_FILE)))
        .add_source(File::with_name(LOCAL_CONFIG_FILE).required(false));

    if let Some(path) = env::var_os(CONFIG_FILE_ENV) {
        tracing::debug!(path = ?path, "loading config override file");
        builder = builder.add_source(optional_toml(PathBuf::from(path)));
    }

    let builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "jernih", APP_NAME).ok_or(AppConfigError::MissingProjectDirs)
}

fn optional_toml(path: PathBuf) -> File<config::FileSourceFile, FileFormat> {
    File::from(path).format(FileFormat::Toml).required(false)
}

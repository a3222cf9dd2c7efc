use crate::constants::{DEFAULT_MAX_SHARD_BYTES, DEFAULT_RECORD_TAG, EXPORT_URL};
use crate::errors::{AppError, AppResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolved configuration with all values filled in (no Options).
///
/// This struct represents the pipeline defaults and can be deserialized
/// by the TOML loader. All fields have concrete values, making it safe
/// to access directly without unwrapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolvedConfig {
    /// Source URL for the directory export
    pub export_url: String,
    /// Directory for the downloaded export file
    pub tmp_dir: PathBuf,
    /// Directory for the per-country output shards
    pub extracts_dir: PathBuf,
    /// Element name of one record in the export
    pub record_tag: String,
    /// Shard rotation threshold in bytes; a shard is closed once its
    /// size exceeds this before the next record is written
    pub max_shard_bytes: u64,

    // Downloads
    /// Maximum number of retry attempts for a failed download
    pub max_retries: u32,
    /// Initial delay in milliseconds before the first retry
    pub retry_initial_delay_ms: u64,
    /// Maximum delay in milliseconds between retries
    pub retry_max_delay_ms: u64,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            export_url: EXPORT_URL.to_string(),
            tmp_dir: PathBuf::from("tmp"),
            extracts_dir: PathBuf::from("extracts"),
            record_tag: DEFAULT_RECORD_TAG.to_string(),
            max_shard_bytes: DEFAULT_MAX_SHARD_BYTES,
            max_retries: 3,
            retry_initial_delay_ms: 1000,
            retry_max_delay_ms: 10000,
        }
    }
}

/// Configuration that can be loaded from a TOML file.
///
/// All fields are optional with pipeline defaults. The parser rejects
/// unknown keys to catch typos, and validates that the rotation
/// threshold and record tag are usable.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfigFile {
    /// Re-download the export even if a cached copy exists
    #[serde(default)]
    pub force_download: bool,
    /// Delete existing extracts before processing (defaults to `true`)
    #[serde(default = "default_cleanup")]
    pub cleanup_extracts: bool,
    /// Keep the downloaded export after processing
    #[serde(default)]
    pub keep_tmp: bool,
    /// Flattened resolved configuration with pipeline defaults
    #[serde(flatten)]
    pub resolved: ResolvedConfig,
}

impl SyncConfigFile {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the TOML is malformed, unknown keys
    /// are present, the rotation threshold is zero, or the record tag
    /// is empty.
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config: SyncConfigFile = toml::from_str(&contents)
            .map_err(|e| AppError::InvalidInput(format!("Failed to parse config: {e}")))?;

        if config.resolved.max_shard_bytes == 0 {
            return Err(AppError::InvalidInput(
                "max_shard_bytes must be greater than 0".into(),
            ));
        }
        if config.resolved.record_tag.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "record_tag must not be empty".into(),
            ));
        }

        Ok(config)
    }
}

fn default_cleanup() -> bool {
    true
}

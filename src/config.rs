//! Configuration loading and types for s3chunk.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional; a missing file falls
//! back to [`Config::default`].  The resulting value is built once at
//! startup and passed explicitly to every operation.

use serde::Deserialize;
use std::num::NonZeroU64;
use std::path::Path;

use crate::errors::TransferError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Object store connection settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chunking, listing and batch settings.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Settings for `put --backup`.
    #[serde(default)]
    pub backup: BackupConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Object store backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `aws` or `local`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// S3 (or S3-compatible) settings.
    #[serde(default)]
    pub aws: AwsStorageConfig,

    /// Local directory store settings.
    #[serde(default)]
    pub local: LocalStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            aws: AwsStorageConfig::default(),
            local: LocalStorageConfig::default(),
        }
    }
}

/// S3 connection configuration.
///
/// Empty strings mean "not set"; credentials then come from the standard
/// AWS chain (env vars, `~/.aws/credentials`, IAM role, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct AwsStorageConfig {
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit access key.
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit secret key.
    #[serde(default)]
    pub secret_access_key: String,
    /// Named profile from the shared AWS config files.
    #[serde(default)]
    pub profile: String,
}

impl Default for AwsStorageConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: String::new(),
            use_path_style: false,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            profile: String::new(),
        }
    }
}

/// Local directory store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory; each bucket is a subdirectory.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// Transfer tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Default chunk size in MiB for `--big` without a value.
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: f64,

    /// Keys requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Largest object the store accepts in a single put, in bytes.
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,

    /// Keep going with the remaining files after a failed upload.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_mb: default_chunk_size_mb(),
            page_size: default_page_size(),
            max_object_size: default_max_object_size(),
            continue_on_error: false,
        }
    }
}

impl TransferConfig {
    /// Convert a chunk size in MiB to bytes.
    ///
    /// Fractional sizes are allowed (`0.1` is about 100 KiB).  Anything
    /// that rounds down to zero bytes, or is not finite, is rejected.
    pub fn chunk_size_bytes(megabytes: f64) -> Result<NonZeroU64, TransferError> {
        if !megabytes.is_finite() || megabytes <= 0.0 {
            return Err(TransferError::invalid(format!(
                "chunk size must be a positive number of megabytes, got {megabytes}"
            )));
        }
        let bytes = (megabytes * 1024.0 * 1024.0) as u64;
        NonZeroU64::new(bytes).ok_or_else(|| {
            TransferError::invalid(format!("chunk size of {megabytes}MB is less than one byte"))
        })
    }

    /// The configured default chunk size in bytes.
    pub fn default_chunk_size(&self) -> Result<NonZeroU64, TransferError> {
        Self::chunk_size_bytes(self.chunk_size_mb)
    }
}

/// `put --backup` configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// JSON file recording what each file looked like at its last backup.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_storage_backend() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_root() -> String {
    "./data/objects".to_string()
}

fn default_chunk_size_mb() -> f64 {
    10.0
}

fn default_page_size() -> u32 {
    250
}

fn default_max_object_size() -> u64 {
    5_368_709_120 // 5 GiB
}

fn default_ledger_path() -> String {
    "./.s3chunk-ledger.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

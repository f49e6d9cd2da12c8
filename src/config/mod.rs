//! Configuration loading and validation.
//!
//! The job is configured from a single YAML file. Environment variables are
//! interpolated before parsing (see [`vars`]), which is how credentials are
//! normally supplied without writing them into the file.

mod vars;

pub use vars::{interpolate, interpolate_with};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyGlobSnafu, EmptyInputPathSnafu, EmptyOutputPathSnafu,
    EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu, ZeroBatchSizeSnafu,
};

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Main configuration structure for the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    pub output: OutputConfig,
    /// Object-store credentials, passed explicitly to the session.
    #[serde(default)]
    pub aws: Option<AwsCredentials>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where the raw song and log files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// Base URL for both datasets.
    #[serde(default = "default_input_path")]
    pub path: String,
    /// Glob for song files, relative to `path`.
    #[serde(default = "default_song_glob")]
    pub song_glob: String,
    /// Glob for event log files, relative to `path`.
    #[serde(default = "default_log_glob")]
    pub log_glob: String,
    /// Records per decoded Arrow batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of input objects downloaded at once.
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: default_input_path(),
            song_glob: default_song_glob(),
            log_glob: default_log_glob(),
            batch_size: default_batch_size(),
            max_concurrent_files: default_max_concurrent_files(),
        }
    }
}

fn default_input_path() -> String {
    "s3a://udacity-dend/".to_string()
}

fn default_song_glob() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_log_glob() -> String {
    "log_data/*/*/*.json".to_string()
}

fn default_batch_size() -> usize {
    8192
}

fn default_max_concurrent_files() -> usize {
    16
}

/// Where and how the five tables are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Base URL for the table directories.
    pub path: String,
    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,
    /// Roll to a new file once the current one reaches this size.
    #[serde(default = "default_file_size_mb")]
    pub file_size_mb: usize,
    /// Flush a row group once its in-progress size exceeds this threshold.
    #[serde(default = "default_row_group_size_bytes")]
    pub row_group_size_bytes: usize,
}

fn default_file_size_mb() -> usize {
    128
}

fn default_row_group_size_bytes() -> usize {
    128 * MB
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

/// The named credentials section.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl AwsCredentials {
    /// Convert to `object_store` S3 configuration options.
    pub fn storage_options(&self) -> HashMap<String, String> {
        let mut options = HashMap::from([
            ("aws_access_key_id".to_string(), self.access_key_id.clone()),
            (
                "aws_secret_access_key".to_string(),
                self.secret_access_key.clone(),
            ),
        ]);
        if let Some(region) = &self.region {
            options.insert("aws_region".to_string(), region.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            options.insert("aws_endpoint".to_string(), endpoint.clone());
            if endpoint.starts_with("http://") {
                options.insert("aws_allow_http".to_string(), "true".to_string());
            }
        }
        options
    }
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to serve `/metrics` while the job runs (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file, interpolating environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        let content = interpolate(&content).map_err(|errors| {
            EnvInterpolationSnafu {
                message: errors.join("\n"),
            }
            .build()
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.input.path.trim().is_empty(), EmptyInputPathSnafu);
        ensure!(!self.output.path.trim().is_empty(), EmptyOutputPathSnafu);
        ensure!(
            !self.input.song_glob.trim().is_empty(),
            EmptyGlobSnafu { dataset: "song" }
        );
        ensure!(
            !self.input.log_glob.trim().is_empty(),
            EmptyGlobSnafu { dataset: "log" }
        );
        ensure!(self.input.batch_size > 0, ZeroBatchSizeSnafu);
        Ok(())
    }
}

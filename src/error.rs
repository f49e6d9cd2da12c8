//! Error types for sparkify-lake using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// Glob pattern could not be compiled.
    #[snafu(display("Invalid glob pattern '{pattern}': {source}"))]
    InvalidGlob {
        pattern: String,
        source: regex::Error,
    },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input path is empty.
    #[snafu(display("Input path cannot be empty"))]
    EmptyInputPath,

    /// Output path is empty.
    #[snafu(display("Output path cannot be empty"))]
    EmptyOutputPath,

    /// A dataset glob is empty.
    #[snafu(display("Glob for {dataset} files cannot be empty"))]
    EmptyGlob { dataset: String },

    /// Batch size must be positive.
    #[snafu(display("Input batch_size must be greater than zero"))]
    ZeroBatchSize,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

// ============ Session Errors ============

/// Errors that can occur while establishing a session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SessionError {
    /// An object-store location was configured without credentials.
    #[snafu(display("No credentials configured for {url} (add an 'aws' section)"))]
    MissingCredentials { url: String },

    /// Storage provider could not be created.
    #[snafu(display("Failed to open storage at {url}: {source}"))]
    OpenStorage { url: String, source: StorageError },
}

// ============ Reader Errors ============

/// Errors that can occur during NDJSON reading and parsing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// Failed to decompress gzip data.
    #[snafu(display("Failed to decompress gzip data from {path}: {source}"))]
    GzipDecompression {
        path: String,
        source: std::io::Error,
    },

    /// Failed to decompress zstd data.
    #[snafu(display("Failed to decompress zstd data from {path}: {source}"))]
    ZstdDecompression {
        path: String,
        source: std::io::Error,
    },

    /// Failed to build Arrow decoder.
    #[snafu(display("Failed to build Arrow JSON decoder: {message}"))]
    DecoderBuild { message: String },

    /// Failed to decode JSON.
    #[snafu(display("Failed to decode JSON in {path}: {message}"))]
    JsonDecode { path: String, message: String },

    /// Failed to flush batch from decoder.
    #[snafu(display("Failed to flush batch from {path}: {message}"))]
    BatchFlush { path: String, message: String },

    /// A column is missing from a batch.
    #[snafu(display("Column '{column}' not found"))]
    MissingColumn { column: String },

    /// A required column holds a null.
    #[snafu(display("Column '{column}' contains an unexpected null"))]
    NullValue { column: String },

    /// A column does not have the expected Arrow type.
    #[snafu(display("Column '{column}' has type {actual}, expected {expected}"))]
    ColumnType {
        column: String,
        expected: String,
        actual: String,
    },
}

// ============ Parquet Errors ============

/// Errors that can occur during Parquet reading and writing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParquetError {
    /// Failed to write to Parquet.
    #[snafu(display("Failed to write to Parquet: {source}"))]
    Write {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Failed to create Parquet writer.
    #[snafu(display("Failed to create Parquet writer: {source}"))]
    WriterCreate {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Failed to read a Parquet file.
    #[snafu(display("Failed to read Parquet file {path}: {source}"))]
    Read {
        path: String,
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Failed to decode a batch from a Parquet file.
    #[snafu(display("Failed to decode batch from {path}: {source}"))]
    Decode {
        path: String,
        source: deltalake::arrow::error::ArrowError,
    },

    /// Failed to assemble rows into an Arrow batch.
    #[snafu(display("Failed to encode record batch: {source}"))]
    Encode {
        source: deltalake::arrow::error::ArrowError,
    },

    /// Writer unavailable (already closed).
    #[snafu(display("Parquet writer unavailable (already closed)"))]
    WriterUnavailable,

    /// Buffer lock failed.
    #[snafu(display("Failed to lock Parquet buffer"))]
    BufferLock,

    /// Buffer still in use.
    #[snafu(display("Parquet buffer still in use by another task"))]
    BufferInUse,
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Errors ============

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Session could not be established.
    #[snafu(display("Session error: {source}"))]
    Session { source: SessionError },

    /// Storage error while reading a dataset.
    #[snafu(display("Failed to read {dataset} data: {source}"))]
    DatasetStorage {
        dataset: String,
        source: StorageError,
    },

    /// Reader error while decoding a dataset.
    #[snafu(display("Failed to decode {dataset} data: {source}"))]
    DatasetReader {
        dataset: String,
        source: ReaderError,
    },

    /// A blocking decode task panicked or was cancelled.
    #[snafu(display("Decode task failed: {source}"))]
    TaskJoin { source: tokio::task::JoinError },

    /// No input files matched the dataset glob.
    #[snafu(display("No {dataset} files matched '{glob}'"))]
    NoInputFiles { dataset: String, glob: String },

    /// Failure while writing or reading a table.
    #[snafu(display("Table '{table}' failed: {source}"))]
    Table { table: String, source: TableError },

    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

/// Errors raised by the table writer and table reader.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TableError {
    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    TableStorage { source: StorageError },

    /// Parquet error.
    #[snafu(display("Parquet error: {source}"))]
    TableParquet { source: ParquetError },

    /// Column decoding error.
    #[snafu(display("Column error: {source}"))]
    TableColumn { source: ReaderError },

    /// A table object path could not be built.
    #[snafu(display("Invalid object path '{path}': {source}"))]
    InvalidPath {
        path: String,
        source: object_store::path::Error,
    },

    /// Partition directory value could not be parsed.
    #[snafu(display("Invalid value '{value}' for partition column '{column}' in {path}"))]
    PartitionValue {
        path: String,
        column: String,
        value: String,
    },
}

impl From<StorageError> for TableError {
    fn from(source: StorageError) -> Self {
        TableError::TableStorage { source }
    }
}

impl From<ParquetError> for TableError {
    fn from(source: ParquetError) -> Self {
        TableError::TableParquet { source }
    }
}

impl From<ReaderError> for TableError {
    fn from(source: ReaderError) -> Self {
        TableError::TableColumn { source }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<SessionError> for PipelineError {
    fn from(source: SessionError) -> Self {
        PipelineError::Session { source }
    }
}

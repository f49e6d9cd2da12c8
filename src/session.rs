//! Session bootstrap.
//!
//! A [`Session`] owns the handles every stage works through: the source and
//! destination storage providers plus the reader and writer settings. It is
//! created once per run and fails fast when an object-store location has no
//! credentials configured.

use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{AwsCredentials, Config};
use crate::error::{MissingCredentialsSnafu, OpenStorageSnafu, SessionError};
use crate::sink::parquet::ParquetWriterConfig;
use crate::source::NdjsonReaderConfig;
use crate::storage::{BackendConfig, StorageProvider, StorageProviderRef};

/// Handle shared by all pipeline stages.
#[derive(Debug, Clone)]
pub struct Session {
    pub source: StorageProviderRef,
    pub destination: StorageProviderRef,
    pub reader: NdjsonReaderConfig,
    pub writer: ParquetWriterConfig,
    pub max_concurrent_files: usize,
}

impl Session {
    /// Open source and destination storage for `config`.
    pub async fn connect(config: &Config) -> Result<Self, SessionError> {
        let source = open(&config.input.path, config.aws.as_ref()).await?;
        let destination = open(&config.output.path, config.aws.as_ref()).await?;

        info!(
            "Session ready: source={}, destination={}",
            source.url(),
            destination.url()
        );

        Ok(Self {
            source,
            destination,
            reader: NdjsonReaderConfig::new(config.input.batch_size),
            writer: ParquetWriterConfig::default()
                .with_file_size_mb(config.output.file_size_mb)
                .with_row_group_size_bytes(config.output.row_group_size_bytes)
                .with_compression(config.output.compression),
            max_concurrent_files: config.input.max_concurrent_files.max(1),
        })
    }
}

async fn open(
    url: &str,
    credentials: Option<&AwsCredentials>,
) -> Result<StorageProviderRef, SessionError> {
    let backend = BackendConfig::parse_url(url).context(OpenStorageSnafu { url })?;

    let options = if backend.requires_credentials() {
        let credentials = credentials.context(MissingCredentialsSnafu { url })?;
        credentials.storage_options()
    } else {
        HashMap::new()
    };

    let provider = StorageProvider::for_url_with_options(url, options)
        .await
        .context(OpenStorageSnafu { url })?;
    Ok(Arc::new(provider))
}

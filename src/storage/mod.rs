//! Object storage abstraction.
//!
//! Provides a unified interface over S3 and the local filesystem. All paths
//! passed to and returned from [`StorageProvider`] are relative to the key
//! prefix of the URL it was created for.

mod glob;
mod local;
mod s3;
mod url_parser;

pub use glob::Glob;
pub use local::LocalConfig;
pub use s3::S3Config;
pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over different storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

fn record(operation: StorageOperation, status: RequestStatus, start: Instant) {
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    ///
    /// Options are `object_store` configuration keys (e.g. `aws_access_key_id`)
    /// and only apply to object-store backends.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Canonical URL of the storage root, for logging.
    pub fn url(&self) -> &str {
        &self.canonical_url
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List every object under `prefix` (relative to the storage root).
    ///
    /// Returns paths relative to the storage root, sorted. A prefix that does
    /// not exist yields an empty list.
    pub async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<Path>, StorageError> {
        let full_prefix: Path = match self.config.key() {
            Some(key) => key.parts().chain(Path::from(prefix).parts()).collect(),
            None => Path::from(prefix),
        };
        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        let start = Instant::now();
        let listing: Result<Vec<_>, _> = self
            .object_store
            .list(Some(&full_prefix))
            .try_collect()
            .await;
        let listing = match listing {
            Err(object_store::Error::NotFound { .. }) => Ok(Vec::new()),
            other => other,
        };
        record(
            StorageOperation::List,
            RequestStatus::from_result(&listing),
            start,
        );

        let mut paths: Vec<Path> = listing
            .context(ObjectStoreSnafu)?
            .into_iter()
            .map(|meta| meta.location.parts().skip(key_part_count).collect())
            .collect();
        paths.sort();

        debug!(
            "Listed {} objects under {}/{}",
            paths.len(),
            self.canonical_url,
            prefix
        );
        Ok(paths)
    }

    /// List objects whose relative path matches `glob`, sorted.
    pub async fn list_matching(&self, glob: &Glob) -> Result<Vec<Path>, StorageError> {
        let listed = self.list_with_prefix(glob.literal_prefix()).await?;
        let total = listed.len();
        let matched: Vec<Path> = listed
            .into_iter()
            .filter(|path| glob.is_match(path.as_ref()))
            .collect();

        debug!(
            "Glob '{}' matched {} of {} listed objects",
            glob.pattern(),
            matched.len(),
            total
        );
        Ok(matched)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = match self.object_store.get(&self.qualify_path(path)).await {
            Ok(response) => response.bytes().await,
            Err(e) => Err(e),
        };
        record(
            StorageOperation::Get,
            RequestStatus::from_result(&result),
            start,
        );

        result.context(ObjectStoreSnafu)
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        self.put_payload_with_opts(path, payload, PutOptions::default())
            .await
    }

    /// Put a Parquet file to a path with the correct content type.
    ///
    /// Sets `Content-Type: application/vnd.apache.parquet` on object stores.
    /// Local filesystem doesn't support attributes, so they are skipped.
    pub async fn put_parquet(&self, path: &Path, bytes: Bytes) -> Result<(), StorageError> {
        let payload = PutPayload::from(bytes);
        if matches!(self.config, BackendConfig::Local(_)) {
            return self.put_payload(path, payload).await;
        }

        let opts = PutOptions {
            attributes: Attributes::from_iter([(
                Attribute::ContentType,
                AttributeValue::from("application/vnd.apache.parquet"),
            )]),
            ..Default::default()
        };
        self.put_payload_with_opts(path, payload, opts).await
    }

    async fn put_payload_with_opts(
        &self,
        path: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put_opts(&path, payload, opts).await;
        record(
            StorageOperation::Put,
            RequestStatus::from_result(&result),
            start,
        );

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete a file at the given path.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = match self.object_store.delete(&path).await {
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            other => other,
        };
        record(
            StorageOperation::Delete,
            RequestStatus::from_result(&result),
            start,
        );

        result.context(ObjectStoreSnafu)
    }

    /// Delete every object under `prefix`. Returns the number deleted.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let paths = self.list_with_prefix(prefix).await?;
        for path in &paths {
            self.delete(path).await?;
        }
        Ok(paths.len())
    }
}

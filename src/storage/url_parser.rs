//! URL parsing for storage backends.
//!
//! Extracts backend configuration from S3 URLs (including the `s3a://`
//! scheme used by Hadoop-style tooling) and local filesystem paths.

use object_store::path::Path;
use regex::{Captures, Regex};
use snafu::prelude::*;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, IoSnafu, StorageError};

use super::{LocalConfig, S3Config};

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.*))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?P<protocol>https?)://(?P<endpoint>[^:/]+):(?P<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";
const S3_URL: &str = r"^[sS]3[aAnN]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";
const RELATIVE_PATH: &str = r"^(?P<relative>[^:/][^:]*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

/// Patterns in match order; the first hit wins.
static MATCHERS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    [
        (Backend::S3, S3_PATH),
        (Backend::S3, S3_VIRTUAL),
        (Backend::S3, S3_ENDPOINT_URL),
        (Backend::S3, S3_URL),
        (Backend::Local, FILE_URI),
        (Backend::Local, FILE_URL),
        (Backend::Local, FILE_PATH),
        (Backend::Local, RELATIVE_PATH),
    ]
    .into_iter()
    .map(|(backend, pattern)| (backend, Regex::new(pattern).expect("Invalid URL pattern")))
    .collect()
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    ///
    /// Relative local paths are resolved against the current directory.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let url = url.trim();
        for (backend, regex) in MATCHERS.iter() {
            if let Some(captures) = regex.captures(url) {
                return match backend {
                    Backend::S3 => Ok(Self::parse_s3(&captures)),
                    Backend::Local => Self::parse_local(&captures),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    /// Whether this location needs object-store credentials.
    pub fn requires_credentials(&self) -> bool {
        matches!(self, BackendConfig::S3(_))
    }

    fn parse_s3(captures: &Captures) -> Self {
        let bucket = captures["bucket"].to_string();
        let region = captures.name("region").map(|m| m.as_str().to_string());

        let endpoint = captures.name("endpoint").map(|endpoint| {
            let port = captures
                .name("port")
                .and_then(|p| p.as_str().parse::<u16>().ok())
                .unwrap_or(443);
            let protocol = captures
                .name("protocol")
                .map(|p| p.as_str())
                .unwrap_or("https");
            format!("{protocol}://{}:{port}", endpoint.as_str())
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: normalize_key(captures.name("key").map(|m| m.as_str())),
        })
    }

    fn parse_local(captures: &Captures) -> Result<Self, StorageError> {
        if let Some(relative) = captures.name("relative") {
            let relative = relative.as_str().trim_start_matches("./");
            let cwd = std::env::current_dir().context(IoSnafu)?;
            let absolute = cwd.join(relative).to_string_lossy().into_owned();
            return Ok(Self::local(&absolute));
        }
        Ok(Self::local(&captures["path"]))
    }

    fn local(path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let trimmed = path.trim_end_matches('/');

        BackendConfig::Local(LocalConfig {
            path: if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            },
        })
    }

    /// The key prefix inside the bucket, if any.
    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

fn normalize_key(key: Option<&str>) -> Option<Path> {
    let key = key?.trim_matches('/');
    (!key.is_empty()).then(|| Path::from(key))
}

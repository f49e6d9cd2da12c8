//! NDJSON reader.
//!
//! Decompresses newline-delimited JSON objects and converts them to Arrow
//! RecordBatches using a declared schema. Compression is inferred per file
//! from its extension.

use bytes::Bytes;
use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::arrow::json::ReaderBuilder;
use snafu::prelude::*;
use std::borrow::Cow;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{
    BatchFlushSnafu, DecoderBuildSnafu, GzipDecompressionSnafu, JsonDecodeSnafu, ReaderError,
    ZstdDecompressionSnafu,
};
use crate::metrics::events::FileDecompressionCompleted;

/// Compression of an input object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Infer compression from a file name.
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".gz") {
            Compression::Gzip
        } else if path.ends_with(".zst") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// Configuration for the NDJSON reader.
#[derive(Debug, Clone)]
pub struct NdjsonReaderConfig {
    /// Number of records per batch.
    pub batch_size: usize,
}

impl NdjsonReaderConfig {
    /// Create a new reader configuration.
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

/// Result of reading and parsing a file.
#[derive(Debug)]
pub struct ReadResult {
    /// Parsed record batches.
    pub batches: Vec<RecordBatch>,
    /// Total number of records read.
    pub total_records: usize,
}

/// A reader for NDJSON files that yields Arrow RecordBatches.
pub struct NdjsonReader {
    schema: SchemaRef,
    config: NdjsonReaderConfig,
}

impl NdjsonReader {
    /// Create a new NDJSON reader with the given schema and configuration.
    pub fn new(schema: SchemaRef, config: NdjsonReaderConfig) -> Self {
        Self { schema, config }
    }

    /// Decompress `data` (according to the extension of `path`) and parse it.
    ///
    /// Fields absent from the schema are ignored. Numbers and booleans are
    /// coerced to strings where the schema declares a string column.
    pub fn read(&self, data: Bytes, path: &str) -> Result<ReadResult, ReaderError> {
        let decompress_start = Instant::now();
        let decompressed: Cow<'_, [u8]> = match Compression::from_path(path) {
            Compression::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(&data[..]);
                let mut buf = Vec::new();
                decoder
                    .read_to_end(&mut buf)
                    .context(GzipDecompressionSnafu { path })?;
                Cow::Owned(buf)
            }
            Compression::Zstd => {
                Cow::Owned(zstd::decode_all(&data[..]).context(ZstdDecompressionSnafu { path })?)
            }
            Compression::None => Cow::Borrowed(&data[..]),
        };
        emit!(FileDecompressionCompleted {
            duration: decompress_start.elapsed()
        });

        debug!(
            "Decompressed {} -> {} bytes for {}",
            data.len(),
            decompressed.len(),
            path
        );

        let mut decoder = ReaderBuilder::new(Arc::clone(&self.schema))
            .with_batch_size(self.config.batch_size)
            .with_strict_mode(false)
            .with_coerce_primitive(true)
            .build_decoder()
            .map_err(|e| {
                DecoderBuildSnafu {
                    message: e.to_string(),
                }
                .build()
            })?;

        // decode() stops after batch_size records, so flush after each call
        let mut offset = 0;
        let mut batches = Vec::new();
        let mut total_records = 0;

        loop {
            let consumed = decoder.decode(&decompressed[offset..]).map_err(|e| {
                JsonDecodeSnafu {
                    path,
                    message: e.to_string(),
                }
                .build()
            })?;

            if let Some(batch) = decoder.flush().map_err(|e| {
                BatchFlushSnafu {
                    path,
                    message: e.to_string(),
                }
                .build()
            })? {
                total_records += batch.num_rows();
                batches.push(batch);
            }

            if consumed == 0 {
                break;
            }
            offset += consumed;
        }

        debug!(
            "Parsed {} batches ({} records) from {}",
            batches.len(),
            total_records,
            path
        );

        Ok(ReadResult {
            batches,
            total_records,
        })
    }
}

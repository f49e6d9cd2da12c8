//! Parquet file writer.
//!
//! Writes Arrow RecordBatches to in-memory Parquet files with configurable
//! compression and file rolling based on size. File names are derived from
//! the partition directory and a per-directory sequence number, so the same
//! input always produces the same files.

use bytes::{BufMut, BytesMut};
use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use deltalake::parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

use super::FinishedFile;
use crate::config::{KB, MB, ParquetCompression};
use crate::emit;
use crate::error::{
    BufferInUseSnafu, BufferLockSnafu, ParquetError, WriteSnafu, WriterCreateSnafu,
    WriterUnavailableSnafu,
};
use crate::metrics::events::ParquetWriteCompleted;

const INITIAL_BUFFER_CAPACITY: usize = 64 * KB;

/// Statistics for the file currently being written.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterStats {
    /// Bytes flushed to the buffer (compressed).
    pub bytes_written: usize,
    /// Records written.
    pub records_written: usize,
}

/// A buffer with interior mutability for the ArrowWriter.
#[derive(Clone)]
struct SharedBuffer {
    buffer: Arc<Mutex<bytes::buf::Writer<BytesMut>>>,
}

impl SharedBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(BytesMut::with_capacity(capacity).writer())),
        }
    }

    fn into_inner(self) -> Result<BytesMut, ParquetError> {
        let mutex = Arc::into_inner(self.buffer).context(BufferInUseSnafu)?;
        let writer = mutex.into_inner().map_err(|_| BufferLockSnafu.build())?;
        Ok(writer.into_inner())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.try_lock().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "buffer lock contention")
        })?;
        Write::write(&mut *buffer, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Configuration for the Parquet writer.
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    /// Roll to a new file once the current one reaches this many bytes.
    pub target_file_size: usize,
    /// Row groups are flushed when in_progress_size exceeds this threshold.
    pub row_group_size_bytes: usize,
    /// Compression codec.
    pub compression: ParquetCompression,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            target_file_size: 128 * MB,
            row_group_size_bytes: 128 * MB,
            compression: ParquetCompression::Snappy,
        }
    }
}

impl ParquetWriterConfig {
    /// Set the target file size in MB.
    pub fn with_file_size_mb(mut self, size_mb: usize) -> Self {
        self.target_file_size = size_mb * MB;
        self
    }

    /// Set the target file size in bytes.
    pub fn with_target_file_size(mut self, size_bytes: usize) -> Self {
        self.target_file_size = size_bytes;
        self
    }

    /// Set the compression codec.
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the row group size in bytes.
    pub fn with_row_group_size_bytes(mut self, size_bytes: usize) -> Self {
        self.row_group_size_bytes = size_bytes;
        self
    }
}

/// Parquet file writer that buffers batches and produces finished files.
pub struct ParquetWriter {
    schema: SchemaRef,
    config: ParquetWriterConfig,
    writer: Option<ArrowWriter<SharedBuffer>>,
    buffer: SharedBuffer,
    stats: WriterStats,
    finished_files: Vec<FinishedFile>,
    /// Partition directory of the current file, empty when unpartitioned.
    partition_dir: String,
    /// Sequence number of the current file within `partition_dir`.
    file_index: usize,
}

impl ParquetWriter {
    /// Create a new Parquet writer.
    pub fn new(schema: SchemaRef, config: ParquetWriterConfig) -> Result<Self, ParquetError> {
        debug!(
            "Creating ParquetWriter: target_file_size={} bytes, row_group_size_bytes={}, compression={:?}",
            config.target_file_size, config.row_group_size_bytes, config.compression
        );
        let buffer = SharedBuffer::new(INITIAL_BUFFER_CAPACITY);
        let writer = Self::create_writer(&schema, &config, buffer.clone())?;

        Ok(Self {
            schema,
            config,
            writer: Some(writer),
            buffer,
            stats: WriterStats::default(),
            finished_files: Vec::new(),
            partition_dir: String::new(),
            file_index: 0,
        })
    }

    fn create_writer(
        schema: &SchemaRef,
        config: &ParquetWriterConfig,
        buffer: SharedBuffer,
    ) -> Result<ArrowWriter<SharedBuffer>, ParquetError> {
        let writer_properties = Self::writer_properties(config);

        ArrowWriter::try_new(buffer, schema.clone(), Some(writer_properties))
            .context(WriterCreateSnafu)
    }

    fn writer_properties(config: &ParquetWriterConfig) -> WriterProperties {
        let compression = match config.compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        };

        WriterProperties::builder()
            .set_compression(compression)
            .build()
    }

    /// File name of the current file, relative to the table root.
    fn current_filename(&self) -> String {
        let name = format!("part-{:05}.parquet", self.file_index);
        if self.partition_dir.is_empty() {
            name
        } else {
            format!("{}/{}", self.partition_dir, name)
        }
    }

    /// Direct subsequent rows to the given partition directory.
    ///
    /// When the directory changes, the current file is rolled and numbering
    /// restarts at `part-00000`.
    pub fn set_partition_dir(&mut self, partition_dir: String) -> Result<(), ParquetError> {
        if partition_dir == self.partition_dir {
            return Ok(());
        }
        if self.stats.records_written > 0 {
            self.roll_file()?;
        }
        self.partition_dir = partition_dir;
        self.file_index = 0;
        Ok(())
    }

    /// Write a batch to the current file.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), ParquetError> {
        let writer = self.writer.as_mut().context(WriterUnavailableSnafu)?;

        writer.write(batch).context(WriteSnafu)?;
        self.stats.records_written += batch.num_rows();

        if writer.in_progress_size() > self.config.row_group_size_bytes {
            writer.flush().context(WriteSnafu)?;
            self.stats.bytes_written = writer.bytes_written();
            debug!(
                "Flushed row group for {}: buffer={} bytes, records={}",
                self.current_filename(),
                self.stats.bytes_written,
                self.stats.records_written
            );
        }

        let current_size = self.current_file_size();
        if current_size >= self.config.target_file_size {
            debug!(
                "Rolling {} at {} bytes ({} records)",
                self.current_filename(),
                current_size,
                self.stats.records_written
            );
            self.roll_file()?;
            self.file_index += 1;
        }

        Ok(())
    }

    /// Close the current writer and record it as a finished file.
    fn finish_current(&mut self) -> Result<(), ParquetError> {
        let start = Instant::now();
        let writer = self.writer.take().context(WriterUnavailableSnafu)?;
        writer.close().context(WriteSnafu)?;

        let bytes = std::mem::replace(
            &mut self.buffer,
            SharedBuffer::new(INITIAL_BUFFER_CAPACITY),
        )
        .into_inner()?
        .freeze();

        emit!(ParquetWriteCompleted {
            duration: start.elapsed()
        });

        self.finished_files.push(FinishedFile {
            filename: self.current_filename(),
            size: bytes.len(),
            record_count: self.stats.records_written,
            bytes,
        });
        self.stats = WriterStats::default();
        Ok(())
    }

    /// Roll the current file and start a new one.
    fn roll_file(&mut self) -> Result<(), ParquetError> {
        self.finish_current()?;
        self.writer = Some(Self::create_writer(
            &self.schema,
            &self.config,
            self.buffer.clone(),
        )?);
        Ok(())
    }

    /// Close the current file and get all finished files not yet taken.
    pub fn close(mut self) -> Result<Vec<FinishedFile>, ParquetError> {
        if self.stats.records_written > 0 {
            self.finish_current()?;
        }
        Ok(self.finished_files)
    }

    /// Take finished files without closing.
    pub fn take_finished_files(&mut self) -> Vec<FinishedFile> {
        std::mem::take(&mut self.finished_files)
    }

    /// Get the current file size in bytes (including in-progress data).
    ///
    /// Counts bytes the Parquet writer has emitted, whether or not they have
    /// reached the buffer yet.
    pub fn current_file_size(&self) -> usize {
        self.writer
            .as_ref()
            .map(|w| w.bytes_written() + w.in_progress_size())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use deltalake::arrow::array::{Int64Array, StringArray};
    use deltalake::arrow::datatypes::{DataType, Field, Schema};
    use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn test_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("value", DataType::Int64, true),
        ]))
    }

    fn test_batch(num_rows: usize) -> RecordBatch {
        let ids: Vec<String> = (0..num_rows).map(|i| format!("id_{}", i)).collect();
        let values: Vec<i64> = (0..num_rows).map(|i| i as i64).collect();

        RecordBatch::try_new(
            test_schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(Int64Array::from(values)),
            ],
        )
        .unwrap()
    }

    fn row_count(bytes: &Bytes) -> usize {
        ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
            .unwrap()
            .build()
            .unwrap()
            .map(|batch| batch.unwrap().num_rows())
            .sum()
    }

    #[test]
    fn test_single_file_unpartitioned() {
        let mut writer = ParquetWriter::new(test_schema(), ParquetWriterConfig::default()).unwrap();
        writer.write_batch(&test_batch(100)).unwrap();
        assert!(writer.current_file_size() > 0);

        let files = writer.close().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "part-00000.parquet");
        assert_eq!(files[0].record_count, 100);
        assert_eq!(row_count(&files[0].bytes), 100);
    }

    #[test]
    fn test_partition_change_rolls_and_restarts_numbering() {
        let mut writer = ParquetWriter::new(test_schema(), ParquetWriterConfig::default()).unwrap();

        writer.set_partition_dir("year=2018/month=11".to_string()).unwrap();
        writer.write_batch(&test_batch(10)).unwrap();
        writer.set_partition_dir("year=2018/month=12".to_string()).unwrap();
        writer.write_batch(&test_batch(5)).unwrap();

        let files = writer.close().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "year=2018/month=11/part-00000.parquet",
                "year=2018/month=12/part-00000.parquet",
            ]
        );
        assert_eq!(files[1].record_count, 5);
    }

    #[test]
    fn test_size_limit_rolls_files() {
        let config = ParquetWriterConfig::default()
            .with_target_file_size(1)
            .with_row_group_size_bytes(1)
            .with_compression(ParquetCompression::Uncompressed);
        let mut writer = ParquetWriter::new(test_schema(), config).unwrap();

        writer.write_batch(&test_batch(10)).unwrap();
        writer.write_batch(&test_batch(10)).unwrap();

        let files = writer.close().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["part-00000.parquet", "part-00001.parquet"]);
        assert!(files.iter().all(|f| row_count(&f.bytes) == 10));
    }

    #[test]
    fn test_current_file_size_counts_flushed_row_groups() {
        let config = ParquetWriterConfig::default()
            .with_row_group_size_bytes(1)
            .with_compression(ParquetCompression::Uncompressed);
        let mut writer = ParquetWriter::new(test_schema(), config).unwrap();
        assert_eq!(writer.current_file_size(), 0);

        writer.write_batch(&test_batch(10)).unwrap();
        let after_one = writer.current_file_size();
        assert!(after_one > 0);

        writer.write_batch(&test_batch(10)).unwrap();
        assert!(writer.current_file_size() > after_one);
    }

    #[test]
    fn test_rolls_across_partitions() {
        let config = ParquetWriterConfig::default()
            .with_target_file_size(1)
            .with_compression(ParquetCompression::Uncompressed);
        let mut writer = ParquetWriter::new(test_schema(), config).unwrap();

        for dir in ["month=1", "month=2"] {
            writer.set_partition_dir(dir.to_string()).unwrap();
            writer.write_batch(&test_batch(3)).unwrap();
            writer.write_batch(&test_batch(3)).unwrap();
        }

        let files = writer.close().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "month=1/part-00000.parquet",
                "month=1/part-00001.parquet",
                "month=2/part-00000.parquet",
                "month=2/part-00001.parquet",
            ]
        );
    }

    #[test]
    fn test_identical_input_gives_identical_bytes() {
        let write = || {
            let mut writer =
                ParquetWriter::new(test_schema(), ParquetWriterConfig::default()).unwrap();
            writer.write_batch(&test_batch(50)).unwrap();
            writer.close().unwrap().remove(0).bytes
        };
        assert_eq!(write(), write());
    }

    #[test]
    fn test_every_codec_writes() {
        for compression in [
            ParquetCompression::Uncompressed,
            ParquetCompression::Snappy,
            ParquetCompression::Gzip,
            ParquetCompression::Zstd,
            ParquetCompression::Lz4,
        ] {
            let config = ParquetWriterConfig::default().with_compression(compression);
            let mut writer = ParquetWriter::new(test_schema(), config).unwrap();
            writer.write_batch(&test_batch(20)).unwrap();
            let files = writer.close().unwrap();
            assert_eq!(row_count(&files[0].bytes), 20, "{compression:?}");
        }
    }

    #[test]
    fn test_empty_writer_produces_no_files() {
        let writer = ParquetWriter::new(test_schema(), ParquetWriterConfig::default()).unwrap();
        assert!(writer.close().unwrap().is_empty());
    }
}

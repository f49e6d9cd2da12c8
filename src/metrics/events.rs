//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the job. Events
//! implement the `InternalEvent` trait which records the corresponding metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Input events
// ============================================================================

/// Event emitted when an input object has been downloaded.
pub struct InputFileRead {
    pub dataset: &'static str,
    pub bytes: u64,
}

impl InternalEvent for InputFileRead {
    fn emit(self) {
        trace!(dataset = self.dataset, bytes = self.bytes, "Input file read");
        counter!("sparkify_input_files_read_total", "dataset" => self.dataset).increment(1);
        counter!("sparkify_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted when raw records are decoded from an input dataset.
pub struct RecordsRead {
    pub dataset: &'static str,
    pub count: u64,
}

impl InternalEvent for RecordsRead {
    fn emit(self) {
        trace!(dataset = self.dataset, count = self.count, "Records read");
        counter!("sparkify_records_read_total", "dataset" => self.dataset).increment(self.count);
    }
}

/// Event emitted when a file has been decompressed.
pub struct FileDecompressionCompleted {
    pub duration: Duration,
}

impl InternalEvent for FileDecompressionCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "File decompression completed"
        );
        histogram!("sparkify_file_decompression_duration_seconds")
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Output events
// ============================================================================

/// Event emitted when rows have been written to a table.
pub struct RowsWritten {
    pub table: &'static str,
    pub count: u64,
}

impl InternalEvent for RowsWritten {
    fn emit(self) {
        trace!(table = self.table, count = self.count, "Rows written");
        counter!("sparkify_rows_written_total", "table" => self.table).increment(self.count);
    }
}

/// Event emitted when a Parquet file has been uploaded.
pub struct ParquetFileWritten {
    pub table: &'static str,
    pub bytes: u64,
}

impl InternalEvent for ParquetFileWritten {
    fn emit(self) {
        trace!(table = self.table, bytes = self.bytes, "Parquet file written");
        counter!("sparkify_parquet_files_written_total", "table" => self.table).increment(1);
        counter!("sparkify_bytes_written_total", "table" => self.table).increment(self.bytes);
    }
}

/// Event emitted when a Parquet file has been closed and encoded.
pub struct ParquetWriteCompleted {
    pub duration: Duration,
}

impl InternalEvent for ParquetWriteCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Parquet write completed"
        );
        histogram!("sparkify_parquet_write_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a pipeline stage finishes.
pub struct StageCompleted {
    pub stage: &'static str,
    pub duration: Duration,
}

impl InternalEvent for StageCompleted {
    fn emit(self) {
        trace!(
            stage = self.stage,
            duration_ms = self.duration.as_millis(),
            "Stage completed"
        );
        histogram!("sparkify_stage_duration_seconds", "stage" => self.stage)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage events
// ============================================================================

/// Type of storage operation.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
    Delete,
}

impl StorageOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
            StorageOperation::Delete => "delete",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "sparkify_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "sparkify_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

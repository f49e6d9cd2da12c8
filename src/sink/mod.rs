//! Output side: Parquet encoding and table layout on the destination.

pub mod parquet;
pub mod table;

pub use parquet::{ParquetWriter, ParquetWriterConfig};
pub use table::{SUCCESS_MARKER, TableWriteStats, TableWriter, read_rows, read_table, table_root};

/// A completed Parquet file held in memory.
#[derive(Debug, Clone)]
pub struct FinishedFile {
    /// Path relative to the table root, including any partition directories.
    pub filename: String,
    /// The size of the file in bytes.
    pub size: usize,
    /// Number of records in the file.
    pub record_count: usize,
    /// Encoded file contents.
    pub bytes: bytes::Bytes,
}

//! Table-level writes and reads.
//!
//! A table lives under `<table>/<table>.parquet/` on the destination. Writes
//! replace everything under that directory, group rows into Hive partition
//! directories, and finish with a `_SUCCESS` marker. Reads re-attach the
//! partition columns from the directory names.

use deltalake::arrow::array::{ArrayRef, Int32Array, Int64Array, RecordBatch, StringArray};
use deltalake::arrow::datatypes::{DataType, Schema, SchemaRef};
use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::FinishedFile;
use super::parquet::{ParquetWriter, ParquetWriterConfig};
use crate::emit;
use crate::error::{
    DecodeSnafu, EncodeSnafu, InvalidPathSnafu, MissingColumnSnafu, ParquetError,
    PartitionValueSnafu, ReadSnafu, TableError,
};
use crate::metrics::events::{ParquetFileWritten, RowsWritten};
use crate::model::TableRow;
use crate::partition::{PartitionExtractor, partition_dir};
use crate::storage::StorageProviderRef;

/// Marker written after every data file of a table.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Rows encoded per Arrow batch when writing.
const WRITE_BATCH_ROWS: usize = 8192;

/// Directory of `table`, relative to the destination root.
pub fn table_root(table: &str) -> String {
    format!("{table}/{table}.parquet")
}

/// Outcome of writing one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableWriteStats {
    pub rows: usize,
    pub files: usize,
    pub bytes: usize,
    pub partitions: usize,
}

/// Writes [`TableRow`]s to the destination with overwrite semantics.
#[derive(Debug, Clone)]
pub struct TableWriter {
    storage: StorageProviderRef,
    config: ParquetWriterConfig,
}

impl TableWriter {
    pub fn new(storage: StorageProviderRef, config: ParquetWriterConfig) -> Self {
        Self { storage, config }
    }

    /// Replace the contents of `R`'s table with `rows`, in the given order.
    pub async fn write<R: TableRow>(&self, rows: &[R]) -> Result<TableWriteStats, TableError> {
        let root = table_root(R::NAME);
        let deleted = self.storage.delete_prefix(&root).await?;
        if deleted > 0 {
            debug!("Removed {} existing objects under {}", deleted, root);
        }

        let partition_columns = R::partition_columns();
        let file_columns = file_column_indices::<R>();
        let file_schema = Arc::new(file_schema::<R>()?);

        let mut groups: BTreeMap<Vec<Option<String>>, Vec<&R>> = BTreeMap::new();
        for row in rows {
            let values = row
                .partition_values()
                .into_iter()
                .map(|value| value.filter(|v| !v.is_empty()))
                .collect();
            groups.entry(values).or_default().push(row);
        }

        let mut stats = TableWriteStats {
            rows: rows.len(),
            partitions: groups.len(),
            ..Default::default()
        };
        let mut writer = ParquetWriter::new(file_schema, self.config.clone())?;

        for (values, group) in &groups {
            writer.set_partition_dir(partition_dir(partition_columns, values))?;
            for chunk in group.chunks(WRITE_BATCH_ROWS) {
                let batch = R::to_batch(chunk)
                    .and_then(|batch| batch.project(&file_columns))
                    .context(EncodeSnafu)?;
                writer.write_batch(&batch)?;
            }
            self.upload::<R>(&root, writer.take_finished_files(), &mut stats)
                .await?;
        }
        self.upload::<R>(&root, writer.close()?, &mut stats).await?;

        self.storage
            .put_payload(&object_path(&format!("{root}/{SUCCESS_MARKER}"))?, PutPayload::new())
            .await?;

        emit!(RowsWritten {
            table: R::NAME,
            count: stats.rows as u64,
        });
        info!(
            "Wrote table {}: {} rows in {} files across {} partitions ({} bytes)",
            R::NAME,
            stats.rows,
            stats.files,
            stats.partitions,
            stats.bytes
        );

        Ok(stats)
    }

    async fn upload<R: TableRow>(
        &self,
        root: &str,
        files: Vec<FinishedFile>,
        stats: &mut TableWriteStats,
    ) -> Result<(), TableError> {
        for file in files {
            let path = object_path(&format!("{root}/{}", file.filename))?;
            self.storage.put_parquet(&path, file.bytes).await?;

            emit!(ParquetFileWritten {
                table: R::NAME,
                bytes: file.size as u64,
            });
            debug!(
                "Uploaded {} ({} records, {} bytes)",
                path, file.record_count, file.size
            );
            stats.files += 1;
            stats.bytes += file.size;
        }
        Ok(())
    }
}

fn object_path(path: &str) -> Result<Path, TableError> {
    Path::parse(path).context(InvalidPathSnafu { path })
}

/// Read every data file of `R`'s table as batches over [`TableRow::schema`].
///
/// Files are read in path order. A table that was never written reads as
/// empty.
pub async fn read_table<R: TableRow>(
    storage: &StorageProviderRef,
) -> Result<Vec<RecordBatch>, TableError> {
    let root = table_root(R::NAME);
    let schema = R::schema();
    let extractor = PartitionExtractor::new(
        R::partition_columns()
            .iter()
            .map(|c| c.to_string())
            .collect(),
    );

    let mut batches = Vec::new();
    for location in storage.list_with_prefix(&root).await? {
        let path = location.to_string();
        if !path.ends_with(".parquet") {
            continue;
        }

        let bytes = storage.get(&location).await?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .and_then(|builder| builder.build())
            .context(ReadSnafu { path: path.as_str() })?;

        let partition_values = extractor.extract(&path);
        for batch in reader {
            let batch = batch.context(DecodeSnafu { path: path.as_str() })?;
            batches.push(attach_partitions(
                &schema,
                &batch,
                R::partition_columns(),
                |column| partition_values.get(column).cloned().flatten(),
                &path,
            )?);
        }
    }

    debug!("Read {} batches from {}", batches.len(), root);
    Ok(batches)
}

/// Read `R`'s table back as typed rows.
pub async fn read_rows<R: TableRow>(storage: &StorageProviderRef) -> Result<Vec<R>, TableError> {
    let mut rows = Vec::new();
    for batch in read_table::<R>(storage).await? {
        rows.extend(R::from_batch(&batch)?);
    }
    Ok(rows)
}

fn attach_partitions<F>(
    schema: &SchemaRef,
    batch: &RecordBatch,
    partition_columns: &[&str],
    value_of: F,
    path: &str,
) -> Result<RecordBatch, TableError>
where
    F: Fn(&str) -> Option<String>,
{
    let num_rows = batch.num_rows();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        let name = field.name().as_str();
        if partition_columns.contains(&name) {
            columns.push(partition_array(
                field.data_type(),
                name,
                value_of(name),
                num_rows,
                path,
            )?);
        } else {
            let column = batch
                .column_by_name(name)
                .context(MissingColumnSnafu { column: name })?;
            columns.push(Arc::clone(column));
        }
    }

    Ok(RecordBatch::try_new(Arc::clone(schema), columns).context(EncodeSnafu)?)
}

fn partition_array(
    data_type: &DataType,
    column: &str,
    value: Option<String>,
    num_rows: usize,
    path: &str,
) -> Result<ArrayRef, TableError> {
    let invalid = |value: &str| {
        PartitionValueSnafu {
            path,
            column,
            value,
        }
        .build()
    };

    Ok(match data_type {
        DataType::Int64 => {
            let parsed = value
                .as_deref()
                .map(|v| v.parse::<i64>().map_err(|_| invalid(v)))
                .transpose()?;
            Arc::new(Int64Array::from(vec![parsed; num_rows]))
        }
        DataType::Int32 => {
            let parsed = value
                .as_deref()
                .map(|v| v.parse::<i32>().map_err(|_| invalid(v)))
                .transpose()?;
            Arc::new(Int32Array::from(vec![parsed; num_rows]))
        }
        DataType::Utf8 => Arc::new(StringArray::from(vec![value.as_deref(); num_rows])),
        other => return Err(invalid(&format!("<unsupported type {other}>"))),
    })
}

fn file_column_indices<R: TableRow>() -> Vec<usize> {
    let partition_columns = R::partition_columns();
    R::schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| !partition_columns.contains(&field.name().as_str()))
        .map(|(idx, _)| idx)
        .collect()
}

/// Schema of the files of a table: its schema minus the partition columns.
pub fn file_schema<R: TableRow>() -> Result<Schema, ParquetError> {
    R::schema()
        .project(&file_column_indices::<R>())
        .context(EncodeSnafu)
}

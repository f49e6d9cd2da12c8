//! Input datasets.
//!
//! Lists the objects matching a dataset glob, downloads them with bounded
//! concurrency and decodes each into Arrow batches on the blocking pool.

pub mod reader;
pub mod schema;

pub use reader::{Compression, NdjsonReader, NdjsonReaderConfig};
pub use schema::{event_schema, song_schema};

use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

use crate::emit;
use crate::error::{
    DatasetReaderSnafu, DatasetStorageSnafu, NoInputFilesSnafu, PipelineError, TaskJoinSnafu,
};
use crate::metrics::events::{InputFileRead, RecordsRead};
use crate::storage::{Glob, StorageProviderRef};

/// A decoded input dataset.
#[derive(Debug)]
pub struct LoadedDataset {
    pub batches: Vec<RecordBatch>,
    pub files: usize,
    pub records: usize,
}

/// Resolve `glob` against `storage`, failing when nothing matches.
pub async fn resolve_files(
    storage: &StorageProviderRef,
    dataset: &'static str,
    glob: &str,
) -> Result<Vec<Path>, PipelineError> {
    let compiled = Glob::new(glob).context(DatasetStorageSnafu { dataset })?;
    let files = storage
        .list_matching(&compiled)
        .await
        .context(DatasetStorageSnafu { dataset })?;
    ensure!(!files.is_empty(), NoInputFilesSnafu { dataset, glob });
    Ok(files)
}

/// Download and decode every file matching `glob`.
///
/// Batches are returned in sorted path order regardless of which download
/// finishes first.
pub async fn load_dataset(
    storage: &StorageProviderRef,
    dataset: &'static str,
    glob: &str,
    schema: SchemaRef,
    config: &NdjsonReaderConfig,
    max_concurrent_files: usize,
) -> Result<LoadedDataset, PipelineError> {
    let files = resolve_files(storage, dataset, glob).await?;
    info!(
        "Reading {} {} files from {}/{}",
        files.len(),
        dataset,
        storage.url(),
        glob
    );
    debug!("{} schema:\n{}", dataset, schema::describe(&schema));

    let file_count = files.len();
    let reader = Arc::new(NdjsonReader::new(schema, config.clone()));

    let results: Vec<Vec<RecordBatch>> = futures::stream::iter(files)
        .map(|path| {
            let storage = Arc::clone(storage);
            let reader = Arc::clone(&reader);
            async move {
                let data = storage
                    .get(&path)
                    .await
                    .context(DatasetStorageSnafu { dataset })?;
                emit!(InputFileRead {
                    dataset,
                    bytes: data.len() as u64,
                });

                let path = path.to_string();
                let result = tokio::task::spawn_blocking(move || reader.read(data, &path))
                    .await
                    .context(TaskJoinSnafu)?
                    .context(DatasetReaderSnafu { dataset })?;
                Ok::<_, PipelineError>(result.batches)
            }
        })
        .buffered(max_concurrent_files.max(1))
        .try_collect()
        .await?;

    let batches: Vec<RecordBatch> = results.into_iter().flatten().collect();
    let records = batches.iter().map(RecordBatch::num_rows).sum();
    emit!(RecordsRead {
        dataset,
        count: records as u64,
    });
    info!(
        "Decoded {} {} records from {} files",
        records, dataset, file_count
    );

    Ok(LoadedDataset {
        batches,
        files: file_count,
        records,
    })
}

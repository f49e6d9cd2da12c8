//! Batch pipeline driver.
//!
//! Runs the stages in a fixed order against one [`Session`]:
//!
//! 1. **Songs/artists**: decode the song dataset, write `songs` and `artists`.
//! 2. **Users/time**: decode the log dataset, keep `NextSong` events, write
//!    `users` and `time`.
//! 3. **Songplays**: read `songs` back from the destination, join the events
//!    to it on title, write `songplays`.
//!
//! Any failure aborts the run. Tables written by earlier stages stay in place.

pub mod tables;

use object_store::path::Path;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{Config, InputConfig};
use crate::emit;
use crate::error::{DatasetReaderSnafu, PipelineError, TableSnafu};
use crate::metrics::events::StageCompleted;
use crate::model::{
    ArtistRow, EventRecord, SongRecord, SongRow, SongplayRow, TableRow, TimeRow, UserRow,
};
use crate::session::Session;
use crate::sink::{TableWriteStats, TableWriter, read_rows, table_root};
use crate::source::{event_schema, load_dataset, resolve_files, song_schema};
use crate::transform::Dataset;

const SONG_DATASET: &str = "song";
const LOG_DATASET: &str = "log";

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub song_files: usize,
    pub song_records: usize,
    pub log_files: usize,
    pub log_records: usize,
    /// Events left after the `NextSong` filter.
    pub song_play_events: usize,
    /// Write outcome per table, keyed by table name.
    pub tables: BTreeMap<&'static str, TableWriteStats>,
}

impl PipelineStats {
    pub fn table(&self, name: &str) -> Option<&TableWriteStats> {
        self.tables.get(name)
    }

    pub fn files_written(&self) -> usize {
        self.tables.values().map(|t| t.files).sum()
    }

    pub fn bytes_written(&self) -> usize {
        self.tables.values().map(|t| t.bytes).sum()
    }
}

/// What a run would read and write, without touching the destination.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub song_files: Vec<Path>,
    pub log_files: Vec<Path>,
    /// Destination directory of every table, in write order.
    pub tables: Vec<String>,
}

/// The pipeline and its accumulated statistics.
pub struct Pipeline {
    session: Session,
    input: InputConfig,
    writer: TableWriter,
    stats: PipelineStats,
}

impl Pipeline {
    /// Connect to source and destination storage.
    pub async fn new(config: Config) -> Result<Self, PipelineError> {
        let session = Session::connect(&config).await?;
        let writer = TableWriter::new(session.destination.clone(), session.writer.clone());

        Ok(Self {
            session,
            input: config.input,
            writer,
            stats: PipelineStats::default(),
        })
    }

    /// Run every stage in order.
    pub async fn run(mut self) -> Result<PipelineStats, PipelineError> {
        info!("Starting pipeline");
        let started = Instant::now();

        self.process_song_data().await?;
        let events = self.process_log_data().await?;
        self.process_songplays(&events).await?;

        info!(
            "Pipeline completed in {:.1}s: {} files, {} bytes written",
            started.elapsed().as_secs_f64(),
            self.stats.files_written(),
            self.stats.bytes_written()
        );
        Ok(self.stats)
    }

    /// Build and write the `songs` and `artists` tables.
    async fn process_song_data(&mut self) -> Result<(), PipelineError> {
        let started = Instant::now();
        let loaded = load_dataset(
            &self.session.source,
            SONG_DATASET,
            &self.input.song_glob,
            song_schema(),
            &self.session.reader,
            self.session.max_concurrent_files,
        )
        .await?;
        self.stats.song_files = loaded.files;
        self.stats.song_records = loaded.records;

        let records = tables::decode_batches(&loaded.batches, SongRecord::from_batch)
            .context(DatasetReaderSnafu {
                dataset: SONG_DATASET,
            })?;
        drop(loaded);

        let songs = tables::songs_table(&records);
        self.write_table(&songs).await?;
        let artists = tables::artists_table(&records);
        self.write_table(&artists).await?;

        emit!(StageCompleted {
            stage: "songs_artists",
            duration: started.elapsed(),
        });
        Ok(())
    }

    /// Build and write the `users` and `time` tables.
    ///
    /// Returns the `NextSong` events for the songplays stage.
    async fn process_log_data(&mut self) -> Result<Dataset<EventRecord>, PipelineError> {
        let started = Instant::now();
        let loaded = load_dataset(
            &self.session.source,
            LOG_DATASET,
            &self.input.log_glob,
            event_schema(),
            &self.session.reader,
            self.session.max_concurrent_files,
        )
        .await?;
        self.stats.log_files = loaded.files;
        self.stats.log_records = loaded.records;

        let events = tables::decode_batches(&loaded.batches, EventRecord::from_batch)
            .context(DatasetReaderSnafu {
                dataset: LOG_DATASET,
            })?;
        drop(loaded);

        let events = tables::song_play_events(events);
        self.stats.song_play_events = events.len();
        debug!(
            "{} of {} events are song plays",
            events.len(),
            self.stats.log_records
        );

        let users = tables::users_table(&events);
        self.write_table(&users).await?;
        let time = tables::time_table(&events);
        self.write_table(&time).await?;

        emit!(StageCompleted {
            stage: "users_time",
            duration: started.elapsed(),
        });
        Ok(events)
    }

    /// Build and write the `songplays` table from the stored `songs` table.
    async fn process_songplays(&mut self, events: &Dataset<EventRecord>) -> Result<(), PipelineError> {
        let started = Instant::now();
        let songs: Dataset<SongRow> = read_rows::<SongRow>(&self.session.destination)
            .await
            .context(TableSnafu {
                table: SongRow::NAME,
            })?
            .into_iter()
            .collect();
        debug!("Read back {} songs rows", songs.len());

        let songplays = tables::songplays_table(events, &songs);
        self.write_table(&songplays).await?;

        emit!(StageCompleted {
            stage: "songplays",
            duration: started.elapsed(),
        });
        Ok(())
    }

    async fn write_table<R: TableRow>(&mut self, rows: &Dataset<R>) -> Result<(), PipelineError> {
        let stats = self
            .writer
            .write(rows.rows())
            .await
            .context(TableSnafu { table: R::NAME })?;
        self.stats.tables.insert(R::NAME, stats);
        Ok(())
    }
}

/// Run the pipeline with the given configuration.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats, PipelineError> {
    Pipeline::new(config).await?.run().await
}

/// Resolve the input file lists and table locations for `config`.
pub async fn plan(config: &Config) -> Result<RunPlan, PipelineError> {
    let session = Session::connect(config).await?;
    let song_files = resolve_files(&session.source, SONG_DATASET, &config.input.song_glob).await?;
    let log_files = resolve_files(&session.source, LOG_DATASET, &config.input.log_glob).await?;

    let root = session.destination.url().trim_end_matches('/');
    let tables = [
        SongRow::NAME,
        ArtistRow::NAME,
        UserRow::NAME,
        TimeRow::NAME,
        SongplayRow::NAME,
    ]
    .iter()
    .map(|name| format!("{root}/{}", table_root(name)))
    .collect();

    Ok(RunPlan {
        song_files,
        log_files,
        tables,
    })
}

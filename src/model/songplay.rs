//! The songplays fact table.

use chrono::Datelike;
use deltalake::arrow::array::{ArrayRef, Int32Array, Int64Array, RecordBatch, StringArray, TimestampMillisecondArray};
use deltalake::arrow::datatypes::{
    DataType, Field, Int32Type, Int64Type, Schema, SchemaRef, TimestampMillisecondType,
};
use deltalake::arrow::error::ArrowError;
use std::sync::{Arc, LazyLock};

use super::columns::{opt_string, opt_value, primitives, strings};
use super::event::start_time_type;
use super::{EventRecord, SongRow, TableRow};
use crate::error::ReaderError;

/// One song play: an event joined to the song whose title it names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SongplayRow {
    /// Epoch milliseconds.
    pub start_time: Option<i64>,
    pub user_id: Option<String>,
    pub level: Option<String>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub year: Option<i32>,
    pub month: Option<i32>,
}

impl SongplayRow {
    pub fn from_match(event: &EventRecord, song: &SongRow) -> Self {
        let start_time = event.start_time();
        SongplayRow {
            start_time: start_time.map(|t| t.timestamp_millis()),
            user_id: event.user_id.clone(),
            level: event.level.clone(),
            song_id: Some(song.song_id.clone()),
            artist_id: song.artist_id.clone(),
            session_id: event.session_id,
            location: event.location.clone(),
            user_agent: event.user_agent.clone(),
            year: start_time.map(|t| t.year()),
            month: start_time.map(|t| t.month() as i32),
        }
    }
}

static SONGPLAYS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("start_time", start_time_type(), true),
        Field::new("userId", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("year", DataType::Int32, true),
        Field::new("month", DataType::Int32, true),
    ]))
});

impl TableRow for SongplayRow {
    const NAME: &'static str = "songplays";

    fn schema() -> SchemaRef {
        Arc::clone(&SONGPLAYS_SCHEMA)
    }

    fn partition_columns() -> &'static [&'static str] {
        &["year", "month"]
    }

    fn partition_values(&self) -> Vec<Option<String>> {
        vec![
            self.year.map(|y| y.to_string()),
            self.month.map(|m| m.to_string()),
        ]
    }

    fn to_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        let string_column = |f: fn(&SongplayRow) -> Option<&str>| -> ArrayRef {
            Arc::new(StringArray::from_iter(rows.iter().map(|r| f(r))))
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(
                TimestampMillisecondArray::from_iter(rows.iter().map(|r| r.start_time))
                    .with_timezone("UTC"),
            ),
            string_column(|r| r.user_id.as_deref()),
            string_column(|r| r.level.as_deref()),
            string_column(|r| r.song_id.as_deref()),
            string_column(|r| r.artist_id.as_deref()),
            Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.session_id))),
            string_column(|r| r.location.as_deref()),
            string_column(|r| r.user_agent.as_deref()),
            Arc::new(Int32Array::from_iter(rows.iter().map(|r| r.year))),
            Arc::new(Int32Array::from_iter(rows.iter().map(|r| r.month))),
        ];
        RecordBatch::try_new(Self::schema(), columns)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ReaderError> {
        let start_time = primitives::<TimestampMillisecondType>(batch, "start_time")?;
        let user_id = strings(batch, "userId")?;
        let level = strings(batch, "level")?;
        let song_id = strings(batch, "song_id")?;
        let artist_id = strings(batch, "artist_id")?;
        let session_id = primitives::<Int64Type>(batch, "sessionId")?;
        let location = strings(batch, "location")?;
        let user_agent = strings(batch, "userAgent")?;
        let year = primitives::<Int32Type>(batch, "year")?;
        let month = primitives::<Int32Type>(batch, "month")?;

        Ok((0..batch.num_rows())
            .map(|row| SongplayRow {
                start_time: opt_value(start_time, row),
                user_id: opt_string(user_id, row),
                level: opt_string(level, row),
                song_id: opt_string(song_id, row),
                artist_id: opt_string(artist_id, row),
                session_id: opt_value(session_id, row),
                location: opt_string(location, row),
                user_agent: opt_string(user_agent, row),
                year: opt_value(year, row),
                month: opt_value(month, row),
            })
            .collect())
    }
}

//! Song metadata and the songs/artists dimensions.

use deltalake::arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use deltalake::arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, SchemaRef};
use deltalake::arrow::error::ArrowError;
use std::sync::{Arc, LazyLock};

use super::columns::{opt_string, opt_value, primitives, required, strings};
use super::{Double, TableRow};
use crate::error::ReaderError;

/// One raw song metadata record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongRecord {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub year: Option<i64>,
    pub duration: Option<f64>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
}

impl SongRecord {
    /// Decode records from a batch over the song input schema.
    pub fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ReaderError> {
        let song_id = strings(batch, "song_id")?;
        let title = strings(batch, "title")?;
        let artist_id = strings(batch, "artist_id")?;
        let year = primitives::<Int64Type>(batch, "year")?;
        let duration = primitives::<Float64Type>(batch, "duration")?;
        let artist_name = strings(batch, "artist_name")?;
        let artist_location = strings(batch, "artist_location")?;
        let artist_latitude = primitives::<Float64Type>(batch, "artist_latitude")?;
        let artist_longitude = primitives::<Float64Type>(batch, "artist_longitude")?;

        Ok((0..batch.num_rows())
            .map(|row| SongRecord {
                song_id: opt_string(song_id, row),
                title: opt_string(title, row),
                artist_id: opt_string(artist_id, row),
                year: opt_value(year, row),
                duration: opt_value(duration, row),
                artist_name: opt_string(artist_name, row),
                artist_location: opt_string(artist_location, row),
                artist_latitude: opt_value(artist_latitude, row),
                artist_longitude: opt_value(artist_longitude, row),
            })
            .collect())
    }

    /// Project onto the songs table. `None` when `song_id` is null.
    pub fn song_row(&self) -> Option<SongRow> {
        Some(SongRow {
            song_id: self.song_id.clone()?,
            title: self.title.clone(),
            artist_id: self.artist_id.clone(),
            year: self.year,
            duration: self.duration.map(Double),
        })
    }

    /// Project onto the artists table. `None` when `artist_id` is null.
    pub fn artist_row(&self) -> Option<ArtistRow> {
        Some(ArtistRow {
            artist_id: self.artist_id.clone()?,
            artist_name: self.artist_name.clone(),
            artist_location: self.artist_location.clone(),
            artist_latitude: self.artist_latitude.map(Double),
            artist_longitude: self.artist_longitude.map(Double),
        })
    }
}

/// A row of the songs dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SongRow {
    pub song_id: String,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub year: Option<i64>,
    pub duration: Option<Double>,
}

static SONGS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("duration", DataType::Float64, true),
        Field::new("year", DataType::Int64, true),
        Field::new("artist_id", DataType::Utf8, true),
    ]))
});

impl TableRow for SongRow {
    const NAME: &'static str = "songs";

    fn schema() -> SchemaRef {
        Arc::clone(&SONGS_SCHEMA)
    }

    fn partition_columns() -> &'static [&'static str] {
        &["year", "artist_id"]
    }

    fn partition_values(&self) -> Vec<Option<String>> {
        vec![self.year.map(|y| y.to_string()), self.artist_id.clone()]
    }

    fn to_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.song_id.as_str()),
            )),
            Arc::new(StringArray::from_iter(rows.iter().map(|r| r.title.as_deref()))),
            Arc::new(Float64Array::from_iter(
                rows.iter().map(|r| r.duration.map(|d| d.0)),
            )),
            Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.year))),
            Arc::new(StringArray::from_iter(
                rows.iter().map(|r| r.artist_id.as_deref()),
            )),
        ];
        RecordBatch::try_new(Self::schema(), columns)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ReaderError> {
        let song_id = strings(batch, "song_id")?;
        let title = strings(batch, "title")?;
        let duration = primitives::<Float64Type>(batch, "duration")?;
        let year = primitives::<Int64Type>(batch, "year")?;
        let artist_id = strings(batch, "artist_id")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(SongRow {
                    song_id: required(opt_string(song_id, row), "song_id")?,
                    title: opt_string(title, row),
                    artist_id: opt_string(artist_id, row),
                    year: opt_value(year, row),
                    duration: opt_value(duration, row).map(Double),
                })
            })
            .collect()
    }
}

/// A row of the artists dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtistRow {
    pub artist_id: String,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<Double>,
    pub artist_longitude: Option<Double>,
}

static ARTISTS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
    ]))
});

impl TableRow for ArtistRow {
    const NAME: &'static str = "artists";

    fn schema() -> SchemaRef {
        Arc::clone(&ARTISTS_SCHEMA)
    }

    fn to_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.artist_id.as_str()),
            )),
            Arc::new(StringArray::from_iter(
                rows.iter().map(|r| r.artist_name.as_deref()),
            )),
            Arc::new(StringArray::from_iter(
                rows.iter().map(|r| r.artist_location.as_deref()),
            )),
            Arc::new(Float64Array::from_iter(
                rows.iter().map(|r| r.artist_latitude.map(|d| d.0)),
            )),
            Arc::new(Float64Array::from_iter(
                rows.iter().map(|r| r.artist_longitude.map(|d| d.0)),
            )),
        ];
        RecordBatch::try_new(Self::schema(), columns)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ReaderError> {
        let artist_id = strings(batch, "artist_id")?;
        let artist_name = strings(batch, "artist_name")?;
        let artist_location = strings(batch, "artist_location")?;
        let artist_latitude = primitives::<Float64Type>(batch, "artist_latitude")?;
        let artist_longitude = primitives::<Float64Type>(batch, "artist_longitude")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(ArtistRow {
                    artist_id: required(opt_string(artist_id, row), "artist_id")?,
                    artist_name: opt_string(artist_name, row),
                    artist_location: opt_string(artist_location, row),
                    artist_latitude: opt_value(artist_latitude, row).map(Double),
                    artist_longitude: opt_value(artist_longitude, row).map(Double),
                })
            })
            .collect()
    }
}

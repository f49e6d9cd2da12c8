//! Declared input schemas.
//!
//! Only the fields the pipeline uses are declared. Anything else in the raw
//! files is skipped by the decoder.

use deltalake::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::sync::{Arc, LazyLock};

static SONG_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("song_id", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("year", DataType::Int64, true),
        Field::new("duration", DataType::Float64, true),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
    ]))
});

static EVENT_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("userId", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, true),
        Field::new("ts", DataType::Int64, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("userAgent", DataType::Utf8, true),
    ]))
});

/// Schema of one song metadata record.
pub fn song_schema() -> SchemaRef {
    Arc::clone(&SONG_SCHEMA)
}

/// Schema of one activity log event.
pub fn event_schema() -> SchemaRef {
    Arc::clone(&EVENT_SCHEMA)
}

/// Render a schema as an indented field list for debug logging.
pub fn describe(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|field| {
            format!(
                " |-- {}: {} (nullable = {})",
                field.name(),
                field.data_type(),
                field.is_nullable()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

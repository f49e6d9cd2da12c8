//! Activity log events and the users/time dimensions.

use chrono::{DateTime, Datelike, Timelike, Utc};
use deltalake::arrow::array::{ArrayRef, Int32Array, RecordBatch, StringArray, TimestampMillisecondArray};
use deltalake::arrow::datatypes::{
    DataType, Field, Int32Type, Int64Type, Schema, SchemaRef, TimeUnit, TimestampMillisecondType,
};
use deltalake::arrow::error::ArrowError;
use std::sync::{Arc, LazyLock};

use super::TableRow;
use super::columns::{opt_string, opt_value, primitives, required, strings};
use crate::error::ReaderError;

/// The only page value that counts as a song play.
pub const NEXT_SONG: &str = "NextSong";

/// Arrow type of every `start_time` column.
pub(crate) fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
}

/// One raw activity log event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRecord {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
    pub page: Option<String>,
    /// Epoch milliseconds.
    pub ts: Option<i64>,
    pub song: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl EventRecord {
    /// Decode records from a batch over the event input schema.
    pub fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ReaderError> {
        let user_id = strings(batch, "userId")?;
        let first_name = strings(batch, "firstName")?;
        let last_name = strings(batch, "lastName")?;
        let gender = strings(batch, "gender")?;
        let level = strings(batch, "level")?;
        let page = strings(batch, "page")?;
        let ts = primitives::<Int64Type>(batch, "ts")?;
        let song = strings(batch, "song")?;
        let session_id = primitives::<Int64Type>(batch, "sessionId")?;
        let location = strings(batch, "location")?;
        let user_agent = strings(batch, "userAgent")?;

        Ok((0..batch.num_rows())
            .map(|row| EventRecord {
                user_id: opt_string(user_id, row),
                first_name: opt_string(first_name, row),
                last_name: opt_string(last_name, row),
                gender: opt_string(gender, row),
                level: opt_string(level, row),
                page: opt_string(page, row),
                ts: opt_value(ts, row),
                song: opt_string(song, row),
                session_id: opt_value(session_id, row),
                location: opt_string(location, row),
                user_agent: opt_string(user_agent, row),
            })
            .collect())
    }

    /// Whether this event is a song play.
    pub fn is_song_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG)
    }

    /// `ts` as a UTC timestamp. `None` when null or out of range.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.ts.and_then(DateTime::from_timestamp_millis)
    }

    /// Project onto the users table. `None` when `userId` is null.
    pub fn user_row(&self) -> Option<UserRow> {
        Some(UserRow {
            user_id: self.user_id.clone()?,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            gender: self.gender.clone(),
        })
    }

    /// Calendar breakdown of this event's timestamp.
    pub fn time_row(&self) -> Option<TimeRow> {
        self.start_time().map(TimeRow::from_start_time)
    }
}

/// A row of the users dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserRow {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
}

static USERS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("userId", DataType::Utf8, false),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
    ]))
});

impl TableRow for UserRow {
    const NAME: &'static str = "users";

    fn schema() -> SchemaRef {
        Arc::clone(&USERS_SCHEMA)
    }

    fn to_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.user_id.as_str()),
            )),
            Arc::new(StringArray::from_iter(
                rows.iter().map(|r| r.first_name.as_deref()),
            )),
            Arc::new(StringArray::from_iter(
                rows.iter().map(|r| r.last_name.as_deref()),
            )),
            Arc::new(StringArray::from_iter(rows.iter().map(|r| r.gender.as_deref()))),
        ];
        RecordBatch::try_new(Self::schema(), columns)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ReaderError> {
        let user_id = strings(batch, "userId")?;
        let first_name = strings(batch, "firstName")?;
        let last_name = strings(batch, "lastName")?;
        let gender = strings(batch, "gender")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(UserRow {
                    user_id: required(opt_string(user_id, row), "userId")?,
                    first_name: opt_string(first_name, row),
                    last_name: opt_string(last_name, row),
                    gender: opt_string(gender, row),
                })
            })
            .collect()
    }
}

/// A row of the time dimension.
///
/// Every field is a function of `start_time` in UTC: `week` is the ISO week
/// number and `weekday` counts from Monday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeRow {
    /// Epoch milliseconds.
    pub start_time: i64,
    pub hour: i32,
    pub day: i32,
    pub week: i32,
    pub weekday: i32,
    pub year: i32,
    pub month: i32,
}

impl TimeRow {
    pub fn from_start_time(start_time: DateTime<Utc>) -> Self {
        TimeRow {
            start_time: start_time.timestamp_millis(),
            hour: start_time.hour() as i32,
            day: start_time.day() as i32,
            week: start_time.iso_week().week() as i32,
            weekday: start_time.weekday().num_days_from_monday() as i32,
            year: start_time.year(),
            month: start_time.month() as i32,
        }
    }
}

static TIME_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("start_time", start_time_type(), false),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("weekday", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
    ]))
});

impl TableRow for TimeRow {
    const NAME: &'static str = "time";

    fn schema() -> SchemaRef {
        Arc::clone(&TIME_SCHEMA)
    }

    fn partition_columns() -> &'static [&'static str] {
        &["year", "month"]
    }

    fn partition_values(&self) -> Vec<Option<String>> {
        vec![Some(self.year.to_string()), Some(self.month.to_string())]
    }

    fn to_batch(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        let int_column = |f: fn(&TimeRow) -> i32| -> ArrayRef {
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| f(r))))
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(
                TimestampMillisecondArray::from_iter_values(rows.iter().map(|r| r.start_time))
                    .with_timezone("UTC"),
            ),
            int_column(|r| r.hour),
            int_column(|r| r.day),
            int_column(|r| r.week),
            int_column(|r| r.weekday),
            int_column(|r| r.year),
            int_column(|r| r.month),
        ];
        RecordBatch::try_new(Self::schema(), columns)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ReaderError> {
        let start_time = primitives::<TimestampMillisecondType>(batch, "start_time")?;
        let hour = primitives::<Int32Type>(batch, "hour")?;
        let day = primitives::<Int32Type>(batch, "day")?;
        let week = primitives::<Int32Type>(batch, "week")?;
        let weekday = primitives::<Int32Type>(batch, "weekday")?;
        let year = primitives::<Int32Type>(batch, "year")?;
        let month = primitives::<Int32Type>(batch, "month")?;

        (0..batch.num_rows())
            .map(|row| {
                Ok(TimeRow {
                    start_time: required(opt_value(start_time, row), "start_time")?,
                    hour: required(opt_value(hour, row), "hour")?,
                    day: required(opt_value(day, row), "day")?,
                    week: required(opt_value(week, row), "week")?,
                    weekday: required(opt_value(weekday, row), "weekday")?,
                    year: required(opt_value(year, row), "year")?,
                    month: required(opt_value(month, row), "month")?,
                })
            })
            .collect()
    }
}

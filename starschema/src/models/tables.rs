use crate::models::records::{Gender, Level};
use crate::schema::{ARTISTS_SCHEMA, SONGPLAYS_SCHEMA, SONGS_SCHEMA, TIME_SCHEMA, USERS_SCHEMA};
use crate::utils::paths::PartitionPath;
use arrow::array::{
    ArrayRef, Float64Array, Int32Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, Utc};
use common::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// All star schema tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Artists,
    Songs,
    Users,
    Time,
    Songplays,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artists => "artists",
            Self::Songs => "songs",
            Self::Users => "users",
            Self::Time => "time",
            Self::Songplays => "songplays",
        }
    }

    pub fn schema(&self) -> SchemaRef {
        match self {
            Self::Artists => ARTISTS_SCHEMA.clone(),
            Self::Songs => SONGS_SCHEMA.clone(),
            Self::Users => USERS_SCHEMA.clone(),
            Self::Time => TIME_SCHEMA.clone(),
            Self::Songplays => SONGPLAYS_SCHEMA.clone(),
        }
    }

    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Songs => &["year", "artist_id"],
            Self::Time | Self::Songplays => &["year", "month"],
            Self::Artists | Self::Users => &[],
        }
    }
}

/// A row of one of the output tables.
pub trait TableRow: Send + Sync {
    type Key: Ord;

    const TABLE: TableKind;

    /// Natural key; unique within a built table and used to order rows in a file.
    fn key(&self) -> Self::Key;

    fn partition(&self) -> PartitionPath;

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch>;
}

/// Converts epoch milliseconds into a UTC datetime. Out-of-range values are
/// rejected by the parser, so the epoch fallback is never observed in practice.
pub fn utc_datetime(ts_millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts_millis).unwrap_or_default()
}

fn year_month_partition(ts_millis: i64) -> PartitionPath {
    let dt = utc_datetime(ts_millis);
    PartitionPath::root()
        .with_value("year", dt.year())
        .with_value("month", dt.month())
}

fn strings<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl TableRow for ArtistRow {
    type Key = String;
    const TABLE: TableKind = TableKind::Artists;

    fn key(&self) -> String {
        self.artist_id.clone()
    }

    fn partition(&self) -> PartitionPath {
        PartitionPath::root()
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            strings(rows.iter().map(|r| Some(r.artist_id.as_str()))),
            strings(rows.iter().map(|r| Some(r.name.as_str()))),
            strings(rows.iter().map(|r| r.location.as_deref())),
            Arc::new(rows.iter().map(|r| r.latitude).collect::<Float64Array>()),
            Arc::new(rows.iter().map(|r| r.longitude).collect::<Float64Array>()),
        ];
        Ok(RecordBatch::try_new(Self::TABLE.schema(), columns)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
}

impl TableRow for SongRow {
    type Key = String;
    const TABLE: TableKind = TableKind::Songs;

    fn key(&self) -> String {
        self.song_id.clone()
    }

    fn partition(&self) -> PartitionPath {
        PartitionPath::root()
            .with_value("year", self.year)
            .with_value("artist_id", &self.artist_id)
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            strings(rows.iter().map(|r| Some(r.song_id.as_str()))),
            strings(rows.iter().map(|r| Some(r.title.as_str()))),
            strings(rows.iter().map(|r| Some(r.artist_id.as_str()))),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.duration))),
        ];
        Ok(RecordBatch::try_new(Self::TABLE.schema(), columns)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Gender,
    pub level: Option<Level>,
}

impl TableRow for UserRow {
    type Key = String;
    const TABLE: TableKind = TableKind::Users;

    fn key(&self) -> String {
        self.user_id.clone()
    }

    fn partition(&self) -> PartitionPath {
        PartitionPath::root()
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            strings(rows.iter().map(|r| Some(r.user_id.as_str()))),
            strings(rows.iter().map(|r| r.first_name.as_deref())),
            strings(rows.iter().map(|r| r.last_name.as_deref())),
            strings(rows.iter().map(|r| r.gender.as_code())),
            strings(rows.iter().map(|r| r.level.map(|l| l.as_str()))),
        ];
        Ok(RecordBatch::try_new(Self::TABLE.schema(), columns)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    pub start_time: i64,
    pub hour: i32,
    /// Day of month.
    pub day: i32,
    /// ISO week number.
    pub week: i32,
    pub month: i32,
    pub year: i32,
    /// ISO weekday, Monday = 1 .. Sunday = 7.
    pub weekday: i32,
}

impl TimeRow {
    pub fn from_millis(ts_millis: i64) -> Option<Self> {
        use chrono::Timelike;

        let dt = DateTime::from_timestamp_millis(ts_millis)?;
        Some(Self {
            start_time: ts_millis,
            hour: dt.hour() as i32,
            day: dt.day() as i32,
            week: dt.iso_week().week() as i32,
            month: dt.month() as i32,
            year: dt.year(),
            weekday: dt.weekday().number_from_monday() as i32,
        })
    }
}

impl TableRow for TimeRow {
    type Key = i64;
    const TABLE: TableKind = TableKind::Time;

    fn key(&self) -> i64 {
        self.start_time
    }

    fn partition(&self) -> PartitionPath {
        PartitionPath::root()
            .with_value("year", self.year)
            .with_value("month", self.month)
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch> {
        let ints = |f: fn(&TimeRow) -> i32| -> ArrayRef {
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| f(r))))
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampMillisecondArray::from_iter_values(
                rows.iter().map(|r| r.start_time),
            )),
            ints(|r| r.hour),
            ints(|r| r.day),
            ints(|r| r.week),
            ints(|r| r.month),
            ints(|r| r.year),
            ints(|r| r.weekday),
        ];
        Ok(RecordBatch::try_new(Self::TABLE.schema(), columns)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    pub songplay_id: String,
    pub start_time: i64,
    pub user_id: String,
    pub level: Option<Level>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl TableRow for SongplayRow {
    type Key = (i64, String);
    const TABLE: TableKind = TableKind::Songplays;

    fn key(&self) -> (i64, String) {
        (self.start_time, self.songplay_id.clone())
    }

    fn partition(&self) -> PartitionPath {
        year_month_partition(self.start_time)
    }

    fn to_record_batch(rows: &[&Self]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            strings(rows.iter().map(|r| Some(r.songplay_id.as_str()))),
            Arc::new(TimestampMillisecondArray::from_iter_values(
                rows.iter().map(|r| r.start_time),
            )),
            strings(rows.iter().map(|r| Some(r.user_id.as_str()))),
            strings(rows.iter().map(|r| r.level.map(|l| l.as_str()))),
            strings(rows.iter().map(|r| r.song_id.as_deref())),
            strings(rows.iter().map(|r| r.artist_id.as_deref())),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.session_id))),
            strings(rows.iter().map(|r| r.location.as_deref())),
            strings(rows.iter().map(|r| r.user_agent.as_deref())),
        ];
        Ok(RecordBatch::try_new(Self::TABLE.schema(), columns)?)
    }
}

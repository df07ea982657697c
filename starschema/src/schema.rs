use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use lazy_static::lazy_static;
use std::sync::Arc;

// Raw source schemas. Field names are the JSON keys of the input records.
pub fn raw_catalog_schema() -> Schema {
    Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_name", DataType::Utf8, false),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("duration", DataType::Float64, false),
        Field::new("year", DataType::Int64, true),
    ])
}

pub fn raw_events_schema() -> Schema {
    Schema::new(vec![
        Field::new("ts", DataType::Int64, false),
        Field::new("userId", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("sessionId", DataType::Int64, false),
        Field::new("itemInSession", DataType::Int64, true),
        Field::new("page", DataType::Utf8, false),
        Field::new("song", DataType::Utf8, true),
        Field::new("artist", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
    ])
}

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

// Star schema output tables
pub fn artists_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ])
}

pub fn songs_schema() -> Schema {
    Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("duration", DataType::Float64, false),
    ])
}

pub fn users_schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DataType::Utf8, false),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
    ])
}

pub fn time_schema() -> Schema {
    Schema::new(vec![
        Field::new("start_time", timestamp_type(), false),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Int32, false),
    ])
}

pub fn songplays_schema() -> Schema {
    Schema::new(vec![
        Field::new("songplay_id", DataType::Utf8, false),
        Field::new("start_time", timestamp_type(), false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("level", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
    ])
}

// Lazy-loaded static schemas
lazy_static! {
    pub static ref RAW_CATALOG_SCHEMA: Schema = raw_catalog_schema();
    pub static ref RAW_EVENTS_SCHEMA: Schema = raw_events_schema();
    pub static ref ARTISTS_SCHEMA: SchemaRef = Arc::new(artists_schema());
    pub static ref SONGS_SCHEMA: SchemaRef = Arc::new(songs_schema());
    pub static ref USERS_SCHEMA: SchemaRef = Arc::new(users_schema());
    pub static ref TIME_SCHEMA: SchemaRef = Arc::new(time_schema());
    pub static ref SONGPLAYS_SCHEMA: SchemaRef = Arc::new(songplays_schema());
}

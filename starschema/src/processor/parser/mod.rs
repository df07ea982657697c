pub mod decode;
pub mod ingest;

pub use decode::SchemaViolation;
pub use ingest::{ParsedInput, RecordReader, SourceKind, SourceStats};

use crate::models::{
    Action, CatalogRecord, EventRecord, Gender, GeoPoint, Level, ParsedRecord,
};
use crate::schema::{RAW_CATALOG_SCHEMA, RAW_EVENTS_SCHEMA};
use chrono::DateTime;
use decode::{decode_line, decode_record};
use serde_json::{Map, Value};

/// Parses one raw line of the given source into a typed record.
pub fn parse_line(kind: SourceKind, line: &str) -> Result<ParsedRecord, SchemaViolation> {
    let object = decode_line(line)?;
    match kind {
        SourceKind::Catalog => parse_catalog_record(&object).map(ParsedRecord::Catalog),
        SourceKind::Events => parse_event_record(&object).map(ParsedRecord::Event),
    }
}

pub fn parse_catalog_record(object: &Map<String, Value>) -> Result<CatalogRecord, SchemaViolation> {
    let record = decode_record(object, &RAW_CATALOG_SCHEMA)?;

    let duration = record.required_float64("duration")?;
    if duration <= 0.0 {
        return Err(SchemaViolation::new(
            "duration",
            format!("must be positive, got {}", duration),
        ));
    }

    let year = match record.int64("year") {
        None => 0,
        Some(y) => i32::try_from(y)
            .ok()
            .filter(|y| *y >= 0)
            .ok_or_else(|| SchemaViolation::new("year", format!("out of range: {}", y)))?,
    };

    let artist_coordinates = match (
        record.float64("artist_latitude"),
        record.float64("artist_longitude"),
    ) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        _ => None,
    };

    Ok(CatalogRecord {
        song_id: record.required_string("song_id")?,
        artist_id: record.required_string("artist_id")?,
        title: record.required_string("title")?,
        artist_name: record.required_string("artist_name")?,
        artist_location: record.string("artist_location"),
        artist_coordinates,
        duration,
        year,
    })
}

pub fn parse_event_record(object: &Map<String, Value>) -> Result<EventRecord, SchemaViolation> {
    let record = decode_record(object, &RAW_EVENTS_SCHEMA)?;

    let ts = record.required_int64("ts")?;
    if DateTime::from_timestamp_millis(ts).is_none() {
        return Err(SchemaViolation::new(
            "ts",
            format!("timestamp out of range: {}", ts),
        ));
    }

    let level = record
        .string("level")
        .map(|s| s.parse::<Level>())
        .transpose()
        .map_err(|reason| SchemaViolation::new("level", reason))?;

    let action = Action::from_page(&record.required_string("page")?);
    let user_id = record.string("userId");
    if action.is_fact_eligible() && user_id.is_none() {
        return Err(SchemaViolation::new(
            "userId",
            "play events require a user id",
        ));
    }

    Ok(EventRecord {
        ts,
        user_id,
        first_name: record.string("firstName"),
        last_name: record.string("lastName"),
        gender: Gender::from_code(record.string("gender").as_deref()),
        level,
        session_id: record.required_int64("sessionId")?,
        item_in_session: record.int64("itemInSession"),
        action,
        song: record.string("song"),
        artist: record.string("artist"),
        length: record.float64("length"),
        user_agent: record.string("userAgent"),
        location: record.string("location"),
    })
}

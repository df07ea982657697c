mod records;
mod tables;

pub use records::{
    Action, CatalogRecord, EventRecord, Gender, GeoPoint, Level, PLAY_PAGE, ParsedRecord,
};
pub use tables::{
    ArtistRow, SongRow, SongplayRow, TableKind, TableRow, TimeRow, UserRow, utc_datetime,
};

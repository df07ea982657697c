use crate::models::{
    ArtistRow, CatalogRecord, EventRecord, Gender, SongRow, TableKind, TableRow, UserRow,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, info, warn};

/// Dimension tables, fully materialised before facts are resolved.
#[derive(Debug, Clone, Default)]
pub struct Dimensions {
    pub artists: Vec<ArtistRow>,
    pub songs: Vec<SongRow>,
    pub users: Vec<UserRow>,
}

impl Dimensions {
    pub fn build(catalog: &[CatalogRecord], events: &[EventRecord]) -> Self {
        let dimensions = Self {
            artists: build_artists(catalog),
            songs: build_songs(catalog),
            users: build_users(events),
        };
        info!(
            artists = dimensions.artists.len(),
            songs = dimensions.songs.len(),
            users = dimensions.users.len(),
            "Built dimension tables"
        );
        dimensions
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

pub(crate) fn cmp_opt_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp_f64(a, b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

fn cmp_artist_attributes(a: &ArtistRow, b: &ArtistRow) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| cmp_opt_f64(a.latitude, b.latitude))
        .then_with(|| cmp_opt_f64(a.longitude, b.longitude))
}

fn cmp_song_attributes(a: &SongRow, b: &SongRow) -> Ordering {
    a.title
        .cmp(&b.title)
        .then_with(|| a.artist_id.cmp(&b.artist_id))
        .then_with(|| a.year.cmp(&b.year))
        .then_with(|| cmp_f64(a.duration, b.duration))
}

/// Collapses rows sharing a natural key. Identical duplicates merge silently;
/// conflicting ones are logged and the smallest attribute tuple is kept, so
/// the outcome does not depend on input order.
fn collapse_by_key<R>(rows: impl IntoIterator<Item = R>, compare: fn(&R, &R) -> Ordering) -> Vec<R>
where
    R: TableRow<Key = String>,
{
    let mut by_key: BTreeMap<String, R> = BTreeMap::new();
    let mut conflicts = 0usize;

    for row in rows {
        match by_key.entry(row.key()) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => match compare(&row, slot.get()) {
                Ordering::Equal => {}
                ordering => {
                    conflicts += 1;
                    warn!(
                        table = R::TABLE.as_str(),
                        key = %slot.key(),
                        "Conflicting attributes for duplicate key, keeping the smallest"
                    );
                    if ordering == Ordering::Less {
                        slot.insert(row);
                    }
                }
            },
        }
    }

    if conflicts > 0 {
        debug!(table = R::TABLE.as_str(), conflicts, "Resolved key conflicts");
    }
    by_key.into_values().collect()
}

/// One row per artist id, sorted by artist id.
pub fn build_artists(catalog: &[CatalogRecord]) -> Vec<ArtistRow> {
    let rows = catalog.iter().map(|record| ArtistRow {
        artist_id: record.artist_id.clone(),
        name: record.artist_name.clone(),
        location: record.artist_location.clone(),
        latitude: record.artist_coordinates.map(|c| c.latitude),
        longitude: record.artist_coordinates.map(|c| c.longitude),
    });
    collapse_by_key(rows, cmp_artist_attributes)
}

/// One row per song id, sorted by song id.
pub fn build_songs(catalog: &[CatalogRecord]) -> Vec<SongRow> {
    let rows = catalog.iter().map(|record| SongRow {
        song_id: record.song_id.clone(),
        title: record.title.clone(),
        artist_id: record.artist_id.clone(),
        year: record.year,
        duration: record.duration,
    });
    collapse_by_key(rows, cmp_song_attributes)
}

fn gender_value(gender: Gender) -> Option<Gender> {
    match gender {
        Gender::Unknown => None,
        known => Some(known),
    }
}

/// Orders events by user, then timestamp. Equal timestamps fall back to the
/// attribute tuple so the fold sees the same sequence for any input order.
fn cmp_user_events(a: &EventRecord, b: &EventRecord) -> Ordering {
    a.user_id
        .cmp(&b.user_id)
        .then_with(|| a.ts.cmp(&b.ts))
        .then_with(|| a.level.cmp(&b.level))
        .then_with(|| a.first_name.cmp(&b.first_name))
        .then_with(|| a.last_name.cmp(&b.last_name))
        .then_with(|| a.gender.cmp(&b.gender))
}

/// One row per user who played a song. Each attribute holds its latest
/// non-null value, so the stored level is the one of the user's most recent
/// play.
pub fn build_users(events: &[EventRecord]) -> Vec<UserRow> {
    let mut ordered: Vec<&EventRecord> = events
        .iter()
        .filter(|e| e.action.is_fact_eligible() && e.user_id.is_some())
        .collect();
    ordered.sort_by(|a, b| cmp_user_events(a, b));

    let mut users: Vec<UserRow> = Vec::new();
    for event in ordered {
        let Some(user_id) = event.user_id.as_deref() else {
            continue;
        };

        let starts_new_user = users.last().is_none_or(|last| last.user_id != user_id);
        if starts_new_user {
            users.push(UserRow {
                user_id: user_id.to_string(),
                first_name: None,
                last_name: None,
                gender: Gender::Unknown,
                level: None,
            });
        }

        let Some(user) = users.last_mut() else {
            continue;
        };
        if event.first_name.is_some() {
            user.first_name = event.first_name.clone();
        }
        if event.last_name.is_some() {
            user.last_name = event.last_name.clone();
        }
        if let Some(gender) = gender_value(event.gender) {
            user.gender = gender;
        }
        if event.level.is_some() {
            user.level = event.level;
        }
    }

    debug!(table = TableKind::Users.as_str(), rows = users.len(), "Folded user events");
    users
}

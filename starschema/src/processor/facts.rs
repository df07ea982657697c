use crate::models::{ArtistRow, EventRecord, SongRow, SongplayRow, TableRow, TimeRow};
use crate::processor::dimensions::{Dimensions, cmp_opt_f64};
use crate::utils::arrow::{collect_strings, int64_column};
use crate::utils::digest::sha256_prefix;
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::functions_aggregate::expr_fn::{count, min};
use datafusion::prelude::{JoinType, SessionContext, col, lit};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SONGPLAY_ID_LEN: usize = 32;

/// Stable identity of a play: the same user, timestamp and session always
/// hash to the same id.
pub fn songplay_id(user_id: &str, ts: i64, session_id: i64) -> String {
    sha256_prefix(format!("{}|{}|{}", user_id, ts, session_id), SONGPLAY_ID_LEN)
}

/// Fact rows plus the time dimension derived from them.
#[derive(Debug, Clone, Default)]
pub struct FactTables {
    pub songplays: Vec<SongplayRow>,
    pub time: Vec<TimeRow>,
    pub duplicate_events: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct SongMatch {
    song_id: String,
    candidates: i64,
}

/// Resolves play events against the song and artist dimensions.
pub struct FactResolver {
    tolerance: f64,
}

impl FactResolver {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub async fn resolve(&self, events: &[EventRecord], dimensions: &Dimensions) -> Result<FactTables> {
        let (plays, duplicate_events) = distinct_plays(events);
        if duplicate_events > 0 {
            warn!(duplicate_events, "Collapsed play events sharing an identity");
        }

        let matches = self.match_songs(&plays, dimensions).await?;
        let artist_of: BTreeMap<&str, &str> = dimensions
            .songs
            .iter()
            .map(|s| (s.song_id.as_str(), s.artist_id.as_str()))
            .collect();

        let mut facts = FactTables {
            duplicate_events,
            ..FactTables::default()
        };
        let mut timestamps = BTreeSet::new();

        for (idx, (id, user_id, event)) in plays.iter().enumerate() {
            let song_id = match matches.get(&idx) {
                Some(m) => {
                    if m.candidates > 1 {
                        facts.ambiguous += 1;
                        warn!(
                            songplay_id = %id,
                            song = event.song.as_deref().unwrap_or_default(),
                            artist = event.artist.as_deref().unwrap_or_default(),
                            candidates = m.candidates,
                            chosen = %m.song_id,
                            "Join ambiguity: several catalog songs match a play event"
                        );
                    }
                    Some(m.song_id.clone())
                }
                None => {
                    facts.unmatched += 1;
                    None
                }
            };
            let artist_id = song_id
                .as_deref()
                .and_then(|s| artist_of.get(s))
                .map(|a| a.to_string());

            timestamps.insert(event.ts);
            facts.songplays.push(SongplayRow {
                songplay_id: id.clone(),
                start_time: event.ts,
                user_id: user_id.to_string(),
                level: event.level,
                song_id,
                artist_id,
                session_id: event.session_id,
                location: event.location.clone(),
                user_agent: event.user_agent.clone(),
            });
        }

        facts.songplays.sort_by_key(|row| row.key());
        facts.time = timestamps
            .into_iter()
            .filter_map(TimeRow::from_millis)
            .collect();

        info!(
            songplays = facts.songplays.len(),
            time = facts.time.len(),
            unmatched = facts.unmatched,
            ambiguous = facts.ambiguous,
            "Resolved song plays"
        );
        Ok(facts)
    }

    /// Runs the tolerant (title, artist name, duration) join as a DataFusion
    /// plan and returns the chosen song per play index. Plays without a match
    /// are absent.
    async fn match_songs(
        &self,
        plays: &[(String, &str, &EventRecord)],
        dimensions: &Dimensions,
    ) -> Result<BTreeMap<usize, SongMatch>> {
        let ctx = SessionContext::new();
        ctx.register_batch("plays", plays_batch(plays)?)?;
        ctx.register_batch(
            "songs",
            SongRow::to_record_batch(&dimensions.songs.iter().collect::<Vec<_>>())?,
        )?;
        ctx.register_batch(
            "artists",
            ArtistRow::to_record_batch(&dimensions.artists.iter().collect::<Vec<_>>())?,
        )?;

        let songs = ctx.table("songs").await?.select(vec![
            col("song_id"),
            col("title"),
            col("artist_id").alias("song_artist_id"),
            col("duration"),
        ])?;
        let artists = ctx
            .table("artists")
            .await?
            .select(vec![col("artist_id"), col("name")])?;

        // Strict on both sides: |duration - length| < tolerance
        let tolerance = lit(self.tolerance);
        let within_tolerance = col("duration")
            .gt(col("length") - tolerance.clone())
            .and(col("duration").lt(col("length") + tolerance));

        debug!(plays = plays.len(), tolerance = self.tolerance, "Matching plays against the catalog");
        let batches = ctx
            .table("plays")
            .await?
            .join(songs, JoinType::Inner, &["song"], &["title"], None)?
            .join(
                artists,
                JoinType::Inner,
                &["song_artist_id", "artist"],
                &["artist_id", "name"],
                None,
            )?
            .filter(within_tolerance)?
            .aggregate(
                vec![col("play_idx")],
                vec![
                    min(col("song_id")).alias("song_id"),
                    count(lit(1)).alias("candidates"),
                ],
            )?
            .collect()
            .await?;

        let song_ids = collect_strings(&batches, "song_id")?;
        let mut indexes = Vec::with_capacity(song_ids.len());
        let mut candidates = Vec::with_capacity(song_ids.len());
        for batch in &batches {
            let idx = int64_column(batch, "play_idx")?;
            let counts = int64_column(batch, "candidates")?;
            indexes.extend(idx.values().iter().copied());
            candidates.extend(counts.values().iter().copied());
        }

        let matches = indexes
            .into_iter()
            .zip(candidates)
            .zip(song_ids)
            .filter_map(|((idx, candidates), song_id)| {
                let idx = usize::try_from(idx).ok()?;
                Some((
                    idx,
                    SongMatch {
                        song_id: song_id?,
                        candidates,
                    },
                ))
            })
            .collect();
        Ok(matches)
    }
}

/// Orders events that share a songplay id so the survivor does not depend on
/// input order.
fn cmp_duplicate_plays(a: &EventRecord, b: &EventRecord) -> Ordering {
    a.item_in_session
        .cmp(&b.item_in_session)
        .then_with(|| a.song.cmp(&b.song))
        .then_with(|| a.artist.cmp(&b.artist))
        .then_with(|| cmp_opt_f64(a.length, b.length))
        .then_with(|| a.level.cmp(&b.level))
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| a.user_agent.cmp(&b.user_agent))
}

/// Play events with their ids, one per identity, ordered by id. Returns the
/// number of collapsed duplicates alongside.
fn distinct_plays(events: &[EventRecord]) -> (Vec<(String, &str, &EventRecord)>, usize) {
    let mut plays: Vec<(String, &str, &EventRecord)> = events
        .iter()
        .filter(|e| e.action.is_fact_eligible())
        .filter_map(|e| {
            let user_id = e.user_id.as_deref()?;
            Some((songplay_id(user_id, e.ts, e.session_id), user_id, e))
        })
        .collect();
    plays.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| cmp_duplicate_plays(a.2, b.2)));

    let before = plays.len();
    plays.dedup_by(|later, earlier| later.0 == earlier.0);
    let duplicates = before - plays.len();
    (plays, duplicates)
}

fn plays_batch(plays: &[(String, &str, &EventRecord)]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("play_idx", DataType::Int64, false),
        Field::new("song", DataType::Utf8, false),
        Field::new("artist", DataType::Utf8, false),
        Field::new("length", DataType::Float64, false),
    ]));

    // Only plays that name a song, an artist and a length can match anything
    let candidates: Vec<(i64, &str, &str, f64)> = plays
        .iter()
        .enumerate()
        .filter_map(|(idx, (_, _, e))| {
            Some((
                i64::try_from(idx).ok()?,
                e.song.as_deref()?,
                e.artist.as_deref()?,
                e.length?,
            ))
        })
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(candidates.iter().map(|c| c.0))),
        Arc::new(StringArray::from_iter_values(candidates.iter().map(|c| c.1))),
        Arc::new(StringArray::from_iter_values(candidates.iter().map(|c| c.2))),
        Arc::new(Float64Array::from_iter_values(candidates.iter().map(|c| c.3))),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

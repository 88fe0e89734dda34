//! Matching: turn store hits into a ranked list of candidate songs.
//!
//! A real match puts the query at one fixed offset inside the song, so its
//! landmark pairs pile into a single 100 ms bin of the `db - query` time
//! histogram. Random address collisions spread thinly across bins and score
//! low.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::EngineError;
use crate::store::{FingerprintStore, SongFilter};

/// Width of one offset histogram bin in milliseconds.
const BIN_WIDTH_MS: i64 = 100;

/// A candidate song with its offset-consistency score.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub song_id: u32,
    pub title: String,
    pub artist: String,
    pub external_id: String,
    /// Earliest matched anchor in the song's timeline; where the query
    /// appears to start.
    pub estimated_song_time_ms: u32,
    pub score: f64,
}

/// Matcher tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct MatcherConfig {
    /// When set, drop songs with fewer distinct matched anchor times than
    /// this before scoring. Off by default.
    pub min_anchor_zones: Option<usize>,
}

/// Look up `query` (address -> query anchor time ms) against the store and
/// rank candidate songs by offset consistency.
///
/// Songs whose metadata has gone missing are skipped with a warning; store
/// failures abort the whole call.
pub async fn find_matches(
    store: &dyn FingerprintStore,
    query: &HashMap<u32, u32>,
    config: &MatcherConfig,
) -> Result<(Vec<Match>, Duration), EngineError> {
    let started = Instant::now();

    let addresses: Vec<u32> = query.keys().copied().collect();
    let couples_by_address = store.get_couples(&addresses).await?;

    // song -> (query anchor ms, db anchor ms) pairs, plus earliest db anchor
    let mut hits: HashMap<u32, Vec<(u32, u32)>> = HashMap::new();
    let mut earliest: HashMap<u32, u32> = HashMap::new();

    for (address, couples) in &couples_by_address {
        let Some(&query_time) = query.get(address) else {
            continue;
        };
        for couple in couples {
            hits.entry(couple.song_id)
                .or_default()
                .push((query_time, couple.anchor_time_ms));
            earliest
                .entry(couple.song_id)
                .and_modify(|t| *t = (*t).min(couple.anchor_time_ms))
                .or_insert(couple.anchor_time_ms);
        }
    }

    if let Some(min_zones) = config.min_anchor_zones {
        hits.retain(|_, pairs| {
            let mut anchors: Vec<u32> = pairs.iter().map(|&(_, db_time)| db_time).collect();
            anchors.sort_unstable();
            anchors.dedup();
            anchors.len() >= min_zones
        });
    }

    let mut matches = Vec::new();
    for (&song_id, pairs) in &hits {
        let score = offset_consistency(pairs);
        if score <= 0.0 {
            continue;
        }

        match store.get_song(SongFilter::Id(song_id)).await? {
            Some(song) => matches.push(Match {
                song_id,
                title: song.title,
                artist: song.artist,
                external_id: song.external_id,
                estimated_song_time_ms: earliest.get(&song_id).copied().unwrap_or(0),
                score,
            }),
            None => {
                tracing::warn!(song_id, "matched song has no metadata record, skipping");
            }
        }
    }

    matches.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.song_id.cmp(&b.song_id))
    });

    Ok((matches, started.elapsed()))
}

/// Score a song by the population of the most common quantized time offset.
fn offset_consistency(pairs: &[(u32, u32)]) -> f64 {
    let mut histogram: HashMap<i64, u32> = HashMap::new();

    for &(query_time, db_time) in pairs {
        let delta = db_time as i64 - query_time as i64;
        *histogram.entry(delta / BIN_WIDTH_MS).or_insert(0) += 1;
    }

    histogram.values().copied().max().unwrap_or(0) as f64
}

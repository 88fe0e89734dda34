//! Pipeline glue: sample vectors in, stored fingerprints or ranked matches
//! out.
//!
//! The numeric stages are synchronous and CPU-bound; [`Engine`] runs them on
//! the blocking pool and only suspends at the store boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::fingerprint::{self, Couple};
use crate::matcher::{self, Match, MatcherConfig};
use crate::spectral;
use crate::store::FingerprintStore;

/// Placeholder id attached to query-side fingerprints; never persisted.
const QUERY_SONG_ID: u32 = 0;

/// Run the full numeric pipeline: condition, transform, pick peaks, hash.
pub fn compute_fingerprints(
    samples: &[f64],
    sample_rate: u32,
    song_id: u32,
) -> Result<HashMap<u32, Couple>, EngineError> {
    let spectrogram = spectral::spectrogram(samples, sample_rate)?;
    let peaks = spectral::extract_peaks(&spectrogram);
    Ok(fingerprint::fingerprint(&peaks, song_id))
}

/// Ingest and query entry points over a shared fingerprint store.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn FingerprintStore>,
    matcher: MatcherConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Engine {
            store,
            matcher: MatcherConfig::default(),
        }
    }

    pub fn with_matcher_config(store: Arc<dyn FingerprintStore>, matcher: MatcherConfig) -> Self {
        Engine { store, matcher }
    }

    pub fn store(&self) -> &Arc<dyn FingerprintStore> {
        &self.store
    }

    /// Fingerprint a song and persist the result under `song_id`.
    ///
    /// May be called more than once with the same id (e.g. once per stereo
    /// channel); the store de-duplicates, so fingerprints accumulate.
    /// Returns the number of landmarks produced by this call.
    pub async fn ingest(
        &self,
        samples: Vec<f64>,
        sample_rate: u32,
        song_id: u32,
    ) -> Result<usize, EngineError> {
        let fingerprints = tokio::task::spawn_blocking(move || {
            compute_fingerprints(&samples, sample_rate, song_id)
        })
        .await??;

        tracing::debug!(song_id, landmarks = fingerprints.len(), "ingesting fingerprints");
        self.store.store_fingerprints(&fingerprints).await?;

        Ok(fingerprints.len())
    }

    /// Fingerprint a query clip and rank candidate songs against the store.
    pub async fn recognize(
        &self,
        samples: Vec<f64>,
        sample_rate: u32,
        duration_sec: f64,
    ) -> Result<(Vec<Match>, Duration), EngineError> {
        let started = Instant::now();

        let fingerprints = tokio::task::spawn_blocking(move || {
            compute_fingerprints(&samples, sample_rate, QUERY_SONG_ID)
        })
        .await??;

        // project away the synthetic song id; only the query timeline matters
        let query: HashMap<u32, u32> = fingerprints
            .into_iter()
            .map(|(address, couple)| (address, couple.anchor_time_ms))
            .collect();

        tracing::debug!(
            addresses = query.len(),
            duration_sec,
            "querying fingerprint store"
        );

        let (matches, _) = matcher::find_matches(self.store.as_ref(), &query, &self.matcher).await?;
        Ok((matches, started.elapsed()))
    }
}

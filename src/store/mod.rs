//! Fingerprint persistence.
//!
//! The engine only ever talks to [`FingerprintStore`]; any backend that
//! honors its contract slots in. [`memory::MemoryStore`] backs tests and
//! embedded use, [`sqlite::SqliteStore`] is the shipped backend.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::Couple;

pub mod memory;
pub mod sqlite;

/// A registered song. `key` is the normalized uniqueness key derived from
/// title and artist; `external_id` points at the upstream source (e.g. a
/// video id) and is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    pub song_id: u32,
    pub title: String,
    pub artist: String,
    pub external_id: String,
    pub key: String,
}

/// Lookup filter for [`FingerprintStore::get_song`].
#[derive(Debug, Clone)]
pub enum SongFilter {
    Id(u32),
    ExternalId(String),
    Key(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("song key {key:?} is already registered")]
    DuplicateKey { key: String },

    #[error("storage backend failure: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Normalize a title/artist pair into the store's uniqueness key.
///
/// Lower-cased and trimmed, spaces collapsed to underscores, quotes stripped
/// and `&` spelled out, so trivial formatting differences do not register the
/// same song twice.
pub fn song_key(title: &str, artist: &str) -> String {
    let key = format!("{}-{}", title, artist).trim().to_lowercase();
    key.replace(' ', "_")
        .replace('\'', "")
        .replace('"', "")
        .replace('&', "and")
}

/// Storage contract for songs and their landmark fingerprints.
///
/// Implementations must be safe for concurrent use: batches are atomic (a
/// reader never observes part of one), and ingest is idempotent on the
/// `(address, anchor_time_ms, song_id)` triple.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Register a song and return its assigned id. Fails with
    /// [`StoreError::DuplicateKey`] if the normalized key is taken.
    async fn register_song(
        &self,
        title: &str,
        artist: &str,
        external_id: &str,
    ) -> Result<u32, StoreError>;

    async fn total_songs(&self) -> Result<u64, StoreError>;

    /// Look up a song; the missing case is `Ok(None)`.
    async fn get_song(&self, filter: SongFilter) -> Result<Option<SongRecord>, StoreError>;

    /// Delete a song and its fingerprints.
    async fn delete_song(&self, song_id: u32) -> Result<(), StoreError>;

    /// Persist a fingerprint map. Re-storing the same couples is a no-op.
    async fn store_fingerprints(
        &self,
        fingerprints: &HashMap<u32, Couple>,
    ) -> Result<(), StoreError>;

    /// Fetch all couples stored under the given addresses. Unknown addresses
    /// are simply absent from the result.
    async fn get_couples(
        &self,
        addresses: &[u32],
    ) -> Result<HashMap<u32, Vec<Couple>>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

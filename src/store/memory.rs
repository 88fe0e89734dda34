//! In-memory fingerprint store.
//!
//! Reference implementation of the store contract; useful for tests and for
//! embedding the engine without a database.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::fingerprint::Couple;
use crate::store::{song_key, FingerprintStore, SongFilter, SongRecord, StoreError};

#[derive(Default)]
struct Inner {
    songs: HashMap<u32, SongRecord>,
    keys: HashMap<String, u32>,
    couples: HashMap<u32, Vec<Couple>>,
    next_song_id: u32,
}

/// Interior-locked maps; every operation takes the lock once, so readers
/// never observe a partially applied batch.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for MemoryStore {
    async fn register_song(
        &self,
        title: &str,
        artist: &str,
        external_id: &str,
    ) -> Result<u32, StoreError> {
        let key = song_key(title, artist);
        let mut inner = self.inner.write().expect("store lock poisoned");

        if inner.keys.contains_key(&key) {
            return Err(StoreError::DuplicateKey { key });
        }

        inner.next_song_id += 1;
        let song_id = inner.next_song_id;
        inner.keys.insert(key.clone(), song_id);
        inner.songs.insert(
            song_id,
            SongRecord {
                song_id,
                title: title.to_string(),
                artist: artist.to_string(),
                external_id: external_id.to_string(),
                key,
            },
        );

        Ok(song_id)
    }

    async fn total_songs(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner.songs.len() as u64)
    }

    async fn get_song(&self, filter: SongFilter) -> Result<Option<SongRecord>, StoreError> {
        let inner = self.inner.read().expect("store lock poisoned");
        let song = match filter {
            SongFilter::Id(id) => inner.songs.get(&id).cloned(),
            SongFilter::Key(key) => inner
                .keys
                .get(&key)
                .and_then(|id| inner.songs.get(id))
                .cloned(),
            SongFilter::ExternalId(external_id) => inner
                .songs
                .values()
                .find(|song| song.external_id == external_id)
                .cloned(),
        };
        Ok(song)
    }

    async fn delete_song(&self, song_id: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("store lock poisoned");

        if let Some(song) = inner.songs.remove(&song_id) {
            inner.keys.remove(&song.key);
        }
        for couples in inner.couples.values_mut() {
            couples.retain(|couple| couple.song_id != song_id);
        }
        inner.couples.retain(|_, couples| !couples.is_empty());

        Ok(())
    }

    async fn store_fingerprints(
        &self,
        fingerprints: &HashMap<u32, Couple>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("store lock poisoned");

        for (&address, &couple) in fingerprints {
            let couples = inner.couples.entry(address).or_default();
            if !couples.contains(&couple) {
                couples.push(couple);
            }
        }

        Ok(())
    }

    async fn get_couples(
        &self,
        addresses: &[u32],
    ) -> Result<HashMap<u32, Vec<Couple>>, StoreError> {
        let inner = self.inner.read().expect("store lock poisoned");

        let mut result = HashMap::new();
        for &address in addresses {
            if let Some(couples) = inner.couples.get(&address) {
                result.insert(address, couples.clone());
            }
        }

        Ok(result)
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn couple(anchor_time_ms: u32, song_id: u32) -> Couple {
        Couple {
            anchor_time_ms,
            song_id,
        }
    }

    #[tokio::test]
    async fn register_assigns_sequential_ids_and_records_metadata() {
        let store = MemoryStore::new();

        let first = store.register_song("Song A", "Artist", "yt-a").await.unwrap();
        let second = store.register_song("Song B", "Artist", "yt-b").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.total_songs().await.unwrap(), 2);

        let record = store
            .get_song(SongFilter::Id(first))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.title, "Song A");
        assert_eq!(record.external_id, "yt-a");
        assert_eq!(record.key, song_key("Song A", "Artist"));
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let store = MemoryStore::new();
        store.register_song("Same", "Artist", "x").await.unwrap();

        let err = store.register_song("same", "ARTIST", "y").await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.total_songs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lookup_by_key_and_external_id() {
        let store = MemoryStore::new();
        let id = store.register_song("Title", "Artist", "yt-1").await.unwrap();

        let by_key = store
            .get_song(SongFilter::Key(song_key("Title", "Artist")))
            .await
            .unwrap()
            .unwrap();
        let by_external = store
            .get_song(SongFilter::ExternalId("yt-1".into()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(by_key.song_id, id);
        assert_eq!(by_external.song_id, id);
        assert!(store
            .get_song(SongFilter::ExternalId("missing".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn storing_the_same_batch_twice_is_idempotent() {
        let store = MemoryStore::new();
        let batch: HashMap<u32, Couple> =
            [(10, couple(100, 1)), (20, couple(200, 1))].into_iter().collect();

        store.store_fingerprints(&batch).await.unwrap();
        store.store_fingerprints(&batch).await.unwrap();

        let couples = store.get_couples(&[10, 20]).await.unwrap();
        assert_eq!(couples[&10], vec![couple(100, 1)]);
        assert_eq!(couples[&20], vec![couple(200, 1)]);
    }

    #[tokio::test]
    async fn couples_accumulate_across_songs_at_one_address() {
        let store = MemoryStore::new();

        store
            .store_fingerprints(&[(42, couple(10, 1))].into_iter().collect())
            .await
            .unwrap();
        store
            .store_fingerprints(&[(42, couple(99, 2))].into_iter().collect())
            .await
            .unwrap();

        let couples = store.get_couples(&[42]).await.unwrap();
        assert_eq!(couples[&42].len(), 2);
    }

    #[tokio::test]
    async fn get_couples_returns_only_requested_known_addresses() {
        let store = MemoryStore::new();
        store
            .store_fingerprints(&[(1, couple(5, 1)), (2, couple(6, 1))].into_iter().collect())
            .await
            .unwrap();

        let couples = store.get_couples(&[2, 3]).await.unwrap();

        assert_eq!(couples.len(), 1);
        assert!(couples.contains_key(&2));
    }

    #[tokio::test]
    async fn delete_song_drops_record_and_fingerprints() {
        let store = MemoryStore::new();
        let id = store.register_song("Gone", "Soon", "").await.unwrap();
        store
            .store_fingerprints(&[(7, couple(1, id)), (8, couple(2, id))].into_iter().collect())
            .await
            .unwrap();

        store.delete_song(id).await.unwrap();

        assert!(store.get_song(SongFilter::Id(id)).await.unwrap().is_none());
        assert!(store.get_couples(&[7, 8]).await.unwrap().is_empty());
        // the key is free again
        assert!(store.register_song("Gone", "Soon", "").await.is_ok());
    }
}

//! SQLite-backed fingerprint store.
//!
//! Two tables: `songs` with a unique normalized key, and `fingerprints`
//! keyed by `(address, anchor_time_ms, song_id)` with an index on `address`.
//! Addresses are stored as signed 64-bit so the full u32 range round-trips.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::fingerprint::Couple;
use crate::store::{song_key, FingerprintStore, SongFilter, SongRecord, StoreError};

/// Rows per multi-row insert. Each row binds three parameters, well under
/// SQLite's variable limit.
const INSERT_BATCH: usize = 1000;
/// Addresses per `IN (...)` lookup.
const SELECT_BATCH: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite:attune.db`), creating the file and the
    /// schema when missing.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true);

        // a shared pool over :memory: would open one blank database per
        // connection, so pin it to a single connection there
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = SqliteStore { pool };
        store.create_tables().await?;

        tracing::info!(url, "sqlite fingerprint store ready");
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS songs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                artist TEXT NOT NULL,
                external_id TEXT NOT NULL DEFAULT '',
                key TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fingerprints (
                address INTEGER NOT NULL,
                anchor_time_ms INTEGER NOT NULL,
                song_id INTEGER NOT NULL,
                PRIMARY KEY (address, anchor_time_ms, song_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_fingerprints_address ON fingerprints (address)",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

#[async_trait]
impl FingerprintStore for SqliteStore {
    async fn register_song(
        &self,
        title: &str,
        artist: &str,
        external_id: &str,
    ) -> Result<u32, StoreError> {
        let key = song_key(title, artist);

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO songs (title, artist, external_id, key) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(title)
        .bind(artist)
        .bind(external_id)
        .bind(&key)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if let sqlx::Error::Database(db) = &err {
                if db.kind() == ErrorKind::UniqueViolation {
                    return StoreError::DuplicateKey { key: key.clone() };
                }
            }
            backend(err)
        })?;

        Ok(id as u32)
    }

    async fn total_songs(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count as u64)
    }

    async fn get_song(&self, filter: SongFilter) -> Result<Option<SongRecord>, StoreError> {
        type SongRow = (i64, String, String, String, String);

        let row: Option<SongRow> = match filter {
            SongFilter::Id(id) => {
                sqlx::query_as("SELECT id, title, artist, external_id, key FROM songs WHERE id = ?")
                    .bind(id as i64)
                    .fetch_optional(&self.pool)
                    .await
            }
            SongFilter::ExternalId(external_id) => {
                sqlx::query_as(
                    "SELECT id, title, artist, external_id, key FROM songs WHERE external_id = ?",
                )
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await
            }
            SongFilter::Key(key) => {
                sqlx::query_as("SELECT id, title, artist, external_id, key FROM songs WHERE key = ?")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(backend)?;

        Ok(row.map(|(id, title, artist, external_id, key)| SongRecord {
            song_id: id as u32,
            title,
            artist,
            external_id,
            key,
        }))
    }

    async fn delete_song(&self, song_id: u32) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("DELETE FROM fingerprints WHERE song_id = ?")
            .bind(song_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(song_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn store_fingerprints(
        &self,
        fingerprints: &HashMap<u32, Couple>,
    ) -> Result<(), StoreError> {
        if fingerprints.is_empty() {
            return Ok(());
        }

        // one transaction for the whole call: readers see all rows or none
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let entries: Vec<(u32, Couple)> =
            fingerprints.iter().map(|(&a, &c)| (a, c)).collect();
        for chunk in entries.chunks(INSERT_BATCH) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO fingerprints (address, anchor_time_ms, song_id) ",
            );
            builder.push_values(chunk, |mut row, (address, couple)| {
                row.push_bind(*address as i64)
                    .push_bind(couple.anchor_time_ms as i64)
                    .push_bind(couple.song_id as i64);
            });
            builder.build().execute(&mut *tx).await.map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn get_couples(
        &self,
        addresses: &[u32],
    ) -> Result<HashMap<u32, Vec<Couple>>, StoreError> {
        let mut couples: HashMap<u32, Vec<Couple>> = HashMap::new();

        for chunk in addresses.chunks(SELECT_BATCH) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT address, anchor_time_ms, song_id FROM fingerprints WHERE address IN (",
            );
            let mut separated = builder.separated(", ");
            for &address in chunk {
                separated.push_bind(address as i64);
            }
            builder.push(")");

            let rows: Vec<(i64, i64, i64)> = builder
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

            for (address, anchor_time_ms, song_id) in rows {
                couples.entry(address as u32).or_default().push(Couple {
                    anchor_time_ms: anchor_time_ms as u32,
                    song_id: song_id as u32,
                });
            }
        }

        Ok(couples)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn couple(anchor_time_ms: u32, song_id: u32) -> Couple {
        Couple {
            anchor_time_ms,
            song_id,
        }
    }

    #[tokio::test]
    async fn register_and_fetch_round_trip() {
        let store = store().await;

        let id = store
            .register_song("Night Drive", "The Streetlights", "yt-123")
            .await
            .unwrap();

        let record = store.get_song(SongFilter::Id(id)).await.unwrap().unwrap();
        assert_eq!(record.title, "Night Drive");
        assert_eq!(record.artist, "The Streetlights");
        assert_eq!(record.external_id, "yt-123");

        let by_key = store
            .get_song(SongFilter::Key(song_key("Night Drive", "The Streetlights")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_key.song_id, id);

        let by_external = store
            .get_song(SongFilter::ExternalId("yt-123".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_external.song_id, id);
    }

    #[tokio::test]
    async fn duplicate_key_maps_to_typed_error() {
        let store = store().await;
        store.register_song("Twice", "Artist", "").await.unwrap();

        let err = store.register_song("twice", "artist", "").await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.total_songs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ingest_is_idempotent_on_the_composite_key() {
        let store = store().await;
        let batch: HashMap<u32, Couple> =
            [(10, couple(100, 1)), (11, couple(101, 1))].into_iter().collect();

        store.store_fingerprints(&batch).await.unwrap();
        store.store_fingerprints(&batch).await.unwrap();

        let couples = store.get_couples(&[10, 11]).await.unwrap();
        assert_eq!(couples[&10], vec![couple(100, 1)]);
        assert_eq!(couples[&11], vec![couple(101, 1)]);
    }

    #[tokio::test]
    async fn full_u32_address_range_round_trips() {
        let store = store().await;
        let batch: HashMap<u32, Couple> = [
            (0, couple(1, 1)),
            (u32::MAX, couple(2, 1)),
            (1 << 31, couple(3, 1)),
        ]
        .into_iter()
        .collect();

        store.store_fingerprints(&batch).await.unwrap();

        let couples = store
            .get_couples(&[0, u32::MAX, 1 << 31])
            .await
            .unwrap();
        assert_eq!(couples.len(), 3);
        assert_eq!(couples[&u32::MAX], vec![couple(2, 1)]);
    }

    #[tokio::test]
    async fn get_couples_ignores_unknown_addresses() {
        let store = store().await;
        store
            .store_fingerprints(&[(5, couple(50, 9))].into_iter().collect())
            .await
            .unwrap();

        let couples = store.get_couples(&[5, 6, 7]).await.unwrap();

        assert_eq!(couples.len(), 1);
        assert_eq!(couples[&5], vec![couple(50, 9)]);
    }

    #[tokio::test]
    async fn delete_song_removes_its_fingerprints() {
        let store = store().await;
        let id = store.register_song("Gone", "Soon", "").await.unwrap();
        store
            .store_fingerprints(&[(1, couple(10, id)), (2, couple(20, id))].into_iter().collect())
            .await
            .unwrap();

        store.delete_song(id).await.unwrap();

        assert!(store.get_song(SongFilter::Id(id)).await.unwrap().is_none());
        assert!(store.get_couples(&[1, 2]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batches_larger_than_one_chunk_are_stored() {
        let store = store().await;
        let batch: HashMap<u32, Couple> = (0..2500u32)
            .map(|i| (i, couple(i * 10, 1)))
            .collect();

        store.store_fingerprints(&batch).await.unwrap();

        let addresses: Vec<u32> = (0..2500).collect();
        let couples = store.get_couples(&addresses).await.unwrap();
        assert_eq!(couples.len(), 2500);
    }
}

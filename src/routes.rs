//! HTTP route handlers for the recognition service.
//!
//! Uploads register a song and ingest its fingerprints; recognition decodes
//! a clip and returns the ranked candidates.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::decode::{decode_bytes, DecodedAudio};
use crate::error::EngineError;
use crate::matcher::Match;
use crate::pipeline::Engine;
use crate::store::StoreError;

#[derive(Serialize)]
pub struct RegisterResponse {
    pub song_id: u32,
    pub landmarks: usize,
}

#[derive(Serialize)]
pub struct RecognizeResponse {
    pub matches: Vec<Match>,
    pub elapsed_ms: u128,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub songs: u64,
}

/// `POST /songs` — multipart `title`, `artist`, optional `external_id`, and
/// the audio payload in `file`. Registers the song and ingests its
/// fingerprints.
pub async fn register(
    State(engine): State<Engine>,
    mut form: Multipart,
) -> Result<Json<RegisterResponse>, (StatusCode, String)> {
    let mut title = String::new();
    let mut artist = String::new();
    let mut external_id = String::new();
    let mut audio_bytes = Vec::new();

    while let Some(field) = form.next_field().await.map_err(bad_upload)? {
        match field.name() {
            Some("title") => title = field.text().await.map_err(bad_upload)?,
            Some("artist") => artist = field.text().await.map_err(bad_upload)?,
            Some("external_id") => external_id = field.text().await.map_err(bad_upload)?,
            Some("file") => audio_bytes = field.bytes().await.map_err(bad_upload)?.to_vec(),
            _ => {}
        }
    }

    if title.is_empty() || artist.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "title and artist are required".into(),
        ));
    }
    if audio_bytes.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "file field is required".into()));
    }

    let decoded = decode(audio_bytes).await?;

    let song_id = engine
        .store()
        .register_song(&title, &artist, &external_id)
        .await
        .map_err(store_status)?;

    let landmarks = engine
        .ingest(decoded.samples, decoded.sample_rate, song_id)
        .await
        .map_err(engine_status)?;

    tracing::info!(song_id, %title, %artist, landmarks, "song registered");
    Ok(Json(RegisterResponse { song_id, landmarks }))
}

/// `POST /recognize` — multipart `file` with the query clip; returns ranked
/// matches.
pub async fn recognize(
    State(engine): State<Engine>,
    mut form: Multipart,
) -> Result<Json<RecognizeResponse>, (StatusCode, String)> {
    let mut audio_bytes = Vec::new();

    while let Some(field) = form.next_field().await.map_err(bad_upload)? {
        if field.name() == Some("file") {
            audio_bytes = field.bytes().await.map_err(bad_upload)?.to_vec();
        }
    }

    if audio_bytes.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "file field is required".into()));
    }

    let decoded = decode(audio_bytes).await?;

    let (matches, elapsed) = engine
        .recognize(decoded.samples, decoded.sample_rate, decoded.duration_sec)
        .await
        .map_err(engine_status)?;

    Ok(Json(RecognizeResponse {
        matches,
        elapsed_ms: elapsed.as_millis(),
    }))
}

/// `GET /stats`
pub async fn stats(
    State(engine): State<Engine>,
) -> Result<Json<StatsResponse>, (StatusCode, String)> {
    let songs = engine.store().total_songs().await.map_err(store_status)?;
    Ok(Json(StatsResponse { songs }))
}

/// `DELETE /songs/:id`
pub async fn remove(
    State(engine): State<Engine>,
    Path(song_id): Path<u32>,
) -> Result<StatusCode, (StatusCode, String)> {
    engine
        .store()
        .delete_song(song_id)
        .await
        .map_err(store_status)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn decode(bytes: Vec<u8>) -> Result<DecodedAudio, (StatusCode, String)> {
    tokio::task::spawn_blocking(move || decode_bytes(&bytes))
        .await
        .map_err(|err| {
            tracing::error!(%err, "decode worker failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "decode failed".into())
        })?
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))
}

fn bad_upload(err: axum::extract::multipart::MultipartError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn store_status(err: StoreError) -> (StatusCode, String) {
    let status = match &err {
        StoreError::DuplicateKey { .. } => StatusCode::CONFLICT,
        StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(%err, "store failure");
    }
    (status, err.to_string())
}

fn engine_status(err: EngineError) -> (StatusCode, String) {
    let status = match &err {
        EngineError::Store(StoreError::DuplicateKey { .. }) => StatusCode::CONFLICT,
        EngineError::Store(_) | EngineError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(%err, "engine failure");
    }
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognize_response_serializes_ranked_matches() {
        let response = RecognizeResponse {
            matches: vec![Match {
                song_id: 42,
                title: "Night Drive".into(),
                artist: "The Streetlights".into(),
                external_id: "yt-123".into(),
                estimated_song_time_ms: 61_500,
                score: 37.0,
            }],
            elapsed_ms: 12,
        };

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["elapsed_ms"], 12);
        assert_eq!(json["matches"][0]["song_id"], 42);
        assert_eq!(json["matches"][0]["title"], "Night Drive");
        assert_eq!(json["matches"][0]["score"], 37.0);
    }

    #[test]
    fn duplicate_registration_maps_to_conflict() {
        let err = StoreError::DuplicateKey {
            key: "song-artist".into(),
        };
        assert_eq!(store_status(err).0, StatusCode::CONFLICT);
    }
}

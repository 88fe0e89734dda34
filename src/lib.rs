//! Landmark-based audio fingerprinting and song recognition.
//!
//! The pipeline conditions mono PCM (low-pass + decimation), builds a Hann
//! windowed magnitude spectrogram, extracts band-wise peaks, hashes
//! anchor/target peak pairs into 32-bit addresses and matches them against a
//! fingerprint store by time-offset consistency.

pub mod config;
pub mod decode;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod spectral;
pub mod store;

pub use error::EngineError;
pub use fingerprint::Couple;
pub use matcher::{Match, MatcherConfig};
pub use pipeline::{compute_fingerprints, Engine};
pub use store::{FingerprintStore, SongFilter, SongRecord, StoreError};

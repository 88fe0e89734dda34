//! Error types shared across the engine.
//!
//! The numeric pipeline never recovers internally; any invalid input aborts
//! the call and surfaces one of these variants to the caller.

use thiserror::Error;

use crate::store::StoreError;

/// Errors produced by the fingerprinting and matching engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sample buffer is empty")]
    EmptySamples,

    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("target rate {target} Hz exceeds source rate {source_rate} Hz")]
    UpsampleRequested { source_rate: u32, target: u32 },

    #[error("FFT input length {0} is not a power of two")]
    FftLength(usize),

    #[error("fingerprint worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

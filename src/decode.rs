//! Audio decoding in front of the engine.
//!
//! Accepts whatever container/codec symphonia can probe, mixes interleaved
//! channels down to mono `f64` and resamples to the canonical 44.1 kHz rate
//! the fingerprint pipeline assumes.

use std::io::Cursor;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Canonical rate handed to the fingerprint pipeline.
pub const TARGET_RATE: u32 = 44_100;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported or corrupt container: {0}")]
    Probe(symphonia::core::errors::Error),

    #[error("no decodable audio track")]
    NoDefaultTrack,

    #[error("track is missing sample rate or channel layout")]
    MissingSignalSpec,

    #[error("decoder setup failed: {0}")]
    DecoderSetup(symphonia::core::errors::Error),

    #[error("resampler setup failed: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// Decoded, mono, canonical-rate audio.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub duration_sec: f64,
}

/// Decode `bytes` into mono samples at [`TARGET_RATE`].
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let (samples, source_rate, channels) = decode_native(bytes)?;

    let mono = to_mono(&samples, channels);
    let samples = if source_rate == TARGET_RATE {
        mono
    } else {
        resample(&mono, source_rate, TARGET_RATE)?
    };

    let duration_sec = samples.len() as f64 / TARGET_RATE as f64;
    Ok(DecodedAudio {
        samples,
        sample_rate: TARGET_RATE,
        duration_sec,
    })
}

fn decode_native(bytes: &[u8]) -> Result<(Vec<f32>, u32, usize), DecodeError> {
    let cursor = Cursor::new(bytes.to_vec());
    let stream = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Probe)?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoDefaultTrack)?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::MissingSignalSpec)?;
    let channels = track
        .codec_params
        .channels
        .ok_or(DecodeError::MissingSignalSpec)?
        .count();
    if channels == 0 {
        return Err(DecodeError::MissingSignalSpec);
    }
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(DecodeError::DecoderSetup)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break, // end of stream
        };
        if packet.track_id() != track_id {
            continue;
        }

        // skip undecodable packets rather than failing the whole file
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::debug!(%err, "skipping undecodable packet");
                continue;
            }
        };

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    Ok((samples, sample_rate, channels))
}

fn to_mono(interleaved: &[f32], channels: usize) -> Vec<f64> {
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64)
        .collect()
}

fn resample(input: &[f64], source_rate: u32, target_rate: u32) -> Result<Vec<f64>, DecodeError> {
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        oversampling_factor: 64,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };

    const CHUNK: usize = 1024;
    let mut resampler = SincFixedIn::<f64>::new(
        target_rate as f64 / source_rate as f64,
        2.0,
        params,
        CHUNK,
        1,
    )?;

    let mut output = Vec::new();
    let mut position = 0;

    while position + CHUNK <= input.len() {
        let chunk = vec![input[position..position + CHUNK].to_vec()];
        let resampled = resampler.process(&chunk, None)?;
        output.extend_from_slice(&resampled[0]);
        position += CHUNK;
    }

    // zero-pad the final short chunk
    let remaining = input.len() - position;
    if remaining > 0 {
        let mut padded = vec![0.0; CHUNK];
        padded[..remaining].copy_from_slice(&input[position..]);
        let resampled = resampler.process(&[padded], None)?;
        output.extend_from_slice(&resampled[0]);
    }

    Ok(output)
}

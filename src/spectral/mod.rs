//! Spectral analysis: conditioning, STFT and peak extraction.
//!
//! Turns mono PCM into a magnitude spectrogram and then into the sparse
//! constellation of time-frequency peaks the hasher pairs up.

use rayon::prelude::*;

use crate::error::EngineError;

pub mod fft;
pub mod filter;
pub mod peaks;

pub use peaks::{extract_peaks, Peak};

/// Anti-alias cutoff applied before decimation, in Hz.
pub const MAX_FREQ: f64 = 5000.0;
/// Integer decimation ratio; the effective rate is `sample_rate / 4`.
pub const DECIMATE_RATIO: u32 = 4;
/// Samples per analysis frame.
pub const FFT_N: usize = 1024;
/// Stride between consecutive frames (50% overlap).
pub const HOP: usize = FFT_N / 2;

/// Magnitude time-frequency matrix at the decimated rate.
///
/// Every frame holds `FFT_N / 2` non-negative magnitudes; frame `k` starts at
/// `k * HOP / effective_rate` seconds.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    frames: Vec<Vec<f64>>,
    effective_rate: u32,
}

impl Spectrogram {
    pub fn frames(&self) -> &[Vec<f64>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Seconds spanned by one frame hop.
    pub fn frame_duration(&self) -> f64 {
        HOP as f64 / self.effective_rate as f64
    }

    /// Hz covered by one frequency bin.
    pub fn freq_resolution(&self) -> f64 {
        self.effective_rate as f64 / FFT_N as f64
    }

    #[cfg(test)]
    pub(crate) fn from_raw_frames(frames: Vec<Vec<f64>>, effective_rate: u32) -> Self {
        Spectrogram {
            frames,
            effective_rate,
        }
    }
}

/// Build the magnitude spectrogram of a mono PCM signal.
///
/// The signal is low-passed at [`MAX_FREQ`], decimated by [`DECIMATE_RATIO`],
/// then transformed frame by frame under a Hann window. Signals shorter than
/// one frame after decimation yield an empty spectrogram.
pub fn spectrogram(samples: &[f64], sample_rate: u32) -> Result<Spectrogram, EngineError> {
    if samples.is_empty() {
        return Err(EngineError::EmptySamples);
    }
    if sample_rate == 0 {
        return Err(EngineError::ZeroSampleRate);
    }

    let filtered = filter::low_pass_filter(MAX_FREQ, sample_rate as f64, samples);
    let effective_rate = sample_rate / DECIMATE_RATIO;
    let decimated = filter::decimate(&filtered, sample_rate, effective_rate)?;

    let window = hann_window(FFT_N);

    let starts: Vec<usize> = (0..)
        .map(|i| i * HOP)
        .take_while(|s| s + FFT_N <= decimated.len())
        .collect();

    let frames = starts
        .par_iter()
        .map(|&start| {
            let mut frame: Vec<f64> = decimated[start..start + FFT_N].to_vec();
            for (sample, w) in frame.iter_mut().zip(&window) {
                *sample *= w;
            }

            let spectrum = fft::fft(&frame)?;
            Ok(spectrum[..FFT_N / 2].iter().map(|c| c.norm()).collect())
        })
        .collect::<Result<Vec<Vec<f64>>, EngineError>>()?;

    Ok(Spectrogram {
        frames,
        effective_rate,
    })
}

fn hann_window(size: usize) -> Vec<f64> {
    let n = size as f64;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (n - 1.0)).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, sample_rate: u32, seconds: f64) -> Vec<f64> {
        let len = (seconds * sample_rate as f64) as usize;
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    #[test]
    fn rejects_empty_input_and_zero_rate() {
        assert!(matches!(
            spectrogram(&[], 44100),
            Err(EngineError::EmptySamples)
        ));
        assert!(matches!(
            spectrogram(&[0.0], 0),
            Err(EngineError::ZeroSampleRate)
        ));
    }

    #[test]
    fn short_input_yields_empty_spectrogram() {
        // under one frame after 4x decimation
        let samples = vec![0.1; 4 * FFT_N - 8];
        let spec = spectrogram(&samples, 44100).unwrap();
        assert!(spec.is_empty());
    }

    #[test]
    fn frame_count_and_length_follow_hop_and_fft_size() {
        let spec = spectrogram(&tone(440.0, 44100, 2.0), 44100).unwrap();

        // 2 s at 44100 decimates to 22050 samples
        let expected = (22050 - FFT_N) / HOP + 1;
        assert_eq!(spec.len(), expected);
        for frame in spec.frames() {
            assert_eq!(frame.len(), FFT_N / 2);
        }
    }

    #[test]
    fn resolution_follows_effective_rate() {
        let spec = spectrogram(&tone(440.0, 44100, 1.0), 44100).unwrap();
        assert!((spec.freq_resolution() - 11025.0 / 1024.0).abs() < 1e-12);
        assert!((spec.frame_duration() - 512.0 / 11025.0).abs() < 1e-12);
    }

    #[test]
    fn tone_energy_lands_in_expected_bin() {
        let spec = spectrogram(&tone(440.0, 44100, 1.0), 44100).unwrap();
        let expected_bin = (440.0 / spec.freq_resolution()).round() as usize;

        for frame in spec.frames() {
            let peak_bin = frame
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert!(peak_bin.abs_diff(expected_bin) <= 1);
        }
    }

    #[test]
    fn magnitudes_are_non_negative() {
        let spec = spectrogram(&tone(1000.0, 44100, 0.5), 44100).unwrap();
        assert!(spec
            .frames()
            .iter()
            .all(|frame| frame.iter().all(|&m| m >= 0.0)));
    }
}

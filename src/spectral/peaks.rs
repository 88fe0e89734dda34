//! Band-wise peak extraction over the spectrogram.
//!
//! Each frame contributes at most one peak per band: the dominant bin of
//! every band survives only if it rises above the mean of the band maxima,
//! which adapts the threshold to the frame's overall energy.

use super::Spectrogram;

/// Frequency bands over bin indices, chosen so that low bands stay narrow
/// where the spectrum is dense and high bands widen with it.
const BANDS: [(usize, usize); 6] = [(0, 10), (10, 20), (20, 40), (40, 80), (80, 160), (160, 512)];

/// A point of interest in the time-frequency plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    /// Seconds from the start of the signal.
    pub time_sec: f64,
    /// Bin center frequency in Hz at the decimated rate.
    pub freq_hz: f64,
    /// Spectrogram bin index.
    pub freq_bin: u32,
}

/// Extract peaks frame by frame, in chronological order.
pub fn extract_peaks(spectrogram: &Spectrogram) -> Vec<Peak> {
    let frame_duration = spectrogram.frame_duration();
    let freq_resolution = spectrogram.freq_resolution();

    let mut peaks = Vec::new();

    for (frame_idx, frame) in spectrogram.frames().iter().enumerate() {
        // dominant bin per band; silent bands drop out
        let mut maxima: Vec<(usize, f64)> = Vec::with_capacity(BANDS.len());
        for &(lo, hi) in &BANDS {
            let mut best_bin = lo;
            let mut best_mag = -1.0;
            for (offset, &mag) in frame[lo..hi].iter().enumerate() {
                if mag > best_mag {
                    best_mag = mag;
                    best_bin = lo + offset;
                }
            }
            if best_mag > 0.0 {
                maxima.push((best_bin, best_mag));
            }
        }

        if maxima.is_empty() {
            continue;
        }

        let mean: f64 =
            maxima.iter().map(|&(_, mag)| mag).sum::<f64>() / maxima.len() as f64;

        for &(bin, mag) in &maxima {
            if mag > mean {
                peaks.push(Peak {
                    time_sec: frame_idx as f64 * frame_duration,
                    freq_hz: bin as f64 * freq_resolution,
                    freq_bin: bin as u32,
                });
            }
        }
    }

    peaks
}

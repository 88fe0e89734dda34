//! Signal conditioning ahead of the STFT.
//!
//! A single-pole IIR low-pass removes content above the anti-alias cutoff,
//! then a box-averaging decimator drops the rate by an integer ratio.

use crate::error::EngineError;

/// Single-pole IIR low-pass with transfer function `H(s) = 1 / (1 + sRC)`.
///
/// Output length equals input length; the filter state starts at zero, so
/// `y[0] = alpha * x[0]`.
pub fn low_pass_filter(cutoff_hz: f64, sample_rate: f64, input: &[f64]) -> Vec<f64> {
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate;
    let alpha = dt / (rc + dt);

    let mut filtered = Vec::with_capacity(input.len());
    let mut prev = 0.0;

    for &x in input {
        let y = alpha * x + (1.0 - alpha) * prev;
        filtered.push(y);
        prev = y;
    }

    filtered
}

/// Decimate `input` from `source_rate` to `target_rate` by averaging each
/// group of `source_rate / target_rate` consecutive samples.
///
/// The final group may be short and is averaged over the samples present.
pub fn decimate(
    input: &[f64],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f64>, EngineError> {
    if source_rate == 0 || target_rate == 0 {
        return Err(EngineError::ZeroSampleRate);
    }
    if target_rate > source_rate {
        return Err(EngineError::UpsampleRequested {
            source_rate,
            target: target_rate,
        });
    }

    let ratio = (source_rate / target_rate) as usize;

    let mut decimated = Vec::with_capacity(input.len() / ratio + 1);
    let mut position = 0;
    while position < input.len() {
        let end = (position + ratio).min(input.len());
        let sum: f64 = input[position..end].iter().sum();
        decimated.push(sum / (end - position) as f64);
        position += ratio;
    }

    Ok(decimated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_pass_first_sample_is_scaled_by_alpha() {
        let rc = 1.0 / (2.0 * std::f64::consts::PI * 5000.0);
        let dt = 1.0 / 44100.0;
        let alpha = dt / (rc + dt);

        let filtered = low_pass_filter(5000.0, 44100.0, &[1.0, 0.0, 0.0]);

        assert_eq!(filtered.len(), 3);
        assert!((filtered[0] - alpha).abs() < 1e-12);
    }

    #[test]
    fn low_pass_attenuates_high_frequency_more_than_low() {
        let sample_rate = 44100.0;
        let signal = |freq: f64| -> Vec<f64> {
            (0..4410)
                .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate).sin())
                .collect()
        };
        let rms = |xs: &[f64]| (xs.iter().map(|x| x * x).sum::<f64>() / xs.len() as f64).sqrt();

        let low = rms(&low_pass_filter(5000.0, sample_rate, &signal(200.0)));
        let high = rms(&low_pass_filter(5000.0, sample_rate, &signal(18000.0)));

        assert!(low > 2.0 * high);
    }

    #[test]
    fn decimate_averages_groups() {
        let input = [1.0, 3.0, 5.0, 7.0, 2.0, 4.0, 6.0, 8.0];

        let out = decimate(&input, 8, 2).unwrap();

        assert_eq!(out, vec![4.0, 5.0]);
    }

    #[test]
    fn decimate_averages_short_tail() {
        let input = [2.0, 4.0, 6.0, 8.0, 10.0];

        let out = decimate(&input, 4, 2).unwrap();

        // last group holds a single sample
        assert_eq!(out, vec![3.0, 7.0, 10.0]);
    }

    #[test]
    fn decimate_with_equal_rates_is_identity() {
        let input = [0.5, -0.5, 0.25];
        let out = decimate(&input, 44100, 44100).unwrap();
        assert_eq!(out, input.to_vec());
    }

    #[test]
    fn decimate_rejects_bad_rates() {
        assert!(matches!(
            decimate(&[1.0], 0, 1),
            Err(EngineError::ZeroSampleRate)
        ));
        assert!(matches!(
            decimate(&[1.0], 1, 0),
            Err(EngineError::ZeroSampleRate)
        ));
        assert!(matches!(
            decimate(&[1.0], 11025, 44100),
            Err(EngineError::UpsampleRequested { source_rate: 11025, target: 44100 })
        ));
    }
}

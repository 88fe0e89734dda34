//! Radix-2 Cooley-Tukey FFT over real-valued input.
//!
//! The spectrogram builder only ever consumes the first `N/2` output bins,
//! since for real input the upper half mirrors the lower (conjugate
//! symmetry).

use num_complex::Complex;
use std::f64::consts::PI;

use crate::error::EngineError;

/// Compute the DFT of a real-valued signal whose length is a power of two.
///
/// Returns the full complex spectrum of the same length as the input.
pub fn fft(input: &[f64]) -> Result<Vec<Complex<f64>>, EngineError> {
    if !input.len().is_power_of_two() {
        return Err(EngineError::FftLength(input.len()));
    }

    let buffer: Vec<Complex<f64>> = input.iter().map(|&x| Complex::new(x, 0.0)).collect();
    Ok(recursive_fft(&buffer))
}

fn recursive_fft(input: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let n = input.len();
    if n <= 1 {
        return input.to_vec();
    }

    let even: Vec<Complex<f64>> = input.iter().step_by(2).copied().collect();
    let odd: Vec<Complex<f64>> = input.iter().skip(1).step_by(2).copied().collect();

    // divide
    let even = recursive_fft(&even);
    let odd = recursive_fft(&odd);

    // combine with twiddle factors e^(-2*pi*i*k/n)
    let mut out = vec![Complex::new(0.0, 0.0); n];
    for k in 0..n / 2 {
        let theta = -2.0 * PI * k as f64 / n as f64;
        let twiddle = Complex::new(theta.cos(), theta.sin());
        let t = twiddle * odd[k];
        out[k] = even[k] + t;
        out[k + n / 2] = even[k] - t;
    }

    out
}

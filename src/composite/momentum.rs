//! Gaussian-windowed ink momentum.
//!
//! Momentum is how fast a channel is gaining (or losing) ink around a
//! sample: the absolute first difference of its normalized curve, smoothed
//! by a small Gaussian kernel and scaled so the peak is 1.

use crate::interpolation::clamp01;

/// Default half-width of the smoothing kernel.
pub const MOMENTUM_RADIUS: usize = 2;

/// Normalized Gaussian kernel of `2 * radius + 1` taps, sigma = radius / 1.5.
#[must_use]
pub fn gaussian_kernel(radius: usize) -> Vec<f64> {
    if radius == 0 {
        return vec![1.0];
    }
    let sigma = radius as f64 / 1.5;
    let r = radius as i64;
    let raw: Vec<f64> = (-r..=r)
        .map(|offset| (-((offset * offset) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / sum).collect()
}

/// Momentum series for a normalized curve, each value in `[0, 1]`.
///
/// A flat curve yields all zeros.
#[must_use]
pub fn momentum_series(normalized: &[f64], radius: usize) -> Vec<f64> {
    let n = normalized.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let samples: Vec<f64> = normalized.iter().map(|&v| clamp01(v)).collect();

    let mut deltas = vec![0.0; n];
    deltas[0] = samples[1] - samples[0];
    for i in 1..n {
        deltas[i] = samples[i] - samples[i - 1];
    }

    let kernel = gaussian_kernel(radius);
    let r = radius as i64;
    let mut out: Vec<f64> = (0..n as i64)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let idx = (i + k as i64 - r).clamp(0, n as i64 - 1) as usize;
                    w * deltas[idx].abs()
                })
                .sum()
        })
        .collect();

    let peak = out.iter().copied().fold(0.0_f64, f64::max);
    if peak <= 0.0 {
        return vec![0.0; n];
    }
    for v in &mut out {
        *v = clamp01(*v / peak);
    }
    out
}

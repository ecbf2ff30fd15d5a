//! Applying a correction LUT to an integer ink curve.
//!
//! Two strategies:
//!
//! - **Fixed domain**: every output value is pushed through the LUT as a
//!   normalized ink amount.
//! - **Active range**: the non-zero span of the base curve is remapped onto
//!   the non-zero span of the LUT targets, so a channel that only starts
//!   inking at 30% input keeps that onset after correction.

use serde::{Deserialize, Serialize};

use crate::interpolation::{LutCurve, clamp01};

/// How a LUT is applied to a base curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LutMode {
    /// Map each output value through the LUT.
    #[default]
    FixedDomain,
    /// Remap the base curve's active span onto the LUT's active span.
    ActiveRange,
}

/// Inclusive index span where a curve is above a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRange {
    /// First active index.
    pub start: usize,
    /// Last active index.
    pub end: usize,
}

impl ActiveRange {
    /// Number of index steps covered.
    #[must_use]
    pub fn span(&self) -> usize {
        self.end - self.start
    }
}

/// Find the first and last samples strictly above `threshold`.
#[must_use]
pub fn detect_active_range(curve: &[u32], threshold: u32) -> Option<ActiveRange> {
    let start = curve.iter().position(|&v| v > threshold)?;
    let end = curve.iter().rposition(|&v| v > threshold)?;
    Some(ActiveRange { start, end })
}

fn max_output(max_value: u32) -> f64 {
    f64::from(max_value.max(1))
}

/// Push every value through the LUT as a fraction of `max_value`.
#[must_use]
pub fn apply_lut_fixed_domain(values: &[u32], lut: &LutCurve, max_value: u32) -> Vec<u32> {
    let max = max_output(max_value);
    values
        .iter()
        .map(|&v| {
            let normalized = clamp01(f64::from(v) / max);
            (lut.evaluate_normalized(normalized) * max).round() as u32
        })
        .collect()
}

/// Sample the LUT at `resolution` evenly spaced inputs, scaled to `max_value`.
#[must_use]
pub fn linearization_targets(lut: &LutCurve, max_value: u32, resolution: usize) -> Vec<u32> {
    let max = max_output(max_value);
    (0..resolution)
        .map(|i| {
            let t = if resolution <= 1 { 0.0 } else { i as f64 / (resolution - 1) as f64 };
            (lut.evaluate_normalized(t) * max).round() as u32
        })
        .collect()
}

/// Stretch `targets`' active span across `base`'s active span.
///
/// Samples outside the base active range become zero. Either curve being
/// entirely inactive returns `base` unchanged.
#[must_use]
pub fn remap_active_range(base: &[u32], targets: &[u32], max_value: u32) -> Vec<u32> {
    if base.is_empty() || targets.is_empty() {
        return base.to_vec();
    }
    let (Some(base_range), Some(target_range)) = (detect_active_range(base, 0), detect_active_range(targets, 0)) else {
        return base.to_vec();
    };

    let max = max_output(max_value);
    let base_span = base_range.span().max(1) as f64;
    let target_span = target_range.span().max(1) as f64;
    let target_at = |idx: usize| f64::from(targets[idx.clamp(target_range.start, target_range.end)]);

    (0..base.len())
        .map(|i| {
            if i < base_range.start || i > base_range.end {
                return 0;
            }
            let fraction = (i - base_range.start) as f64 / base_span;
            let pos = target_range.start as f64 + fraction * target_span;
            let lower = pos.floor();
            let alpha = clamp01(pos - lower);
            let lower = lower as usize;
            let value = (1.0 - alpha) * target_at(lower) + alpha * target_at(lower + 1);
            value.clamp(0.0, max).round() as u32
        })
        .collect()
}

/// Active-range LUT application followed by monotone enforcement.
#[must_use]
pub fn apply_lut_active_range(values: &[u32], lut: &LutCurve, max_value: u32) -> Vec<u32> {
    if values.is_empty() {
        return Vec::new();
    }
    let targets = linearization_targets(lut, max_value, values.len());
    let mut remapped = remap_active_range(values, &targets, max_value);
    super::enforce_monotonic(&mut remapped);
    remapped
}

/// Apply a LUT with the given strategy.
#[must_use]
pub fn apply_lut(values: &[u32], lut: &LutCurve, max_value: u32, mode: LutMode) -> Vec<u32> {
    match mode {
        LutMode::FixedDomain => apply_lut_fixed_domain(values, lut, max_value),
        LutMode::ActiveRange => apply_lut_active_range(values, lut, max_value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::{InterpolationKind, LutDomain};

    fn lut(samples: &[f64]) -> LutCurve {
        LutCurve::prepare(samples, LutDomain::default(), InterpolationKind::Linear, 0.0, false).unwrap()
    }

    #[test]
    fn test_identity_lut_is_lossless() {
        let values: Vec<u32> = (0..256).map(|i| i * 100).collect();
        let out = apply_lut_fixed_domain(&values, &lut(&[0.0, 1.0]), 25500);
        assert_eq!(out, values);
    }

    #[test]
    fn test_fixed_domain_applies_gain() {
        let values = vec![0, 5000, 10000];
        let out = apply_lut_fixed_domain(&values, &lut(&[0.0, 0.25, 1.0]), 10000);
        assert_eq!(out, vec![0, 2500, 10000]);
    }

    #[test]
    fn test_detect_active_range() {
        assert_eq!(detect_active_range(&[0, 0, 3, 5, 0], 0), Some(ActiveRange { start: 2, end: 3 }));
        assert_eq!(detect_active_range(&[0, 0, 0], 0), None);
    }

    #[test]
    fn test_remap_preserves_onset() {
        let mut base = vec![0u32; 256];
        for (i, v) in base.iter_mut().enumerate().skip(100) {
            *v = ((i - 100) * 100) as u32;
        }
        let out = apply_lut_active_range(&base, &lut(&[0.0, 1.0]), 15500);
        assert!(out[..100].iter().all(|&v| v == 0));
        assert_eq!(out[255], 15500);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_remap_inactive_base_passes_through() {
        let base = vec![0u32; 16];
        assert_eq!(remap_active_range(&base, &[1, 2, 3], 100), base);
    }
}

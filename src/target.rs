//! Target density curves and raw measurement series.
//!
//! A target entry is either an explicit sample array spread over a domain or
//! an evaluator function that can be sampled at any resolution. Both resolve
//! to a 256-point normalized density curve before redistribution starts.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::CURVE_RESOLUTION;
use crate::error::{Error, Result};
use crate::interpolation::{InterpolationKind, LutCurve, LutDomain, clamp01};

/// Evenly spaced samples over `[domain_min, domain_max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSamples {
    /// Sample values (normalized density, clamped to `[0, 1]` on use).
    pub samples: Vec<f64>,

    /// Input coordinate of the first sample.
    #[serde(default)]
    pub domain_min: f64,

    /// Input coordinate of the last sample.
    #[serde(default = "default_domain_max")]
    pub domain_max: f64,
}

fn default_domain_max() -> f64 {
    1.0
}

impl TargetSamples {
    /// Samples over the unit domain.
    #[must_use]
    pub fn new(samples: Vec<f64>) -> Self {
        Self {
            samples,
            domain_min: 0.0,
            domain_max: 1.0,
        }
    }

    /// Set the domain bounds.
    #[must_use]
    pub fn with_domain(mut self, min: f64, max: f64) -> Self {
        self.domain_min = min;
        self.domain_max = max;
        self
    }

    /// Domain as a [`LutDomain`].
    #[must_use]
    pub fn domain(&self) -> LutDomain {
        LutDomain::new(self.domain_min, self.domain_max)
    }

    /// Check that the samples can be fitted.
    pub fn validate(&self) -> Result<()> {
        if self.samples.len() < 2 {
            return Err(Error::InvalidTarget(format!(
                "need at least 2 samples, got {}",
                self.samples.len()
            )));
        }
        if !self.domain_min.is_finite() || !self.domain_max.is_finite() {
            return Err(Error::InvalidTarget("domain bounds must be finite".to_string()));
        }
        Ok(())
    }

    /// Linearly resample to the curve resolution over the unit input range.
    ///
    /// Used for raw measurement series, which are never spline-fitted.
    #[must_use]
    pub fn resample_linear(&self) -> Option<Vec<f64>> {
        if self.validate().is_err() {
            return None;
        }
        let lut = LutCurve::prepare(
            &self.samples,
            self.domain(),
            InterpolationKind::Linear,
            0.0,
            false,
        )?;
        Some(sample_unit(|t| lut.evaluate_normalized(t)))
    }
}

/// Signature of an arbitrary-resolution target evaluator.
pub type TargetFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Where the target density curve comes from.
#[derive(Clone)]
pub enum TargetEntry {
    /// Explicit samples fitted with the session's interpolation kind.
    Samples(TargetSamples),

    /// A function of normalized input `t ∈ [0, 1]`.
    Evaluator(TargetFn),
}

impl TargetEntry {
    /// Explicit samples over the unit domain.
    #[must_use]
    pub fn samples(samples: Vec<f64>) -> Self {
        Self::Samples(TargetSamples::new(samples))
    }

    /// Wrap an evaluator function.
    #[must_use]
    pub fn evaluator(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::Evaluator(Arc::new(f))
    }

    /// Identity ramp (target density equals input).
    #[must_use]
    pub fn identity() -> Self {
        Self::evaluator(|t| t)
    }

    /// Check that the entry can be resolved.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Samples(samples) => samples.validate(),
            Self::Evaluator(_) => Ok(()),
        }
    }

    /// Resolve to a 256-point density curve in `[0, 1]`.
    ///
    /// Returns `None` when the entry is malformed (short sample array).
    #[must_use]
    pub fn resolve(&self, kind: InterpolationKind, smoothing_percent: f64) -> Option<Vec<f64>> {
        match self {
            Self::Samples(samples) => {
                samples.validate().ok()?;
                let lut = LutCurve::prepare(
                    &samples.samples,
                    samples.domain(),
                    kind,
                    smoothing_percent,
                    false,
                )?;
                Some(sample_unit(|t| lut.evaluate_normalized(t)))
            }
            Self::Evaluator(f) => Some(sample_unit(|t| clamp01(f(t)))),
        }
    }
}

impl fmt::Debug for TargetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Samples(samples) => f.debug_tuple("Samples").field(samples).finish(),
            Self::Evaluator(_) => f.write_str("Evaluator(..)"),
        }
    }
}

impl From<TargetSamples> for TargetEntry {
    fn from(samples: TargetSamples) -> Self {
        Self::Samples(samples)
    }
}

/// Evaluate `f` at every curve input `i / 255`.
fn sample_unit(f: impl Fn(f64) -> f64) -> Vec<f64> {
    let denom = (CURVE_RESOLUTION - 1) as f64;
    (0..CURVE_RESOLUTION).map(|i| f(i as f64 / denom)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_resolves_to_ramp() {
        let curve = TargetEntry::identity()
            .resolve(InterpolationKind::Cubic, 0.0)
            .unwrap();
        assert_eq!(curve.len(), CURVE_RESOLUTION);
        assert_eq!(curve[0], 0.0);
        assert!((curve[128] - 128.0 / 255.0).abs() < 1e-12);
        assert_eq!(curve[255], 1.0);
    }

    #[test]
    fn test_evaluator_output_is_clamped() {
        let curve = TargetEntry::evaluator(|t| 2.0 * t - 0.5)
            .resolve(InterpolationKind::Linear, 0.0)
            .unwrap();
        assert_eq!(curve[0], 0.0);
        assert_eq!(curve[255], 1.0);
    }

    #[test]
    fn test_short_samples_are_rejected() {
        let entry = TargetEntry::samples(vec![0.5]);
        assert!(entry.validate().is_err());
        assert!(entry.resolve(InterpolationKind::Linear, 0.0).is_none());
    }

    #[test]
    fn test_samples_with_percent_domain() {
        let entry: TargetEntry = TargetSamples::new(vec![0.0, 0.5, 1.0])
            .with_domain(0.0, 100.0)
            .into();
        let curve = entry.resolve(InterpolationKind::Linear, 0.0).unwrap();
        assert!((curve[51] - 51.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_resample_linear_length() {
        let measured = TargetSamples::new(vec![0.0, 0.3, 0.8, 1.0]);
        let series = measured.resample_linear().unwrap();
        assert_eq!(series.len(), CURVE_RESOLUTION);
        assert_eq!(series[255], 1.0);
    }
}

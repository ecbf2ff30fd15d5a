//! Tuning constants for composite redistribution.
//!
//! Every empirically tuned number the engine uses lives here as a named,
//! overridable field. Defaults reproduce the reference behaviour.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How per-channel density weights are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMode {
    /// Regularized least squares against the target.
    #[default]
    Normalized,
    /// Every active channel weighs 1.
    Equal,
    /// Least squares, with per-sample shares biased toward channels gaining ink fastest.
    Momentum,
    /// Least squares without momentum bias, channels keep part of their baseline.
    Isolated,
}

impl WeightingMode {
    /// Parse a mode name, falling back to [`WeightingMode::Normalized`].
    #[must_use]
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Mode name as accepted by [`FromStr`].
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normalized => "normalized",
            Self::Equal => "equal",
            Self::Momentum => "momentum",
            Self::Isolated => "isolated",
        }
    }

    /// Whether weights come from the least-squares solve.
    #[must_use]
    pub fn is_solved(&self) -> bool {
        !matches!(self, Self::Equal)
    }

    /// Whether decreases stop at the baseline-retention floor.
    #[must_use]
    pub fn retains_baseline(&self) -> bool {
        !matches!(self, Self::Normalized)
    }
}

impl FromStr for WeightingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normalized" => Ok(Self::Normalized),
            "equal" => Ok(Self::Equal),
            "momentum" => Ok(Self::Momentum),
            "isolated" => Ok(Self::Isolated),
            other => Err(Error::UnknownWeightingMode(other.to_string())),
        }
    }
}

impl fmt::Display for WeightingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hand-off smoothing window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingWindowConfig {
    /// Run the post-processor at all.
    pub enabled: bool,
    /// Fraction of the input range a window should cover.
    pub target_span: f64,
    /// Shortest window.
    pub min_samples: usize,
    /// Longest window.
    pub max_samples: usize,
    /// Attenuation exponent for the outgoing channel.
    pub alpha: f64,
    /// A contribution below this fraction of its prior peak counts as dropped.
    pub drop_ratio: f64,
    /// Consecutive dropped samples that mark a hand-off.
    pub sustain_samples: usize,
    /// Use the first clamp index of a channel as its hand-off.
    pub per_sample_ceiling: bool,
}

impl Default for SmoothingWindowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_span: 0.07,
            min_samples: 3,
            max_samples: 9,
            alpha: 1.5,
            drop_ratio: 0.6,
            sustain_samples: 2,
            per_sample_ceiling: false,
        }
    }
}

impl SmoothingWindowConfig {
    /// Window length for a curve of `resolution` samples.
    #[must_use]
    pub fn window_len(&self, resolution: usize) -> usize {
        let lo = self.min_samples.max(1);
        let hi = self.max_samples.max(lo);
        let span = if self.target_span.is_finite() { self.target_span.max(0.0) } else { 0.0 };
        ((span * resolution as f64).round() as usize).clamp(lo, hi)
    }
}

/// Composite redistribution constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    /// Deltas at or below this are a no-op.
    pub delta_epsilon: f64,
    /// Retry budget per sample, multiplied by the channel count.
    pub retry_factor: usize,
    /// Capacity below this does not count as exploitable.
    pub capacity_threshold: f64,

    /// Ridge strength relative to the mean diagonal of the normal matrix.
    pub ridge: f64,
    /// Pivots below this make the weight system singular.
    pub pivot_tolerance: f64,
    /// Smallest density weight.
    pub min_density: f64,
    /// Largest density weight.
    pub max_density: f64,
    /// Slack above each channel's coverage limit.
    pub coverage_buffer: f64,

    /// Front reserve withheld near a channel's ceiling.
    pub front_reserve_max_normalized: f64,
    /// A darker channel needs this much headroom for the reserve to hold.
    pub front_reserve_darker_headroom: f64,
    /// Headroom within this multiple of the reserve counts as approaching.
    pub reserve_approach_ratio: f64,
    /// Headroom at or below this releases the reserve.
    pub reserve_exhausted_epsilon: f64,
    /// Fraction of the reserve released while approaching.
    pub reserve_approaching_allowance: f64,
    /// Fraction of the reserve released once within it.
    pub reserve_within_allowance: f64,

    /// Samples over which a newly unlocked channel ramps its gain.
    pub ladder_blend_window: usize,
    /// Per-sample gain growth at the end of the ramp.
    pub ladder_blend_cap_step: f64,
    /// Samples over which a newly unlocked channel ramps its loss.
    pub shadow_blend_window: usize,
    /// Per-sample loss growth at the end of the ramp.
    pub shadow_blend_cap_step: f64,
    /// Scale applied to the loss ramp.
    pub shadow_blend_share: f64,

    /// Exponent applied to capacity when weighting candidates.
    pub capacity_bias_exponent: f64,
    /// Density at or below which a sample counts as highlight.
    pub highlight_density_threshold: f64,
    /// Highlight deltas below this are ignored.
    pub highlight_delta_tolerance: f64,
    /// Fraction of the baseline a channel keeps under decreases outside normalized mode.
    pub isolated_retention: f64,

    /// Hand-off smoothing.
    pub smoothing: SmoothingWindowConfig,
    /// Record per-sample channel state.
    pub capture_snapshots: bool,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            delta_epsilon: 1e-6,
            retry_factor: 4,
            capacity_threshold: 1e-4,
            ridge: 1e-6,
            pivot_tolerance: 1e-12,
            min_density: 0.01,
            max_density: 2.0,
            coverage_buffer: 0.005,
            front_reserve_max_normalized: 0.05,
            front_reserve_darker_headroom: 0.10,
            reserve_approach_ratio: 1.5,
            reserve_exhausted_epsilon: 1e-3,
            reserve_approaching_allowance: 0.25,
            reserve_within_allowance: 0.5,
            ladder_blend_window: 6,
            ladder_blend_cap_step: 0.02,
            shadow_blend_window: 6,
            shadow_blend_cap_step: 0.02,
            shadow_blend_share: 0.5,
            capacity_bias_exponent: 1.5,
            highlight_density_threshold: 0.02,
            highlight_delta_tolerance: 0.002,
            isolated_retention: 0.5,
            smoothing: SmoothingWindowConfig::default(),
            capture_snapshots: false,
        }
    }
}

fn check(field: &'static str, ok: bool, reason: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidConfig {
            field,
            reason: reason.to_string(),
        })
    }
}

fn unit(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

impl CompositeConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> CompositeConfigBuilder {
        CompositeConfigBuilder::default()
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        check("delta_epsilon", non_negative(self.delta_epsilon), "must be finite and >= 0")?;
        check("retry_factor", self.retry_factor >= 1, "must be at least 1")?;
        check("capacity_threshold", non_negative(self.capacity_threshold), "must be finite and >= 0")?;
        check("ridge", non_negative(self.ridge), "must be finite and >= 0")?;
        check("pivot_tolerance", non_negative(self.pivot_tolerance), "must be finite and >= 0")?;
        check(
            "min_density",
            self.min_density.is_finite() && self.min_density > 0.0,
            "must be finite and > 0",
        )?;
        check(
            "max_density",
            self.max_density.is_finite() && self.max_density >= self.min_density,
            "must be finite and >= min_density",
        )?;
        check("coverage_buffer", non_negative(self.coverage_buffer), "must be finite and >= 0")?;
        check("front_reserve_max_normalized", unit(self.front_reserve_max_normalized), "must be in [0, 1]")?;
        check("front_reserve_darker_headroom", unit(self.front_reserve_darker_headroom), "must be in [0, 1]")?;
        check(
            "reserve_approach_ratio",
            self.reserve_approach_ratio.is_finite() && self.reserve_approach_ratio >= 1.0,
            "must be finite and >= 1",
        )?;
        check("reserve_exhausted_epsilon", unit(self.reserve_exhausted_epsilon), "must be in [0, 1]")?;
        check("reserve_approaching_allowance", unit(self.reserve_approaching_allowance), "must be in [0, 1]")?;
        check("reserve_within_allowance", unit(self.reserve_within_allowance), "must be in [0, 1]")?;
        check("ladder_blend_window", self.ladder_blend_window >= 1, "must be at least 1")?;
        check("ladder_blend_cap_step", non_negative(self.ladder_blend_cap_step), "must be finite and >= 0")?;
        check("shadow_blend_window", self.shadow_blend_window >= 1, "must be at least 1")?;
        check("shadow_blend_cap_step", non_negative(self.shadow_blend_cap_step), "must be finite and >= 0")?;
        check("shadow_blend_share", unit(self.shadow_blend_share), "must be in [0, 1]")?;
        check("capacity_bias_exponent", non_negative(self.capacity_bias_exponent), "must be finite and >= 0")?;
        check("highlight_density_threshold", unit(self.highlight_density_threshold), "must be in [0, 1]")?;
        check("highlight_delta_tolerance", non_negative(self.highlight_delta_tolerance), "must be finite and >= 0")?;
        check("isolated_retention", unit(self.isolated_retention), "must be in [0, 1]")?;

        let s = &self.smoothing;
        check("smoothing.target_span", unit(s.target_span), "must be in [0, 1]")?;
        check("smoothing.min_samples", s.min_samples >= 1, "must be at least 1")?;
        check("smoothing.max_samples", s.max_samples >= s.min_samples, "must be >= min_samples")?;
        check("smoothing.alpha", s.alpha.is_finite() && s.alpha > 0.0, "must be finite and > 0")?;
        check("smoothing.drop_ratio", unit(s.drop_ratio), "must be in [0, 1]")?;
        check("smoothing.sustain_samples", s.sustain_samples >= 1, "must be at least 1")?;
        Ok(())
    }
}

/// Builder for [`CompositeConfig`].
#[derive(Debug, Default)]
pub struct CompositeConfigBuilder {
    config: CompositeConfig,
}

impl CompositeConfigBuilder {
    /// Set the no-op delta threshold.
    #[must_use]
    pub fn delta_epsilon(mut self, value: f64) -> Self {
        self.config.delta_epsilon = value;
        self
    }

    /// Set the per-channel retry factor.
    #[must_use]
    pub fn retry_factor(mut self, value: usize) -> Self {
        self.config.retry_factor = value;
        self
    }

    /// Set the coverage buffer.
    #[must_use]
    pub fn coverage_buffer(mut self, value: f64) -> Self {
        self.config.coverage_buffer = value;
        self
    }

    /// Set the front reserve size.
    #[must_use]
    pub fn front_reserve(mut self, value: f64) -> Self {
        self.config.front_reserve_max_normalized = value;
        self
    }

    /// Set the ladder blend window and step.
    #[must_use]
    pub fn ladder_blend(mut self, window: usize, step: f64) -> Self {
        self.config.ladder_blend_window = window;
        self.config.ladder_blend_cap_step = step;
        self
    }

    /// Set the shadow blend window, step and share.
    #[must_use]
    pub fn shadow_blend(mut self, window: usize, step: f64, share: f64) -> Self {
        self.config.shadow_blend_window = window;
        self.config.shadow_blend_cap_step = step;
        self.config.shadow_blend_share = share;
        self
    }

    /// Set the baseline retention fraction.
    #[must_use]
    pub fn isolated_retention(mut self, value: f64) -> Self {
        self.config.isolated_retention = value;
        self
    }

    /// Set the smoothing window settings.
    #[must_use]
    pub fn smoothing(mut self, smoothing: SmoothingWindowConfig) -> Self {
        self.config.smoothing = smoothing;
        self
    }

    /// Disable the smoothing post-processor.
    #[must_use]
    pub fn without_smoothing(mut self) -> Self {
        self.config.smoothing.enabled = false;
        self
    }

    /// Enable per-sample snapshots.
    #[must_use]
    pub fn capture_snapshots(mut self, enabled: bool) -> Self {
        self.config.capture_snapshots = enabled;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> CompositeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        CompositeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_weighting_mode_parsing() {
        assert_eq!("Equal".parse::<WeightingMode>().unwrap(), WeightingMode::Equal);
        assert_eq!("momentum".parse::<WeightingMode>().unwrap(), WeightingMode::Momentum);
        assert!("bogus".parse::<WeightingMode>().is_err());
        assert_eq!(WeightingMode::parse_or_default("bogus"), WeightingMode::Normalized);
        assert_eq!(WeightingMode::parse_or_default("isolated"), WeightingMode::Isolated);
    }

    #[test]
    fn test_builder() {
        let config = CompositeConfig::builder()
            .ladder_blend(8, 0.03)
            .without_smoothing()
            .capture_snapshots(true)
            .build();
        assert_eq!(config.ladder_blend_window, 8);
        assert_eq!(config.ladder_blend_cap_step, 0.03);
        assert!(!config.smoothing.enabled);
        assert!(config.capture_snapshots);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CompositeConfig::builder().retry_factor(0).build();
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { field: "retry_factor", .. })
        ));

        let config = CompositeConfig {
            shadow_blend_share: 1.5,
            ..CompositeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_len() {
        let smoothing = SmoothingWindowConfig::default();
        assert_eq!(smoothing.window_len(256), 9);

        let narrow = SmoothingWindowConfig {
            target_span: 0.0,
            ..SmoothingWindowConfig::default()
        };
        assert_eq!(narrow.window_len(256), 3);
    }
}

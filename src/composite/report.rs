//! Result and diagnostic types for composite redistribution.
//!
//! Everything here is plain data with serde derives so a finished run can be
//! saved as JSON and inspected later without re-running the engine.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::capacity::ReserveState;
use super::config::WeightingMode;
use super::solver::WeightSource;
use crate::error::Result;
use crate::{CURVE_RESOLUTION, TOTAL_INK};

/// Sample index nearest to an input percentage.
#[must_use]
pub fn sample_index_for_percent(input_percent: f64) -> usize {
    let pct = if input_percent.is_finite() { input_percent.clamp(0.0, 100.0) } else { 0.0 };
    ((pct / 100.0) * (CURVE_RESOLUTION - 1) as f64).round() as usize
}

/// Input percentage of a sample index.
#[must_use]
pub fn input_percent(index: usize) -> f64 {
    index as f64 / (CURVE_RESOLUTION - 1) as f64 * 100.0
}

//============================================================================
// Coverage
//============================================================================

/// A correction request that could not be applied in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClampEvent {
    /// Sample index.
    pub index: usize,
    /// Input position in percent.
    pub input_percent: f64,
    /// Normalized value before this sample's correction.
    pub normalized_before: f64,
    /// Normalized value actually reached.
    pub normalized_after: f64,
    /// Normalized value the correction asked for.
    pub desired_normalized_after: f64,
    /// `desired - after` (normalized; negative for decreases).
    pub overflow: f64,
    /// Coverage ceiling (fraction of total ink).
    pub limit: f64,
    /// Ceiling plus buffer.
    pub buffered_limit: f64,
    /// Stopped by the coverage ceiling, the front reserve or the retention floor.
    pub truncated_by_threshold: bool,
    /// Stopped by the end value (or zero ink).
    pub truncated_by_end: bool,
    /// Stopped by a ladder or shadow blend ramp.
    pub truncated_by_blend: bool,
}

impl ClampEvent {
    /// Merge flags and the latest outcome of a repeated clamp at the same sample.
    pub fn merge(&mut self, other: &ClampEvent) {
        self.normalized_after = other.normalized_after;
        self.desired_normalized_after = other.desired_normalized_after;
        self.overflow = other.overflow;
        self.truncated_by_threshold |= other.truncated_by_threshold;
        self.truncated_by_end |= other.truncated_by_end;
        self.truncated_by_blend |= other.truncated_by_blend;
    }
}

/// Coverage usage of one channel over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCoverage {
    /// Channel name.
    pub channel: String,
    /// Coverage ceiling (fraction of total ink).
    pub limit: f64,
    /// Slack above the ceiling.
    pub buffer: f64,
    /// Ceiling plus slack.
    pub buffered_limit: f64,
    /// Peak usage (value / total ink) of the final curve.
    pub max_normalized: f64,
    /// Ink units above the buffered ceiling (0 when respected).
    pub overflow: f64,
    /// `overflow` as a fraction of total ink.
    pub overflow_normalized: f64,
    /// Number of clamp events.
    pub clamp_count: usize,
    /// Clamp events in sample order.
    pub clamped_samples: Vec<ClampEvent>,
}

impl ChannelCoverage {
    /// Fill usage figures from a final curve.
    pub fn record_usage(&mut self, curve: &[u32]) {
        let total = f64::from(TOTAL_INK);
        let peak = f64::from(curve.iter().copied().max().unwrap_or(0));
        self.max_normalized = peak / total;
        self.overflow = (peak - self.buffered_limit * total).max(0.0);
        self.overflow_normalized = self.overflow / total;
        self.clamp_count = self.clamped_samples.len();
    }
}

/// Coverage of every channel in a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// One entry per channel, in request order.
    pub channels: Vec<ChannelCoverage>,
}

impl CoverageSummary {
    /// Entry for a channel.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&ChannelCoverage> {
        self.channels.iter().find(|c| c.channel == name)
    }

    /// No run has produced data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Clamp events across all channels.
    #[must_use]
    pub fn total_clamp_events(&self) -> usize {
        self.channels.iter().map(|c| c.clamp_count).sum()
    }
}

//============================================================================
// Per-sample profile
//============================================================================

/// What the iterator did at a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleAction {
    /// Delta within epsilon.
    Unchanged,
    /// Small highlight delta ignored.
    Highlight,
    /// Measurement already at or past target; kept at baseline.
    Reverted,
    /// Measurement and model disagree in direction; no correction.
    Held,
    /// Delta fully absorbed.
    Corrected,
    /// Delta only partly absorbed.
    Saturated,
}

/// Per-sample record of target, realized density and per-channel shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleProfile {
    /// Sample index.
    pub index: usize,
    /// Input position in percent.
    pub input_percent: f64,
    /// Target density.
    pub target: f64,
    /// Raw measurement, when supplied.
    pub measurement: Option<f64>,
    /// Modelled density the sample started from (baseline lifted to the previous sample).
    pub density_before: f64,
    /// Modelled density after correction.
    pub density_after: f64,
    /// Correction requested (density units).
    pub requested_delta: f64,
    /// Correction applied (density units).
    pub applied_delta: f64,
    /// Target increment from the previous sample.
    pub density_delta: f64,
    /// Share of `density_delta` per channel.
    pub shares: BTreeMap<String, f64>,
    /// Iterator outcome.
    pub action: SampleAction,
}

/// One channel's view of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelDensity {
    /// Share of the sample's density delta.
    pub share: f64,
    /// Density weight.
    pub constant: f64,
    /// `weight × normalized` at the sample.
    pub cumulative: f64,
}

/// Density profile lookup result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DensityProfileEntry {
    /// Sample index used.
    pub index: usize,
    /// Input position requested.
    pub input_percent: f64,
    /// Target increment at the sample.
    pub density_delta: f64,
    /// Per-channel figures (empty when no run exists).
    pub channels: BTreeMap<String, ChannelDensity>,
}

impl DensityProfileEntry {
    /// Result when no run has happened.
    #[must_use]
    pub fn neutral(input_percent: f64) -> Self {
        Self {
            index: sample_index_for_percent(input_percent),
            input_percent,
            density_delta: 0.0,
            channels: BTreeMap::new(),
        }
    }
}

//============================================================================
// Snapshots
//============================================================================

/// State of one channel while a sample was processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSampleState {
    /// Channel name.
    pub channel: String,
    /// Value after the sample (ink units, unrounded).
    pub value: f64,
    /// Normalized value after the sample.
    pub normalized: f64,
    /// Room below the end value before the sample.
    pub headroom: f64,
    /// Headroom minus outstanding reserve.
    pub effective_headroom: f64,
    /// Capacity in the delta direction before the sample.
    pub capacity_before: f64,
    /// Capacity in the delta direction after the sample.
    pub capacity_after: f64,
    /// Prior density share.
    pub share: f64,
    /// Larger of the baseline and the highest darker-channel value.
    pub ladder_floor: f64,
    /// Reserve state before the sample.
    pub reserve_state: ReserveState,
    /// Blend cap in force, if ramping.
    pub blend_cap: Option<f64>,
    /// Movement applied (normalized).
    pub applied: f64,
}

/// Everything the iterator saw at one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSnapshot {
    /// Sample index.
    pub index: usize,
    /// Target density.
    pub target: f64,
    /// Density before correction.
    pub density_before: f64,
    /// Correction requested.
    pub delta: f64,
    /// Retry rounds used.
    pub rounds: usize,
    /// Per-channel state.
    pub channels: Vec<ChannelSampleState>,
}

//============================================================================
// Result
//============================================================================

/// Hand-off window applied by the smoothing post-processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingWindow {
    /// Channel handing density off.
    pub outgoing: String,
    /// Channels taking it over.
    pub incoming: Vec<String>,
    /// Detected hand-off sample.
    pub handoff_index: usize,
    /// First sample of the window.
    pub start: usize,
    /// Last sample of the window (inclusive).
    pub end: usize,
}

/// Density weight of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityWeight {
    /// Channel name.
    pub channel: String,
    /// Weight.
    pub weight: f64,
    /// Origin of the weight.
    pub source: WeightSource,
    /// End value.
    pub end_value: u32,
    /// Position in the ladder (None when inactive).
    pub ladder_index: Option<usize>,
}

/// Residual between realized and target density.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResidualStats {
    /// Mean absolute residual.
    pub mean_abs: f64,
    /// Largest absolute residual.
    pub max_abs: f64,
    /// Sample of the largest residual.
    pub max_index: usize,
}

impl ResidualStats {
    /// Compute from realized and target series.
    #[must_use]
    pub fn from_series(realized: &[f64], target: &[f64]) -> Self {
        let mut stats = Self::default();
        let n = realized.len().min(target.len());
        if n == 0 {
            return stats;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let r = (realized[i] - target[i]).abs();
            sum += r;
            if r > stats.max_abs {
                stats.max_abs = r;
                stats.max_index = i;
            }
        }
        stats.mean_abs = sum / n as f64;
        stats
    }
}

/// Output of a finalized composite session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    /// Corrected curves (256 samples, monotonic, within `[0, end]`).
    pub curves: BTreeMap<String, Vec<u32>>,
    /// Human-readable notices.
    pub warnings: Vec<String>,
    /// Index of each curve's peak.
    pub peak_indices: BTreeMap<String, usize>,
    /// Weights in ladder order, inactive channels last.
    pub density_weights: Vec<DensityWeight>,
    /// Channel names lightest first.
    pub ladder: Vec<String>,
    /// Weighting mode used.
    pub weighting_mode: WeightingMode,
    /// Measured series, or the baseline density when none was supplied.
    pub measurement_samples: Vec<f64>,
    /// Target density per sample.
    pub target: Vec<f64>,
    /// Per-sample record.
    pub profiles: Vec<SampleProfile>,
    /// Coverage usage and clamp events.
    pub coverage: CoverageSummary,
    /// Hand-off windows applied.
    pub smoothing_windows: Vec<SmoothingWindow>,
    /// Total density correction per channel after smoothing.
    pub contribution_totals: BTreeMap<String, f64>,
    /// Peak momentum per channel (momentum mode).
    pub momentum_peaks: BTreeMap<String, f64>,
    /// Per-sample snapshots, when captured.
    #[serde(default)]
    pub snapshots: Vec<SampleSnapshot>,
    /// Residual against the target.
    pub residual: ResidualStats,
    /// When the session was finalized.
    #[serde(with = "chrono_serde")]
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl CompositeResult {
    /// Per-channel share, weight and cumulative density at the nearest sample.
    #[must_use]
    pub fn density_profile(&self, input_percent: f64) -> DensityProfileEntry {
        let index = sample_index_for_percent(input_percent);
        let Some(profile) = self.profiles.get(index) else {
            return DensityProfileEntry::neutral(input_percent);
        };

        let channels = self
            .density_weights
            .iter()
            .filter(|w| w.ladder_index.is_some())
            .map(|w| {
                let normalized = match (self.curves.get(&w.channel), w.end_value) {
                    (Some(curve), end) if end > 0 => f64::from(curve[index]) / f64::from(end),
                    _ => 0.0,
                };
                let density = ChannelDensity {
                    share: profile.shares.get(&w.channel).copied().unwrap_or(0.0),
                    constant: w.weight,
                    cumulative: w.weight * normalized,
                };
                (w.channel.clone(), density)
            })
            .collect();

        DensityProfileEntry {
            index,
            input_percent,
            density_delta: profile.density_delta,
            channels,
        }
    }

    /// Coverage usage and clamp events.
    #[must_use]
    pub fn coverage_summary(&self) -> &CoverageSummary {
        &self.coverage
    }

    /// Weight of a channel.
    #[must_use]
    pub fn weight(&self, channel: &str) -> Option<f64> {
        self.density_weights.iter().find(|w| w.channel == channel).map(|w| w.weight)
    }

    /// Modelled density `Σ weight × normalized` of the final curves at a sample.
    #[must_use]
    pub fn realized_density(&self, index: usize) -> f64 {
        self.density_weights
            .iter()
            .filter(|w| w.end_value > 0)
            .filter_map(|w| {
                let curve = self.curves.get(&w.channel)?;
                Some(w.weight * f64::from(*curve.get(index)?) / f64::from(w.end_value))
            })
            .sum()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write pretty JSON to a file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a result saved with [`save_json`](Self::save_json).
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_index_for_percent() {
        assert_eq!(sample_index_for_percent(0.0), 0);
        assert_eq!(sample_index_for_percent(50.0), 128);
        assert_eq!(sample_index_for_percent(100.0), 255);
        assert_eq!(sample_index_for_percent(150.0), 255);
        assert_eq!(sample_index_for_percent(f64::NAN), 0);
    }

    #[test]
    fn test_residual_stats() {
        let stats = ResidualStats::from_series(&[0.1, 0.5, 0.9], &[0.1, 0.4, 1.0]);
        assert!((stats.max_abs - 0.1).abs() < 1e-12);
        assert!((stats.mean_abs - 0.2 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_channel_coverage_usage() {
        let mut coverage = ChannelCoverage {
            channel: "LK".to_string(),
            limit: 0.2,
            buffer: 0.005,
            buffered_limit: 0.205,
            max_normalized: 0.0,
            overflow: 0.0,
            overflow_normalized: 0.0,
            clamp_count: 0,
            clamped_samples: Vec::new(),
        };
        coverage.record_usage(&[0, 6553, 13107]);
        assert!((coverage.max_normalized - 0.2).abs() < 1e-6);
        assert_eq!(coverage.overflow, 0.0);

        coverage.record_usage(&[0, 20000]);
        assert!(coverage.overflow > 0.0);
        assert!((coverage.overflow_normalized - (20000.0 / 65535.0 - 0.205)).abs() < 1e-9);
    }

    #[test]
    fn test_neutral_profile() {
        let entry = DensityProfileEntry::neutral(50.0);
        assert_eq!(entry.index, 128);
        assert!(entry.channels.is_empty());
    }

    #[test]
    fn test_clamp_event_merge() {
        let mut first = ClampEvent {
            index: 10,
            input_percent: input_percent(10),
            normalized_before: 0.5,
            normalized_after: 0.6,
            desired_normalized_after: 0.7,
            overflow: 0.1,
            limit: 0.3,
            buffered_limit: 0.305,
            truncated_by_threshold: true,
            truncated_by_end: false,
            truncated_by_blend: false,
        };
        let second = ClampEvent {
            normalized_after: 0.65,
            truncated_by_threshold: false,
            truncated_by_end: true,
            ..first.clone()
        };
        first.merge(&second);
        assert_eq!(first.normalized_after, 0.65);
        assert!(first.truncated_by_threshold && first.truncated_by_end);
    }
}

//! Composite redistribution session.
//!
//! This module provides [`CompositeSession`], which owns all working state of
//! one redistribution pass, and [`CompositeEngine`], which runs sessions and
//! keeps the last finalized result for diagnostic reads.
//!
//! A session is created with [`CompositeSession::begin`], fed one baseline
//! curve per channel with [`register_base`](CompositeSession::register_base),
//! and then consumed by [`finalize`](CompositeSession::finalize) (or dropped
//! with [`abort`](CompositeSession::abort)). Malformed input never fails the
//! pass: the session goes inactive and finalizes to the baseline curves plus
//! a warning.

use std::collections::{BTreeMap, HashSet};

use super::config::{CompositeConfig, WeightingMode};
use super::ladder::Ladder;
use super::redistribute::{ChannelInfo, Redistributor, SampleInput};
use super::report::{
    ChannelCoverage, ClampEvent, CompositeResult, CoverageSummary, DensityProfileEntry, DensityWeight,
    ResidualStats, SampleAction, SampleProfile, SmoothingWindow, input_percent,
};
use super::smoothing::{SmoothingContext, apply_smoothing_windows};
use super::solver::{SolverInput, normalize_curve, solve_density_weights};
use crate::curve::{CurveSynthesizer, enforce_monotonic, peak_index};
use crate::error::{Error, Result};
use crate::interpolation::InterpolationKind;
use crate::target::{TargetEntry, TargetSamples};
use crate::{CURVE_RESOLUTION, TOTAL_INK};

/// A channel taking part in redistribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Channel name.
    pub name: String,
    /// End value (ink ceiling).
    pub end_value: u32,
}

impl ChannelSpec {
    /// Create a channel spec.
    #[must_use]
    pub fn new(name: impl Into<String>, end_value: u32) -> Self {
        Self {
            name: name.into(),
            end_value,
        }
    }
}

/// Everything a session needs besides the baseline curves.
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    /// Channels in caller order.
    pub channels: Vec<ChannelSpec>,
    /// Target density.
    pub target: TargetEntry,
    /// Raw measured density, if any.
    pub measurement: Option<TargetSamples>,
    /// Interpolation used to fit sampled targets.
    pub interpolation: InterpolationKind,
    /// Smoothing applied to sampled targets before fitting.
    pub smoothing_percent: f64,
    /// How density weights are derived.
    pub weighting: WeightingMode,
    /// Manual density weights by channel name.
    pub manual_densities: BTreeMap<String, f64>,
}

impl CompositeRequest {
    /// Create a request with default interpolation and weighting.
    #[must_use]
    pub fn new(channels: Vec<ChannelSpec>, target: TargetEntry) -> Self {
        Self {
            channels,
            target,
            measurement: None,
            interpolation: InterpolationKind::Cubic,
            smoothing_percent: 0.0,
            weighting: WeightingMode::default(),
            manual_densities: BTreeMap::new(),
        }
    }

    /// Attach a measured density series.
    #[must_use]
    pub fn with_measurement(mut self, measurement: TargetSamples) -> Self {
        self.measurement = Some(measurement);
        self
    }

    /// Set the target interpolation.
    #[must_use]
    pub fn with_interpolation(mut self, kind: InterpolationKind, smoothing_percent: f64) -> Self {
        self.interpolation = kind;
        self.smoothing_percent = smoothing_percent;
        self
    }

    /// Set the weighting mode.
    #[must_use]
    pub fn with_weighting(mut self, mode: WeightingMode) -> Self {
        self.weighting = mode;
        self
    }

    /// Fix a channel's density weight.
    #[must_use]
    pub fn with_manual_density(mut self, channel: impl Into<String>, weight: f64) -> Self {
        self.manual_densities.insert(channel.into(), weight);
        self
    }
}

/// Working state of one redistribution pass.
#[derive(Debug)]
pub struct CompositeSession {
    active: bool,
    config: CompositeConfig,
    request: CompositeRequest,
    index: BTreeMap<String, usize>,
    target: Vec<f64>,
    measurement: Option<Vec<f64>>,
    bases: Vec<Option<Vec<u32>>>,
    warnings: Vec<String>,
}

impl CompositeSession {
    /// Start a session.
    ///
    /// Malformed input (no channels, duplicate names, unusable target) yields
    /// an inactive session that finalizes to its baseline curves.
    #[must_use]
    pub fn begin(request: CompositeRequest, config: &CompositeConfig) -> Self {
        let mut warnings = Vec::new();
        let mut active = true;

        let config = match config.validate() {
            Ok(()) => config.clone(),
            Err(e) => {
                warnings.push(format!("{e}; using default configuration"));
                CompositeConfig::default()
            }
        };

        let mut index = BTreeMap::new();
        for (i, spec) in request.channels.iter().enumerate() {
            if index.insert(spec.name.clone(), i).is_some() {
                warnings.push(format!("duplicate channel {}", spec.name));
                active = false;
            }
        }
        if request.channels.is_empty() {
            warnings.push("no channels to redistribute".to_string());
            active = false;
        }

        let target = match request.target.resolve(request.interpolation, request.smoothing_percent) {
            Some(target) => target,
            None => {
                warnings.push("target is unusable; curves left unchanged".to_string());
                active = false;
                Vec::new()
            }
        };

        let measurement = request.measurement.as_ref().and_then(|m| {
            let resampled = m.resample_linear();
            if resampled.is_none() {
                warnings.push("measurement series is unusable and was ignored".to_string());
            }
            resampled
        });

        for w in &warnings {
            log::warn!("{w}");
        }
        log::debug!(
            "composite session begin: {} channels, mode {}, measurement {}",
            request.channels.len(),
            request.weighting,
            measurement.is_some()
        );

        let bases = vec![None; request.channels.len()];
        Self {
            active,
            config,
            request,
            index,
            target,
            measurement,
            bases,
            warnings,
        }
    }

    /// Whether the session will redistribute on finalize.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Notices collected so far.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Register a channel's baseline curve.
    ///
    /// The curve must have 256 samples. Values above the end value are
    /// clamped and the curve is made monotonic, with a warning when either
    /// changed anything.
    pub fn register_base(&mut self, channel: &str, curve: &[u32]) -> Result<()> {
        let Some(&c) = self.index.get(channel) else {
            return Err(Error::InvalidChannel {
                channel: channel.to_string(),
                reason: "not part of this session".to_string(),
            });
        };
        if curve.len() != CURVE_RESOLUTION {
            return Err(Error::InvalidChannel {
                channel: channel.to_string(),
                reason: format!("expected {CURVE_RESOLUTION} samples, got {}", curve.len()),
            });
        }

        let end = self.request.channels[c].end_value;
        let mut base: Vec<u32> = curve.iter().map(|&v| v.min(end)).collect();
        enforce_monotonic(&mut base);
        if base.as_slice() != curve {
            let msg = format!("{channel}: baseline clamped to end value {end} and made monotonic");
            log::warn!("{msg}");
            self.warnings.push(msg);
        }
        self.bases[c] = Some(base);
        Ok(())
    }

    /// Discard the session without producing curves.
    pub fn abort(self) {
        log::debug!("composite session aborted");
    }

    /// Run the redistribution and produce the result.
    #[must_use]
    pub fn finalize(mut self) -> CompositeResult {
        let names: Vec<String> = self.request.channels.iter().map(|c| c.name.clone()).collect();
        let end_values: Vec<u32> = self.request.channels.iter().map(|c| c.end_value).collect();

        let mut baselines = Vec::with_capacity(names.len());
        for (c, base) in self.bases.iter().enumerate() {
            match base {
                Some(base) => baselines.push(base.clone()),
                None => {
                    self.warnings.push(format!("{}: no baseline registered; treated as empty", names[c]));
                    baselines.push(vec![0; CURVE_RESOLUTION]);
                }
            }
        }

        if !self.active {
            return self.pass_through(&names, &end_values, baselines);
        }

        let manual: Vec<Option<f64>> = names
            .iter()
            .map(|n| self.request.manual_densities.get(n).copied())
            .collect();
        for name in self.request.manual_densities.keys() {
            if !self.index.contains_key(name) {
                self.warnings.push(format!("manual density for unknown channel {name} ignored"));
            }
        }

        let config = &self.config;
        let mode = self.request.weighting;
        let solution = solve_density_weights(
            &SolverInput {
                end_values: &end_values,
                baselines: &baselines,
                target: &self.target,
                mode,
                manual: &manual,
            },
            config,
        );
        self.warnings.extend(solution.warnings.iter().cloned());

        let retention = if mode.retains_baseline() { config.isolated_retention } else { 0.0 };
        let infos: Vec<ChannelInfo> = (0..names.len())
            .map(|c| ChannelInfo {
                name: names[c].clone(),
                end_value: end_values[c],
                weight: solution.weights[c],
                coverage: solution.coverage[c],
                active: solution.active[c],
                baseline: normalize_curve(&baselines[c], end_values[c]),
                retention,
            })
            .collect();
        let total_ink: Vec<f64> = baselines
            .iter()
            .map(|b| b.iter().map(|&v| f64::from(v)).sum())
            .collect();
        let ladder = Ladder::build(&names, &solution.weights, &total_ink, &solution.active);

        let k = names.len();
        let mut normalized: Vec<Vec<f64>> = infos.iter().map(|i| i.baseline.clone()).collect();
        let mut changed = vec![vec![false; CURVE_RESOLUTION]; k];
        let mut contributions = vec![vec![0.0; CURVE_RESOLUTION]; k];
        let mut clamps: Vec<Vec<ClampEvent>> = vec![Vec::new(); k];
        let mut outcomes = Vec::with_capacity(CURVE_RESOLUTION);
        let mut snapshots = Vec::new();
        let mut saturated = Vec::new();

        let mut redistributor = Redistributor::new(&infos, &ladder, config);
        for i in 0..CURVE_RESOLUTION {
            let outcome = redistributor.process(&SampleInput {
                index: i,
                target: self.target[i],
                measurement: self.measurement.as_ref().map(|m| m[i]),
                prior: &solution.prior[i],
            });
            for c in 0..k {
                if outcome.normalized[c] != normalized[c][i] {
                    changed[c][i] = true;
                    normalized[c][i] = outcome.normalized[c];
                }
                contributions[c][i] = outcome.contributions[c];
            }
            for (c, event) in &outcome.clamps {
                clamps[*c].push(event.clone());
            }
            if outcome.action == SampleAction::Saturated {
                saturated.push(i);
            }
            if let Some(snapshot) = &outcome.snapshot {
                snapshots.push(snapshot.clone());
            }
            outcomes.push(outcome);
        }

        if let Some(&first) = saturated.first() {
            let msg = format!(
                "target density exceeds channel capacity at {} samples (first at {:.1}%)",
                saturated.len(),
                input_percent(first)
            );
            log::warn!("{msg}");
            self.warnings.push(msg);
        }

        let first_clamp: Vec<Option<usize>> = clamps.iter().map(|e| e.first().map(|e| e.index)).collect();
        let smoothing = apply_smoothing_windows(
            &SmoothingContext {
                names: &names,
                active: &solution.active,
                contributions: &contributions,
                first_clamp: &first_clamp,
            },
            &config.smoothing,
        );
        reapply_smoothed(&infos, &smoothing.windows, &smoothing.contributions, &mut normalized, &mut changed);

        // Untouched samples keep their exact baseline value
        let mut curves: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for c in 0..k {
            let end = end_values[c];
            let mut curve = baselines[c].clone();
            for i in (0..CURVE_RESOLUTION).filter(|&i| changed[c][i]) {
                let n = if normalized[c][i].is_finite() { normalized[c][i] } else { 0.0 };
                curve[i] = (n * f64::from(end)).round().clamp(0.0, f64::from(end)) as u32;
            }
            enforce_monotonic(&mut curve);
            curves.insert(names[c].clone(), curve);
        }

        let realized: Vec<f64> = (0..CURVE_RESOLUTION)
            .map(|i| {
                infos
                    .iter()
                    .filter(|info| info.active)
                    .map(|info| info.weight * f64::from(curves[&info.name][i]) / f64::from(info.end_value))
                    .sum()
            })
            .collect();
        let final_normalized: Vec<Vec<f64>> = (0..k).map(|c| normalize_curve(&curves[&names[c]], end_values[c])).collect();

        let profiles: Vec<SampleProfile> = outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| {
                let increments: Vec<f64> = (0..k)
                    .map(|c| {
                        if !infos[c].active || i == 0 {
                            return 0.0;
                        }
                        (infos[c].weight * (final_normalized[c][i] - final_normalized[c][i - 1])).max(0.0)
                    })
                    .collect();
                let total: f64 = increments.iter().sum();
                let shares = (0..k)
                    .filter(|&c| infos[c].active)
                    .map(|c| {
                        let share = if total > 0.0 { increments[c] / total } else { solution.prior[i][c] };
                        (names[c].clone(), share)
                    })
                    .collect();
                SampleProfile {
                    index: i,
                    input_percent: input_percent(i),
                    target: self.target[i],
                    measurement: self.measurement.as_ref().map(|m| m[i]),
                    density_before: outcome.density_before,
                    density_after: realized[i],
                    requested_delta: outcome.requested,
                    applied_delta: realized[i] - outcome.density_before,
                    density_delta: if i == 0 { 0.0 } else { self.target[i] - self.target[i - 1] },
                    shares,
                    action: outcome.action,
                }
            })
            .collect();

        let coverage = CoverageSummary {
            channels: (0..k)
                .map(|c| {
                    let cov = solution.coverage[c];
                    let mut entry = ChannelCoverage {
                        channel: names[c].clone(),
                        limit: cov.limit,
                        buffer: cov.buffer,
                        buffered_limit: cov.buffered(),
                        max_normalized: 0.0,
                        overflow: 0.0,
                        overflow_normalized: 0.0,
                        clamp_count: 0,
                        clamped_samples: std::mem::take(&mut clamps[c]),
                    };
                    entry.record_usage(&curves[&names[c]]);
                    entry
                })
                .collect(),
        };

        let mut density_weights: Vec<DensityWeight> = (0..k)
            .map(|c| DensityWeight {
                channel: names[c].clone(),
                weight: solution.weights[c],
                source: solution.sources[c],
                end_value: end_values[c],
                ladder_index: ladder.position(c),
            })
            .collect();
        density_weights.sort_by_key(|w| w.ladder_index.unwrap_or(usize::MAX));

        let measurement_samples = self
            .measurement
            .clone()
            .unwrap_or_else(|| outcomes.iter().map(|o| o.density_baseline).collect());
        let momentum_peaks = if mode == WeightingMode::Momentum {
            names.iter().cloned().zip(solution.momentum_peaks.iter().copied()).collect()
        } else {
            BTreeMap::new()
        };
        let residual = ResidualStats::from_series(&realized, &self.target);
        let contribution_totals = (0..k)
            .map(|c| {
                let total: f64 = final_normalized[c]
                    .iter()
                    .zip(&infos[c].baseline)
                    .map(|(n, base)| infos[c].weight * (n - base))
                    .sum();
                (names[c].clone(), total)
            })
            .collect();

        log::debug!(
            "composite session finalized: ladder {:?}, {} clamp events, {} smoothing windows, max residual {:.6}",
            ladder.names(&names),
            coverage.total_clamp_events(),
            smoothing.windows.len(),
            residual.max_abs
        );

        CompositeResult {
            peak_indices: curves.iter().map(|(n, c)| (n.clone(), peak_index(c))).collect(),
            curves,
            warnings: self.warnings,
            density_weights,
            ladder: ladder.names(&names),
            weighting_mode: mode,
            measurement_samples,
            target: self.target,
            profiles,
            coverage,
            smoothing_windows: smoothing.windows,
            contribution_totals,
            momentum_peaks,
            snapshots,
            residual,
            generated_at: chrono::Utc::now(),
        }
    }

    fn pass_through(self, names: &[String], end_values: &[u32], baselines: Vec<Vec<u32>>) -> CompositeResult {
        log::debug!("composite session inactive; returning baselines");
        let curves: BTreeMap<String, Vec<u32>> = names.iter().cloned().zip(baselines).collect();
        let mut seen = HashSet::new();
        let density_weights = names
            .iter()
            .zip(end_values)
            .filter(|(n, _)| seen.insert(n.as_str()))
            .map(|(n, &end)| DensityWeight {
                channel: n.clone(),
                weight: 0.0,
                source: super::solver::WeightSource::Inactive,
                end_value: end,
                ladder_index: None,
            })
            .collect();
        CompositeResult {
            peak_indices: curves.iter().map(|(n, c)| (n.clone(), peak_index(c))).collect(),
            curves,
            warnings: self.warnings,
            density_weights,
            ladder: Vec::new(),
            weighting_mode: self.request.weighting,
            measurement_samples: self.measurement.unwrap_or_default(),
            target: self.target,
            profiles: Vec::new(),
            coverage: CoverageSummary::default(),
            smoothing_windows: Vec::new(),
            contribution_totals: BTreeMap::new(),
            momentum_peaks: BTreeMap::new(),
            snapshots: Vec::new(),
            residual: ResidualStats::default(),
            generated_at: chrono::Utc::now(),
        }
    }
}

/// Write smoothed corrections back into normalized values.
///
/// Inside a window each value stays between the higher of its retention
/// floor and its value at the previous sample, and the lower of its coverage
/// ceiling and every value after the window. Smoothing therefore never forces
/// a monotonic fix-up. Density a clamp cuts off is handed to the other
/// participants of the sample.
fn reapply_smoothed(
    infos: &[ChannelInfo],
    windows: &[SmoothingWindow],
    smoothed: &[Vec<f64>],
    normalized: &mut [Vec<f64>],
    changed: &mut [Vec<bool>],
) {
    let position = |name: &str| infos.iter().position(|i| i.name == name);
    for window in windows {
        let participants: Vec<usize> = std::iter::once(window.outgoing.as_str())
            .chain(window.incoming.iter().map(String::as_str))
            .filter_map(position)
            .filter(|&c| infos[c].active && infos[c].weight > 0.0 && infos[c].end_value > 0)
            .collect();
        let upper: Vec<f64> = participants
            .iter()
            .map(|&c| {
                let info = &infos[c];
                let ceiling =
                    (info.coverage.buffered() * f64::from(TOTAL_INK) / f64::from(info.end_value)).min(1.0);
                normalized[c][window.end + 1..].iter().copied().fold(ceiling, f64::min)
            })
            .collect();

        for i in window.start..=window.end {
            let bounds: Vec<(f64, f64)> = participants
                .iter()
                .zip(&upper)
                .map(|(&c, &hi)| {
                    let base = infos[c].baseline[i];
                    let previous = if i > 0 { normalized[c][i - 1] } else { 0.0 };
                    let lo = (base * infos[c].retention).max(previous);
                    (lo, hi.max(base).max(lo))
                })
                .collect();

            let mut spill = 0.0;
            for (&c, &(lo, hi)) in participants.iter().zip(&bounds) {
                let info = &infos[c];
                let desired = info.baseline[i] + smoothed[c][i] / info.weight;
                let value = desired.clamp(lo, hi);
                spill += (desired - value) * info.weight;
                normalized[c][i] = value;
                changed[c][i] = true;
            }
            for (&c, &(lo, hi)) in participants.iter().zip(&bounds).rev() {
                if spill.abs() <= 1e-12 {
                    break;
                }
                let weight = infos[c].weight;
                let room = if spill > 0.0 { hi - normalized[c][i] } else { normalized[c][i] - lo };
                let step = (spill.abs() / weight).min(room.max(0.0)).copysign(spill);
                normalized[c][i] += step;
                spill -= step * weight;
            }
        }
    }
}

/// Runs sessions and keeps the last finalized result.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use quad_curves::composite::{ChannelSpec, CompositeEngine, CompositeRequest};
/// use quad_curves::curve::ramp;
/// use quad_curves::target::TargetEntry;
///
/// let mut engine = CompositeEngine::default();
/// let request = CompositeRequest::new(vec![ChannelSpec::new("K", 65535)], TargetEntry::identity());
/// let bases = BTreeMap::from([("K".to_string(), ramp(65535))]);
/// let result = engine.run(request, &bases).unwrap();
/// assert_eq!(result.curves["K"].len(), 256);
/// assert_eq!(engine.coverage_summary().channels.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct CompositeEngine {
    config: CompositeConfig,
    last: Option<CompositeResult>,
}

impl CompositeEngine {
    /// Create an engine with a validated configuration.
    pub fn new(config: CompositeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, last: None })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &CompositeConfig {
        &self.config
    }

    /// Run a full session over the given baseline curves.
    ///
    /// Channels without an entry in `bases` are treated as empty.
    pub fn run(&mut self, request: CompositeRequest, bases: &BTreeMap<String, Vec<u32>>) -> Result<&CompositeResult> {
        let names: Vec<String> = request.channels.iter().map(|c| c.name.clone()).collect();
        let mut session = CompositeSession::begin(request, &self.config);
        for name in &names {
            if let Some(base) = bases.get(name) {
                session.register_base(name, base)?;
            }
        }
        Ok(&*self.last.insert(session.finalize()))
    }

    /// Synthesize every channel's baseline and run a session over them.
    pub fn run_synthesized(
        &mut self,
        request: CompositeRequest,
        synthesizer: &CurveSynthesizer,
        apply_linearization: bool,
    ) -> Result<&CompositeResult> {
        let specs: Vec<(String, u32)> = request.channels.iter().map(|c| (c.name.clone(), c.end_value)).collect();
        let bases = synthesizer
            .synthesize_all(&specs, apply_linearization)
            .into_iter()
            .map(|s| (s.channel, s.values))
            .collect();
        self.run(request, &bases)
    }

    /// Last finalized result.
    #[must_use]
    pub fn last_result(&self) -> Option<&CompositeResult> {
        self.last.as_ref()
    }

    /// Per-channel share, weight and cumulative density at the nearest sample
    /// of the last run (neutral when none).
    #[must_use]
    pub fn density_profile(&self, input_percent: f64) -> DensityProfileEntry {
        self.last
            .as_ref()
            .map_or_else(|| DensityProfileEntry::neutral(input_percent), |r| r.density_profile(input_percent))
    }

    /// Coverage of the last run (empty when none).
    #[must_use]
    pub fn coverage_summary(&self) -> CoverageSummary {
        self.last.as_ref().map(|r| r.coverage.clone()).unwrap_or_default()
    }

    /// Forget the last result.
    pub fn clear(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::ramp;

    fn request(channels: &[(&str, u32)]) -> CompositeRequest {
        CompositeRequest::new(
            channels.iter().map(|&(n, e)| ChannelSpec::new(n, e)).collect(),
            TargetEntry::identity(),
        )
    }

    #[test]
    fn test_empty_channel_list_is_inactive() {
        let session = CompositeSession::begin(request(&[]), &CompositeConfig::default());
        assert!(!session.is_active());
        let result = session.finalize();
        assert!(result.curves.is_empty());
        assert!(!result.warnings.is_empty());
        assert!(result.coverage.is_empty());
    }

    #[test]
    fn test_short_target_passes_through() {
        let req = CompositeRequest::new(vec![ChannelSpec::new("K", 40000)], TargetEntry::samples(vec![0.5]));
        let mut session = CompositeSession::begin(req, &CompositeConfig::default());
        assert!(!session.is_active());
        session.register_base("K", &ramp(40000)).unwrap();
        let result = session.finalize();
        assert_eq!(result.curves["K"], ramp(40000));
        assert_eq!(result.density_profile(50.0).channels.len(), 0);
    }

    #[test]
    fn test_register_base_rejects_unknown_and_short() {
        let mut session = CompositeSession::begin(request(&[("K", 40000)]), &CompositeConfig::default());
        assert!(matches!(
            session.register_base("LK", &ramp(40000)),
            Err(Error::InvalidChannel { .. })
        ));
        assert!(session.register_base("K", &[0, 1, 2]).is_err());
    }

    #[test]
    fn test_register_base_sanitizes() {
        let mut session = CompositeSession::begin(request(&[("K", 1000)]), &CompositeConfig::default());
        let mut curve = ramp(2000);
        curve[10] = 0;
        session.register_base("K", &curve).unwrap();
        assert_eq!(session.warnings().len(), 1);
    }

    #[test]
    fn test_single_channel_identity_is_untouched() {
        let mut engine = CompositeEngine::default();
        let bases = BTreeMap::from([("K".to_string(), ramp(65535))]);
        let result = engine.run(request(&[("K", 65535)]), &bases).unwrap();
        assert_eq!(result.curves["K"], ramp(65535));
        assert!(result.residual.max_abs < 1e-3);
        assert_eq!(result.ladder, vec!["K".to_string()]);
    }

    #[test]
    fn test_missing_base_is_empty_channel() {
        let mut engine = CompositeEngine::default();
        let bases = BTreeMap::from([("K".to_string(), ramp(65535))]);
        let result = engine.run(request(&[("K", 65535), ("LK", 20000)]), &bases).unwrap();
        assert!(result.curves["LK"].iter().all(|&v| v == 0));
        assert!(result.warnings.iter().any(|w| w.contains("LK")));
        let lk = result.density_weights.iter().find(|w| w.channel == "LK").unwrap();
        assert_eq!(lk.ladder_index, None);
    }

    #[test]
    fn test_engine_neutral_before_run() {
        let engine = CompositeEngine::default();
        assert!(engine.last_result().is_none());
        assert!(engine.density_profile(40.0).channels.is_empty());
        assert!(engine.coverage_summary().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected_by_engine() {
        let config = CompositeConfig::builder().retry_factor(0).build();
        assert!(CompositeEngine::new(config).is_err());
    }
}

//! Per-sample redistribution iterator.
//!
//! At each sample the iterator compares the target density with the modelled
//! density of the baseline curves and spreads the difference across channels:
//!
//! 1. Candidates are active channels not locked by the ladder rule that still
//!    have capacity in the delta's direction.
//! 2. Each candidate is weighted by its density share × `capacity^1.5` × its
//!    blend ramp fraction.
//! 3. The delta is split by weight, converted to normalized movement, clamped
//!    to capacity (recording a clamp event), and subtracted.
//! 4. Rounds repeat until the delta is spent or nothing can absorb more.
//!
//! Each sample starts from the higher of the channel's baseline and the value
//! committed at the previous sample, and a decrease never goes below that
//! committed value. Corrections therefore never need a monotonic fix-up that
//! would push density past the target. Together with the blend trackers this
//! carries state from one sample to the next, so samples must be walked in
//! order.

use std::collections::BTreeMap;

use super::capacity::{BlendTracker, Capacity, Limit};
use super::config::CompositeConfig;
use super::ladder::Ladder;
use super::report::{ChannelSampleState, ClampEvent, SampleAction, SampleSnapshot, input_percent};
use super::solver::CoverageLimit;

/// Fixed per-session facts about one channel.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    /// Channel name.
    pub name: String,
    /// End value.
    pub end_value: u32,
    /// Density weight.
    pub weight: f64,
    /// Coverage ceiling.
    pub coverage: CoverageLimit,
    /// Takes part in redistribution.
    pub active: bool,
    /// Normalized baseline curve.
    pub baseline: Vec<f64>,
    /// Fraction of the baseline a decrease must keep (0 = may reach zero).
    pub retention: f64,
}

impl ChannelInfo {
    fn floor_at(&self, index: usize) -> f64 {
        self.baseline[index] * self.retention
    }
}

/// One sample to process.
#[derive(Debug, Clone, Copy)]
pub struct SampleInput<'a> {
    /// Sample index.
    pub index: usize,
    /// Target density.
    pub target: f64,
    /// Measured density, when a measurement series was supplied.
    pub measurement: Option<f64>,
    /// Prior density share per channel.
    pub prior: &'a [f64],
}

/// Result of processing one sample.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    /// Normalized value per channel after correction.
    pub normalized: Vec<f64>,
    /// Density correction per channel (`weight × movement`).
    pub contributions: Vec<f64>,
    /// Modelled density of the baseline curves.
    pub density_baseline: f64,
    /// Modelled density the sample started from.
    pub density_before: f64,
    /// Modelled density after correction.
    pub density_after: f64,
    /// Correction requested.
    pub requested: f64,
    /// Correction applied.
    pub applied: f64,
    /// What happened.
    pub action: SampleAction,
    /// Clamp events by channel index.
    pub clamps: Vec<(usize, ClampEvent)>,
    /// Channel state, when capturing snapshots.
    pub snapshot: Option<SampleSnapshot>,
}

/// Choose the correction from the model delta and an optional measurement delta.
///
/// - Measurement at or past target while the model asks for more: revert to baseline.
/// - Both agree in direction: the smaller magnitude wins.
/// - Measurement asks for more while the model asks for less: hold.
#[must_use]
pub fn resolve_delta(model: f64, measurement: Option<f64>) -> (f64, Option<SampleAction>) {
    let Some(measured) = measurement else {
        return (model, None);
    };
    if model > 0.0 {
        if measured <= 0.0 {
            (0.0, Some(SampleAction::Reverted))
        } else {
            (model.min(measured), None)
        }
    } else if model < 0.0 {
        if measured < 0.0 {
            (model.max(measured), None)
        } else {
            (0.0, Some(SampleAction::Held))
        }
    } else {
        (0.0, None)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Stateful iterator over samples of one session.
#[derive(Debug)]
pub struct Redistributor<'a> {
    channels: &'a [ChannelInfo],
    ladder: &'a Ladder,
    config: &'a CompositeConfig,
    ladder_blend: Vec<BlendTracker>,
    shadow_blend: Vec<BlendTracker>,
    up_lock_prev: Vec<Option<usize>>,
    down_lock_prev: Vec<Option<usize>>,
    committed: Vec<f64>,
}

impl<'a> Redistributor<'a> {
    /// Create an iterator; samples must then be processed in index order.
    #[must_use]
    pub fn new(channels: &'a [ChannelInfo], ladder: &'a Ladder, config: &'a CompositeConfig) -> Self {
        let k = channels.len();
        Self {
            channels,
            ladder,
            config,
            ladder_blend: vec![BlendTracker::default(); k],
            shadow_blend: vec![BlendTracker::default(); k],
            up_lock_prev: vec![None; k],
            down_lock_prev: vec![None; k],
            committed: vec![0.0; k],
        }
    }

    fn density(&self, normalized: &[f64]) -> f64 {
        self.channels
            .iter()
            .zip(normalized)
            .filter(|(info, _)| info.active)
            .map(|(info, n)| info.weight * n)
            .sum()
    }

    fn capacities(&self, normalized: &[f64], index: usize) -> Vec<Capacity> {
        let cfg = self.config;
        (0..self.channels.len())
            .map(|c| {
                let info = &self.channels[c];
                let darker_has_headroom = self
                    .ladder
                    .darker_than(c)
                    .any(|d| 1.0 - normalized[d] >= cfg.front_reserve_darker_headroom);
                let floor = if info.active {
                    info.floor_at(index).max(self.committed[c])
                } else {
                    info.floor_at(index)
                };
                Capacity::evaluate(
                    normalized[c],
                    info.end_value,
                    &info.coverage,
                    floor,
                    darker_has_headroom,
                    cfg,
                )
            })
            .collect()
    }

    /// Channel holding the lock on `c`, if any.
    fn lock_source(&self, c: usize, caps: &[Capacity], dir: Direction) -> Option<usize> {
        let cfg = self.config;
        match dir {
            Direction::Up => self.ladder.lighter_than(c).find(|&l| {
                caps[l].up > cfg.capacity_threshold
                    && caps[l].headroom > cfg.reserve_approach_ratio * caps[l].reserve.base
            }),
            Direction::Down => self
                .ladder
                .darker_than(c)
                .find(|&d| caps[d].down > cfg.capacity_threshold),
        }
    }

    fn locks(&self, caps: &[Capacity], dir: Direction) -> Vec<Option<usize>> {
        (0..self.channels.len())
            .map(|c| {
                if self.channels[c].active {
                    self.lock_source(c, caps, dir)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Start blend ramps for channels released since the previous sample.
    fn update_trackers(&mut self, caps: &[Capacity]) {
        let up = self.locks(caps, Direction::Up);
        let down = self.locks(caps, Direction::Down);
        for c in 0..self.channels.len() {
            if let (None, Some(source)) = (up[c], self.up_lock_prev[c]) {
                self.ladder_blend[c].start(source, self.config.ladder_blend_window);
                log::trace!("ladder blend started for {} after {}", self.channels[c].name, self.channels[source].name);
            }
            if let (None, Some(source)) = (down[c], self.down_lock_prev[c]) {
                self.shadow_blend[c].start(source, self.config.shadow_blend_window);
                log::trace!("shadow blend started for {} after {}", self.channels[c].name, self.channels[source].name);
            }
        }
        self.up_lock_prev = up;
        self.down_lock_prev = down;
    }

    /// Room left under the blend cap, given the channel's correction from its baseline.
    fn blend_room(&self, c: usize, dir: Direction, correction: f64) -> Option<f64> {
        let cfg = self.config;
        let (cap, corrected) = match dir {
            Direction::Up => (self.ladder_blend[c].cap(cfg.ladder_blend_cap_step, 1.0), correction.max(0.0)),
            Direction::Down => (
                self.shadow_blend[c].cap(cfg.shadow_blend_cap_step, cfg.shadow_blend_share),
                (-correction).max(0.0),
            ),
        };
        Some((cap? - corrected).max(0.0))
    }

    fn blend_scale(&self, c: usize, dir: Direction) -> f64 {
        match dir {
            Direction::Up => self.ladder_blend[c].scale(),
            Direction::Down => self.shadow_blend[c].scale(),
        }
    }

    /// Process the next sample.
    pub fn process(&mut self, input: &SampleInput<'_>) -> SampleOutcome {
        let cfg = self.config;
        let k = self.channels.len();
        let i = input.index;

        let baseline: Vec<f64> = self.channels.iter().map(|c| c.baseline[i]).collect();
        let mut normalized: Vec<f64> = (0..k)
            .map(|c| {
                if self.channels[c].active {
                    baseline[c].max(self.committed[c])
                } else {
                    baseline[c]
                }
            })
            .collect();
        let density_baseline = self.density(&baseline);
        let density_before = self.density(&normalized);
        let initial_caps = self.capacities(&normalized, i);
        self.update_trackers(&initial_caps);

        let target = if input.target.is_finite() { input.target } else { density_before };
        let model = target - density_before;
        let measured = input.measurement.filter(|m| m.is_finite()).map(|m| target - m);
        let (delta, forced) = resolve_delta(model, measured);

        let mut action = forced.unwrap_or(SampleAction::Corrected);
        if forced.is_none() {
            if delta.abs() <= cfg.delta_epsilon {
                action = SampleAction::Unchanged;
            } else if density_before <= cfg.highlight_density_threshold && delta.abs() < cfg.highlight_delta_tolerance {
                action = SampleAction::Highlight;
            }
        }

        let dir = if delta >= 0.0 { Direction::Up } else { Direction::Down };
        let start = normalized.clone();
        let mut moved = vec![0.0; k];
        let mut clamps: BTreeMap<usize, ClampEvent> = BTreeMap::new();
        let mut remaining = delta;
        let mut rounds = 0;

        if action == SampleAction::Corrected {
            let active_count = self.channels.iter().filter(|c| c.active).count().max(1);
            let retries = cfg.retry_factor * active_count;

            for _ in 0..retries {
                if remaining.abs() <= cfg.delta_epsilon {
                    break;
                }
                let caps = self.capacities(&normalized, i);
                let locks = self.locks(&caps, dir);

                let candidates: Vec<(usize, f64, Option<f64>)> = (0..k)
                    .filter(|&c| self.channels[c].active && self.channels[c].weight > 0.0 && locks[c].is_none())
                    .filter_map(|c| {
                        let cap = match dir {
                            Direction::Up => caps[c].up,
                            Direction::Down => caps[c].down,
                        };
                        let room = self.blend_room(c, dir, normalized[c] - baseline[c]);
                        let usable = room.map_or(cap, |r| cap.min(r));
                        (cap > cfg.capacity_threshold && usable > 1e-12).then_some((c, cap, room))
                    })
                    .collect();
                if candidates.is_empty() {
                    break;
                }

                let mut bias: Vec<f64> = candidates
                    .iter()
                    .map(|&(c, cap, _)| {
                        let prior = input.prior.get(c).copied().unwrap_or(0.0);
                        let share = if prior > 0.0 { prior } else { self.channels[c].weight };
                        share * cap.powf(cfg.capacity_bias_exponent) * self.blend_scale(c, dir)
                    })
                    .collect();
                if bias.iter().sum::<f64>() <= 0.0 {
                    bias = candidates.iter().map(|&(_, cap, _)| cap).collect();
                }
                let total_bias: f64 = bias.iter().sum();

                let mut absorbed = 0.0;
                for (&(c, cap, room), b) in candidates.iter().zip(&bias) {
                    let info = &self.channels[c];
                    let portion = remaining * b / total_bias;
                    let desired = portion / info.weight;
                    let allowed = room.map_or(cap, |r| cap.min(r));
                    let actual = desired.abs().min(allowed).copysign(desired);

                    let before = normalized[c];
                    normalized[c] = (before + actual).clamp(0.0, 1.0);
                    let actual = normalized[c] - before;
                    moved[c] += actual;
                    absorbed += actual * info.weight;

                    if desired.abs() > allowed + 1e-12 {
                        let by_blend = room.is_some_and(|r| r < cap);
                        let limit = match dir {
                            Direction::Up => caps[c].up_limit(),
                            Direction::Down => caps[c].down_limit(),
                        };
                        let event = ClampEvent {
                            index: i,
                            input_percent: input_percent(i),
                            normalized_before: start[c],
                            normalized_after: normalized[c],
                            desired_normalized_after: before + desired,
                            overflow: before + desired - normalized[c],
                            limit: info.coverage.limit,
                            buffered_limit: info.coverage.buffered(),
                            truncated_by_threshold: !by_blend && limit.is_threshold(),
                            truncated_by_end: !by_blend && !limit.is_threshold(),
                            truncated_by_blend: by_blend,
                        };
                        record_clamp(&mut clamps, c, event);
                    }
                }
                remaining -= absorbed;
                rounds += 1;
                if absorbed.abs() <= 1e-15 {
                    break;
                }
            }

            if remaining.abs() > cfg.delta_epsilon {
                action = SampleAction::Saturated;
                self.record_saturation(i, remaining, dir, &start, &normalized, &mut clamps);
            }
        }

        for c in 0..k {
            let correction = normalized[c] - baseline[c];
            self.ladder_blend[c].finish_sample(correction.max(0.0));
            self.shadow_blend[c].finish_sample((-correction).max(0.0));
        }
        self.committed.clone_from(&normalized);

        let contributions: Vec<f64> = (0..k)
            .map(|c| self.channels[c].weight * (normalized[c] - baseline[c]))
            .collect();
        let density_after = self.density(&normalized);
        let applied = density_after - density_before;

        let snapshot = cfg.capture_snapshots.then(|| {
            let final_caps = self.capacities(&normalized, i);
            SampleSnapshot {
                index: i,
                target,
                density_before,
                delta,
                rounds,
                channels: (0..k)
                    .map(|c| self.channel_state(c, dir, &initial_caps, &final_caps, &normalized, &baseline, &moved, input))
                    .collect(),
            }
        });

        SampleOutcome {
            normalized,
            contributions,
            density_baseline,
            density_before,
            density_after,
            requested: delta,
            applied,
            action,
            clamps: clamps.into_iter().collect(),
            snapshot,
        }
    }

    /// Residual delta nobody could absorb: flag every channel pinned in that direction.
    fn record_saturation(
        &self,
        index: usize,
        remaining: f64,
        dir: Direction,
        start: &[f64],
        normalized: &[f64],
        clamps: &mut BTreeMap<usize, ClampEvent>,
    ) {
        let caps = self.capacities(normalized, index);
        let total_weight: f64 = self.channels.iter().filter(|c| c.active).map(|c| c.weight).sum();
        if total_weight <= 0.0 {
            return;
        }
        let extra = remaining / total_weight;
        for (c, info) in self.channels.iter().enumerate().filter(|(_, c)| c.active) {
            let (cap, limit) = match dir {
                Direction::Up => (caps[c].up, caps[c].up_limit()),
                Direction::Down => (caps[c].down, caps[c].down_limit()),
            };
            if cap > self.config.capacity_threshold {
                continue;
            }
            let event = ClampEvent {
                index,
                input_percent: input_percent(index),
                normalized_before: start[c],
                normalized_after: normalized[c],
                desired_normalized_after: normalized[c] + extra,
                overflow: extra,
                limit: info.coverage.limit,
                buffered_limit: info.coverage.buffered(),
                truncated_by_threshold: limit.is_threshold(),
                truncated_by_end: matches!(limit, Limit::End | Limit::Zero),
                truncated_by_blend: false,
            };
            record_clamp(clamps, c, event);
        }
        log::trace!("sample {index}: {remaining:.6} density left unabsorbed");
    }

    fn channel_state(
        &self,
        c: usize,
        dir: Direction,
        before: &[Capacity],
        after: &[Capacity],
        normalized: &[f64],
        baseline: &[f64],
        moved: &[f64],
        input: &SampleInput<'_>,
    ) -> ChannelSampleState {
        let info = &self.channels[c];
        let pick = |cap: &Capacity| match dir {
            Direction::Up => cap.up,
            Direction::Down => cap.down,
        };
        let darker_stack = self.ladder.darker_than(c).map(|d| normalized[d]).fold(0.0_f64, f64::max);
        let blend_cap = match dir {
            Direction::Up => self.ladder_blend[c].cap(self.config.ladder_blend_cap_step, 1.0),
            Direction::Down => self.shadow_blend[c].cap(self.config.shadow_blend_cap_step, self.config.shadow_blend_share),
        };
        ChannelSampleState {
            channel: info.name.clone(),
            value: normalized[c] * f64::from(info.end_value),
            normalized: normalized[c],
            headroom: before[c].headroom,
            effective_headroom: before[c].effective_headroom,
            capacity_before: pick(&before[c]),
            capacity_after: pick(&after[c]),
            share: input.prior.get(c).copied().unwrap_or(0.0),
            ladder_floor: baseline[c].max(darker_stack),
            reserve_state: before[c].reserve.state,
            blend_cap,
            applied: moved[c],
        }
    }
}

fn record_clamp(clamps: &mut BTreeMap<usize, ClampEvent>, channel: usize, event: ClampEvent) {
    match clamps.get_mut(&channel) {
        Some(existing) => existing.merge(&event),
        None => {
            clamps.insert(channel, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::report::SampleAction;

    fn info(name: &str, end: u32, weight: f64, limit: f64, baseline: Vec<f64>) -> ChannelInfo {
        ChannelInfo {
            name: name.to_string(),
            end_value: end,
            weight,
            coverage: CoverageLimit { limit, buffer: 0.005 },
            active: true,
            baseline,
            retention: 0.0,
        }
    }

    fn flat(value: f64) -> Vec<f64> {
        vec![value; 4]
    }

    #[test]
    fn test_resolve_delta_paths() {
        assert_eq!(resolve_delta(0.1, None), (0.1, None));
        assert_eq!(resolve_delta(0.1, Some(-0.05)), (0.0, Some(SampleAction::Reverted)));
        assert_eq!(resolve_delta(0.1, Some(0.04)), (0.04, None));
        assert_eq!(resolve_delta(-0.1, Some(-0.02)), (-0.02, None));
        assert_eq!(resolve_delta(-0.1, Some(0.02)), (0.0, Some(SampleAction::Held)));
    }

    #[test]
    fn test_lighter_channel_absorbs_first() {
        let channels = vec![
            info("K", 65535, 1.0, 1.0, flat(0.2)),
            info("LK", 65535, 0.2, 1.0, flat(0.2)),
        ];
        let names: Vec<String> = channels.iter().map(|c| c.name.clone()).collect();
        let ladder = Ladder::build(&names, &[1.0, 0.2], &[0.0, 0.0], &[true, true]);
        let config = CompositeConfig::default();
        let mut it = Redistributor::new(&channels, &ladder, &config);

        let before = 1.0 * 0.2 + 0.2 * 0.2;
        let out = it.process(&SampleInput {
            index: 0,
            target: before + 0.02,
            measurement: None,
            prior: &[0.5, 0.5],
        });
        assert_eq!(out.action, SampleAction::Corrected);
        assert_eq!(out.normalized[0], 0.2);
        assert!((out.normalized[1] - 0.3).abs() < 1e-9);
        assert!((out.density_after - (before + 0.02)).abs() < 1e-9);
        assert!(out.clamps.is_empty());
    }

    #[test]
    fn test_shrinking_correction_keeps_committed_values() {
        let channels = vec![
            info("K", 65535, 1.0, 1.0, vec![0.1, 0.2]),
            info("LK", 65535, 0.5, 1.0, vec![0.1, 0.1]),
        ];
        let names: Vec<String> = channels.iter().map(|c| c.name.clone()).collect();
        let ladder = Ladder::build(&names, &[1.0, 0.5], &[0.0, 0.0], &[true, true]);
        let config = CompositeConfig::default();
        let mut it = Redistributor::new(&channels, &ladder, &config);

        let first = it.process(&SampleInput {
            index: 0,
            target: 0.2,
            measurement: None,
            prior: &[0.5, 0.5],
        });
        assert!((first.normalized[1] - 0.2).abs() < 1e-9);

        // Lifted start (K 0.2, LK 0.2) is above target; K gives up its rise
        let second = it.process(&SampleInput {
            index: 1,
            target: 0.25,
            measurement: None,
            prior: &[0.5, 0.5],
        });
        assert!((second.density_before - 0.3).abs() < 1e-9);
        assert!((second.density_baseline - 0.25).abs() < 1e-9);
        assert!((second.normalized[1] - 0.2).abs() < 1e-9);
        assert!((second.normalized[0] - 0.15).abs() < 1e-9);
        assert!((second.density_after - 0.25).abs() < 1e-9);
        assert!(second.clamps.is_empty());
    }

    #[test]
    fn test_decrease_stops_at_committed_value() {
        let channels = vec![info("K", 65535, 1.0, 1.0, flat(0.2))];
        let names = vec!["K".to_string()];
        let ladder = Ladder::build(&names, &[1.0], &[0.0], &[true]);
        let config = CompositeConfig::default();
        let mut it = Redistributor::new(&channels, &ladder, &config);

        it.process(&SampleInput {
            index: 0,
            target: 0.5,
            measurement: None,
            prior: &[1.0],
        });
        let out = it.process(&SampleInput {
            index: 1,
            target: 0.3,
            measurement: None,
            prior: &[1.0],
        });
        assert!((out.normalized[0] - 0.5).abs() < 1e-12);
        assert_eq!(out.action, SampleAction::Saturated);
        assert!(out.clamps[0].1.truncated_by_threshold);
    }

    #[test]
    fn test_small_delta_is_noop() {
        let channels = vec![info("K", 65535, 1.0, 1.0, flat(0.5))];
        let names = vec!["K".to_string()];
        let ladder = Ladder::build(&names, &[1.0], &[0.0], &[true]);
        let config = CompositeConfig::default();
        let mut it = Redistributor::new(&channels, &ladder, &config);
        let out = it.process(&SampleInput {
            index: 1,
            target: 0.5 + 1e-8,
            measurement: None,
            prior: &[1.0],
        });
        assert_eq!(out.action, SampleAction::Unchanged);
        assert_eq!(out.normalized, vec![0.5]);
    }

    #[test]
    fn test_highlight_noise_ignored() {
        let channels = vec![info("K", 65535, 1.0, 1.0, flat(0.01))];
        let names = vec!["K".to_string()];
        let ladder = Ladder::build(&names, &[1.0], &[0.0], &[true]);
        let config = CompositeConfig::default();
        let mut it = Redistributor::new(&channels, &ladder, &config);
        let out = it.process(&SampleInput {
            index: 0,
            target: 0.011,
            measurement: None,
            prior: &[1.0],
        });
        assert_eq!(out.action, SampleAction::Highlight);
    }

    #[test]
    fn test_saturation_records_end_clamp() {
        let channels = vec![info("K", 65535, 0.5, 1.0, flat(1.0))];
        let names = vec!["K".to_string()];
        let ladder = Ladder::build(&names, &[0.5], &[0.0], &[true]);
        let config = CompositeConfig::default();
        let mut it = Redistributor::new(&channels, &ladder, &config);
        let out = it.process(&SampleInput {
            index: 3,
            target: 0.8,
            measurement: None,
            prior: &[1.0],
        });
        assert_eq!(out.action, SampleAction::Saturated);
        assert_eq!(out.clamps.len(), 1);
        assert!(out.clamps[0].1.truncated_by_end);
        assert!((out.density_after - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_decrease_respects_retention_floor() {
        let mut k = info("K", 65535, 1.0, 1.0, flat(0.4));
        k.retention = 0.5;
        let channels = vec![k];
        let names = vec!["K".to_string()];
        let ladder = Ladder::build(&names, &[1.0], &[0.0], &[true]);
        let config = CompositeConfig::default();
        let mut it = Redistributor::new(&channels, &ladder, &config);
        let out = it.process(&SampleInput {
            index: 0,
            target: 0.0,
            measurement: None,
            prior: &[1.0],
        });
        assert!((out.normalized[0] - 0.2).abs() < 1e-12);
        assert_eq!(out.action, SampleAction::Saturated);
        assert!(out.clamps[0].1.truncated_by_threshold);
    }

    #[test]
    fn test_coverage_ceiling_clamps() {
        // Channel may only reach 30% of total ink
        let channels = vec![info("LK", 65535, 1.0, 0.3, flat(0.2))];
        let names = vec!["LK".to_string()];
        let ladder = Ladder::build(&names, &[1.0], &[0.0], &[true]);
        let config = CompositeConfig::default();
        let mut it = Redistributor::new(&channels, &ladder, &config);
        let out = it.process(&SampleInput {
            index: 0,
            target: 0.6,
            measurement: None,
            prior: &[1.0],
        });
        assert!(out.normalized[0] <= 0.305 + 1e-12);
        let (_, event) = &out.clamps[0];
        assert!(event.truncated_by_threshold);
    }
}

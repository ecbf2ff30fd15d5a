//! Capacity and coverage model.
//!
//! How much a channel may still move at a sample is the smallest of three
//! limits, all in normalized channel units:
//!
//! - **coverage**: room below the buffered coverage ceiling
//! - **effective headroom**: room below the end value minus the outstanding
//!   front reserve
//! - **end**: room below the end value
//!
//! The front reserve holds back a slice of a channel's range while a
//! strictly darker channel still has plenty of headroom, so light inks do
//! not slam into their ceiling before the hand-off begins.

use serde::{Deserialize, Serialize};

use super::config::CompositeConfig;
use super::solver::CoverageLimit;
use crate::TOTAL_INK;

/// Front-reserve state of a channel at one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveState {
    /// Far from the ceiling; the whole reserve is withheld.
    None,
    /// Headroom within the approach ratio of the reserve.
    Approaching,
    /// Headroom inside the reserve.
    Within,
    /// Reserve released.
    Exhausted,
}

impl ReserveState {
    /// Fraction of the remaining reserve the channel may use.
    #[must_use]
    pub fn allowance(&self, config: &CompositeConfig) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Approaching => config.reserve_approaching_allowance,
            Self::Within => config.reserve_within_allowance,
            Self::Exhausted => 1.0,
        }
    }
}

/// Front reserve at one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReserveStatus {
    /// Reserve size (0 when released).
    pub base: f64,
    /// State machine position.
    pub state: ReserveState,
    /// Reserve still withheld.
    pub outstanding: f64,
}

/// Evaluate the reserve for a channel with `headroom` left.
#[must_use]
pub fn reserve_status(headroom: f64, darker_has_headroom: bool, config: &CompositeConfig) -> ReserveStatus {
    let base = if darker_has_headroom {
        config.front_reserve_max_normalized
    } else {
        0.0
    };
    let state = if base <= 0.0 || headroom <= config.reserve_exhausted_epsilon {
        ReserveState::Exhausted
    } else if headroom <= base {
        ReserveState::Within
    } else if headroom <= config.reserve_approach_ratio * base {
        ReserveState::Approaching
    } else {
        ReserveState::None
    };
    let outstanding = base.min(headroom.max(0.0)) * (1.0 - state.allowance(config));
    ReserveStatus {
        base,
        state,
        outstanding,
    }
}

/// Which limit bounds a channel's movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    /// Buffered coverage ceiling.
    Coverage,
    /// Outstanding front reserve.
    Reserve,
    /// End value.
    End,
    /// Baseline-retention floor (decreases only).
    Floor,
    /// Zero ink (decreases only).
    Zero,
}

impl Limit {
    /// Counts as a threshold truncation (as opposed to a hard end).
    #[must_use]
    pub fn is_threshold(&self) -> bool {
        matches!(self, Self::Coverage | Self::Reserve | Self::Floor)
    }
}

/// Capacity of one channel at one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    /// Room below the end value.
    pub headroom: f64,
    /// Headroom minus outstanding reserve.
    pub effective_headroom: f64,
    /// Room below the buffered coverage ceiling.
    pub coverage: f64,
    /// Usable increase.
    pub up: f64,
    /// Usable decrease.
    pub down: f64,
    /// Lowest normalized value a decrease may reach.
    pub floor: f64,
    /// Reserve at this sample.
    pub reserve: ReserveStatus,
}

impl Capacity {
    /// Evaluate capacity for a channel at normalized value `n`.
    #[must_use]
    pub fn evaluate(
        n: f64,
        end_value: u32,
        coverage: &CoverageLimit,
        floor: f64,
        darker_has_headroom: bool,
        config: &CompositeConfig,
    ) -> Self {
        let headroom = (1.0 - n).max(0.0);
        let coverage_room = if end_value > 0 {
            (coverage.buffered() * f64::from(TOTAL_INK) / f64::from(end_value) - n).max(0.0)
        } else {
            0.0
        };
        let reserve = reserve_status(headroom, darker_has_headroom, config);
        let effective_headroom = (headroom - reserve.outstanding).max(0.0);
        let floor = floor.clamp(0.0, 1.0);
        Self {
            headroom,
            effective_headroom,
            coverage: coverage_room,
            up: coverage_room.min(effective_headroom).min(headroom),
            down: (n - floor).max(0.0),
            floor,
            reserve,
        }
    }

    /// The limit that bounds an increase.
    #[must_use]
    pub fn up_limit(&self) -> Limit {
        if self.coverage <= self.effective_headroom && self.coverage < self.headroom {
            Limit::Coverage
        } else if self.effective_headroom < self.headroom {
            Limit::Reserve
        } else {
            Limit::End
        }
    }

    /// The limit that bounds a decrease.
    #[must_use]
    pub fn down_limit(&self) -> Limit {
        if self.floor > 0.0 { Limit::Floor } else { Limit::Zero }
    }
}

/// Rate limiter for a channel newly unlocked by a ladder neighbour.
///
/// While active, the channel's correction from its baseline may grow by at
/// most `step × scale × (k + 1) / window` over the previous sample's
/// correction, where `k` counts samples since the tracker started.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BlendTracker {
    /// Tracker is ramping.
    pub active: bool,
    /// Samples since start.
    pub progress: usize,
    /// Ramp length.
    pub window: usize,
    /// Neighbour whose saturation started the ramp.
    pub source: Option<usize>,
    /// Correction from the baseline at the previous sample (normalized).
    pub previous: f64,
}

impl BlendTracker {
    /// Start a ramp.
    pub fn start(&mut self, source: usize, window: usize) {
        self.active = true;
        self.progress = 0;
        self.window = window.max(1);
        self.source = Some(source);
    }

    /// Ramp fraction in `(0, 1]`, or 1 when inactive.
    #[must_use]
    pub fn scale(&self) -> f64 {
        if self.active {
            ((self.progress + 1) as f64 / self.window as f64).min(1.0)
        } else {
            1.0
        }
    }

    /// Cap on this sample's movement, if ramping.
    #[must_use]
    pub fn cap(&self, step: f64, share: f64) -> Option<f64> {
        self.active.then(|| self.previous.max(0.0) + step * share * self.scale())
    }

    /// Record this sample's correction and advance the ramp.
    pub fn finish_sample(&mut self, amount: f64) {
        self.previous = amount.max(0.0);
        if self.active {
            self.progress += 1;
            if self.progress >= self.window {
                self.active = false;
                self.source = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CompositeConfig {
        CompositeConfig::default()
    }

    #[test]
    fn test_reserve_states() {
        let cfg = config();
        assert_eq!(reserve_status(0.5, true, &cfg).state, ReserveState::None);
        assert_eq!(reserve_status(0.07, true, &cfg).state, ReserveState::Approaching);
        assert_eq!(reserve_status(0.04, true, &cfg).state, ReserveState::Within);
        assert_eq!(reserve_status(0.0005, true, &cfg).state, ReserveState::Exhausted);
        assert_eq!(reserve_status(0.5, false, &cfg).state, ReserveState::Exhausted);
    }

    #[test]
    fn test_reserve_outstanding() {
        let cfg = config();
        let none = reserve_status(0.5, true, &cfg);
        assert!((none.outstanding - 0.05).abs() < 1e-12);
        let approaching = reserve_status(0.07, true, &cfg);
        assert!((approaching.outstanding - 0.05 * 0.75).abs() < 1e-12);
        let within = reserve_status(0.04, true, &cfg);
        assert!((within.outstanding - 0.04 * 0.5).abs() < 1e-12);
        assert_eq!(reserve_status(0.5, false, &cfg).outstanding, 0.0);
    }

    #[test]
    fn test_capacity_limits() {
        let cfg = config();
        let wide = CoverageLimit { limit: 1.0, buffer: 0.005 };
        let cap = Capacity::evaluate(0.5, 65535, &wide, 0.0, true, &cfg);
        assert!((cap.up - 0.45).abs() < 1e-12);
        assert_eq!(cap.up_limit(), Limit::Reserve);
        assert!((cap.down - 0.5).abs() < 1e-12);
        assert_eq!(cap.down_limit(), Limit::Zero);

        let released = Capacity::evaluate(0.5, 65535, &wide, 0.25, false, &cfg);
        assert!((released.up - 0.5).abs() < 1e-12);
        assert_eq!(released.up_limit(), Limit::End);
        assert!((released.down - 0.25).abs() < 1e-12);
        assert_eq!(released.down_limit(), Limit::Floor);

        let tight = CoverageLimit { limit: 0.3, buffer: 0.0 };
        let capped = Capacity::evaluate(0.2, 65535, &tight, 0.0, false, &cfg);
        assert!((capped.up - 0.1).abs() < 1e-12);
        assert_eq!(capped.up_limit(), Limit::Coverage);
    }

    #[test]
    fn test_blend_tracker_ramps() {
        let mut tracker = BlendTracker::default();
        assert_eq!(tracker.cap(0.02, 1.0), None);

        tracker.start(3, 4);
        let first = tracker.cap(0.02, 1.0).unwrap();
        assert!((first - 0.005).abs() < 1e-12);
        tracker.finish_sample(first);
        let second = tracker.cap(0.02, 1.0).unwrap();
        assert!((second - (0.005 + 0.01)).abs() < 1e-12);

        for _ in 0..3 {
            tracker.finish_sample(0.0);
        }
        assert!(!tracker.active);
        assert_eq!(tracker.source, None);
    }
}

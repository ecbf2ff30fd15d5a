//! Endpoint auto-rolloff.
//!
//! A curve that runs flat into its ink ceiling (or sits on the floor before
//! ink starts) prints as a hard clip. Rolloff detects those plateaus and
//! replaces the approach with a C1 cubic Hermite segment: a soft shoulder
//! into the end value and a soft toe out of zero.
//!
//! Detection scans for a sustained slope collapse near the limit. When the
//! scan finds nothing but the curve still sits on a wide plateau, a fixed
//! fallback knee position is used instead.

use serde::{Deserialize, Serialize};

use crate::interpolation::hermite;

/// Thresholds for plateau detection.
///
/// All `_pct` values are percentages (of the end value for proximity and
/// slope, of the input range for widths and scan bounds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloffConfig {
    /// Soften the toe at the white (zero ink) end.
    pub apply_white: bool,
    /// Soften the shoulder at the black (ink ceiling) end.
    pub apply_black: bool,
    /// How close to the limit counts as "at the limit".
    pub limit_proximity_pct: f64,
    /// Per-sample slope below which the curve counts as flat.
    pub slope_absolute_pct: f64,
    /// Consecutive flat samples required.
    pub sustain_samples: usize,
    /// Minimum knee width.
    pub min_width_pct: f64,
    /// Shoulder scan starts at this input.
    pub black_shoulder_scan_start_pct: f64,
    /// Toe scan ends at this input.
    pub white_toe_scan_end_pct: f64,
    /// Plateau width that triggers the fallback knee.
    pub fallback_plateau_pct: f64,
}

impl Default for RolloffConfig {
    fn default() -> Self {
        Self {
            apply_white: false,
            apply_black: false,
            limit_proximity_pct: 3.0,
            slope_absolute_pct: 0.45,
            sustain_samples: 3,
            min_width_pct: 8.0,
            black_shoulder_scan_start_pct: 80.0,
            white_toe_scan_end_pct: 22.0,
            fallback_plateau_pct: 3.0,
        }
    }
}

impl RolloffConfig {
    /// Enable both ends.
    #[must_use]
    pub fn both() -> Self {
        Self {
            apply_white: true,
            apply_black: true,
            ..Self::default()
        }
    }

    /// Clamp every threshold into its legal range; non-finite values revert to defaults.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        let pick = |v: f64, default: f64, lo: f64, hi: f64| {
            if v.is_finite() { v.clamp(lo, hi) } else { default }
        };
        Self {
            apply_white: self.apply_white,
            apply_black: self.apply_black,
            limit_proximity_pct: pick(self.limit_proximity_pct, d.limit_proximity_pct, 0.5, 20.0),
            slope_absolute_pct: pick(self.slope_absolute_pct, d.slope_absolute_pct, 0.01, 20.0),
            sustain_samples: self.sustain_samples.clamp(1, 64),
            min_width_pct: pick(self.min_width_pct, d.min_width_pct, 1.0, 50.0),
            black_shoulder_scan_start_pct: pick(
                self.black_shoulder_scan_start_pct,
                d.black_shoulder_scan_start_pct,
                0.0,
                100.0,
            ),
            white_toe_scan_end_pct: pick(self.white_toe_scan_end_pct, d.white_toe_scan_end_pct, 0.0, 100.0),
            fallback_plateau_pct: pick(self.fallback_plateau_pct, d.fallback_plateau_pct, 0.0, 50.0),
        }
    }
}

/// One applied knee.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RolloffSegment {
    /// Shoulder start index, or toe end index.
    pub index: usize,
    /// Knee width as a percentage of the input range (0.1 precision).
    pub width_percent: f64,
}

/// What rolloff did to a curve.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RolloffMeta {
    /// Shoulder into the ink ceiling.
    pub shoulder: Option<RolloffSegment>,
    /// Toe out of zero.
    pub toe: Option<RolloffSegment>,
}

impl RolloffMeta {
    /// True when neither knee was applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shoulder.is_none() && self.toe.is_none()
    }
}

struct Thresholds {
    last: usize,
    end: f64,
    eps_y: f64,
    slope_fraction: f64,
    denom: f64,
    sustain: usize,
    min_width_idx: usize,
    fallback_idx: usize,
}

fn round_idx(x: f64) -> usize {
    x.round().max(0.0) as usize
}

/// Apply shoulder/toe rolloff to a curve.
///
/// Curves shorter than 8 samples, a zero end value, or a config with both
/// ends disabled pass through unchanged.
#[must_use]
pub fn apply_endpoint_rolloff(values: &[u32], end_value: u32, config: &RolloffConfig) -> (Vec<u32>, RolloffMeta) {
    let cfg = config.sanitized();
    if values.len() < 8 || end_value == 0 || (!cfg.apply_white && !cfg.apply_black) {
        return (values.to_vec(), RolloffMeta::default());
    }

    let mut arr: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
    let last = arr.len() - 1;
    let end = f64::from(end_value);

    let mut slopes = vec![0.0; arr.len()];
    for i in 1..arr.len() {
        slopes[i] = arr[i] - arr[i - 1];
    }

    let sustain = cfg.sustain_samples;
    let min_width_idx = round_idx(cfg.min_width_pct / 100.0 * last as f64).max(1);
    let th = Thresholds {
        last,
        end,
        eps_y: (cfg.limit_proximity_pct / 100.0 * end).round().max(1.0),
        slope_fraction: cfg.slope_absolute_pct.max(0.0) / 100.0,
        denom: end.max(1.0),
        sustain,
        min_width_idx,
        fallback_idx: round_idx(cfg.fallback_plateau_pct / 100.0 * last as f64).max(sustain),
    };

    let shoulder_start = if cfg.apply_black {
        detect_shoulder(&arr, &slopes, &th, &cfg)
    } else {
        None
    };
    let toe_end = if cfg.apply_white {
        detect_toe(&arr, &slopes, &th, &cfg)
    } else {
        None
    };
    log::trace!("rolloff knees: shoulder={shoulder_start:?} toe={toe_end:?}");

    let mut meta = RolloffMeta::default();
    if let Some(start) = shoulder_start {
        meta.shoulder = apply_shoulder(&mut arr, &slopes, &th, start);
    }
    if let Some(end_idx) = toe_end {
        meta.toe = apply_toe(&mut arr, &slopes, &th, end_idx);
    }

    let out = arr
        .iter()
        .map(|v| v.round().clamp(0.0, end) as u32)
        .collect();
    (out, meta)
}

fn is_flat(slopes: &[f64], th: &Thresholds, idx: usize) -> bool {
    slopes[idx].abs() / th.denom <= th.slope_fraction
}

fn detect_shoulder(arr: &[f64], slopes: &[f64], th: &Thresholds, cfg: &RolloffConfig) -> Option<usize> {
    let last = th.last;
    let mut start = None;

    let scan_from = ((cfg.black_shoulder_scan_start_pct / 100.0) * last as f64).floor().max(1.0) as usize;
    if last >= th.sustain {
        for i in scan_from..=(last - th.sustain) {
            if th.end - arr[i] > th.eps_y {
                continue;
            }
            if (0..th.sustain).all(|k| is_flat(slopes, th, i + k)) {
                start = Some(i);
                break;
            }
        }
    }

    // Fallback: a wide plateau at the ceiling without a clean slope collapse
    if start.is_none() {
        let cap_count = arr.iter().rev().take_while(|&&v| th.end - v <= th.eps_y).count();
        if cap_count >= th.fallback_idx.max(th.min_width_idx) {
            start = Some(round_idx(0.88 * last as f64).max(1));
        }
    }

    let mut start = start?;
    let allowance = (th.eps_y / 2.0).round().max(1.0);
    if th.end - arr[start] > allowance {
        let mut search = start;
        while search <= last && th.end - arr[search] > allowance {
            search += 1;
        }
        if search > last {
            return None;
        }
        start = search;
    }

    let target_width = th.min_width_idx.max(3);
    if last - start < target_width {
        start = last.saturating_sub(target_width).max(1);
    }
    Some(start)
}

fn detect_toe(arr: &[f64], slopes: &[f64], th: &Thresholds, cfg: &RolloffConfig) -> Option<usize> {
    let last = th.last;
    let mut end_idx = None;

    let scan_to = (((cfg.white_toe_scan_end_pct / 100.0) * last as f64).ceil() as usize).min(last - 1);
    if scan_to >= th.sustain {
        for j in (th.sustain..=scan_to).rev() {
            if arr[j] > th.eps_y {
                continue;
            }
            if (0..th.sustain).all(|k| is_flat(slopes, th, j - k)) {
                end_idx = Some(j);
                break;
            }
        }
    }

    if end_idx.is_none() {
        let floor_count = arr.iter().take_while(|&&v| v <= th.eps_y).count();
        if floor_count >= th.fallback_idx.max(th.min_width_idx) {
            end_idx = Some(round_idx(cfg.white_toe_scan_end_pct / 100.0 * last as f64).min(last - 1));
        }
    }

    let mut end_idx = end_idx?;
    let allowance = (th.eps_y / 2.0).round().max(1.0);
    if arr[end_idx] > allowance {
        match (0..=end_idx).rev().find(|&s| arr[s] <= allowance) {
            Some(found) => end_idx = found,
            None => return None,
        }
    }

    let target_width = th.min_width_idx.max(3);
    if end_idx < target_width {
        end_idx = target_width.min(last - 1);
    }
    Some(end_idx)
}

fn width_percent(width: usize, last: usize) -> f64 {
    ((width as f64 / last as f64) * 1000.0).round() / 10.0
}

fn apply_shoulder(arr: &mut [f64], slopes: &[f64], th: &Thresholds, mut start: usize) -> Option<RolloffSegment> {
    let last = th.last;

    // Back off so the join sits meaningfully below the ceiling
    let back_limit = start.saturating_sub(round_idx(0.10 * last as f64));
    let mut ws = start;
    while ws > back_limit && th.end - arr[ws] < th.eps_y {
        ws -= 1;
    }
    if th.end - arr[ws] >= th.eps_y {
        start = ws;
    }

    if th.end - arr[start] < th.eps_y {
        let cap_thresh = (0.02 * th.end).round().max(2.0 * th.eps_y);
        let from = (0.70 * last as f64).floor() as usize;
        let first_cross = (from..=last).find(|&i| th.end - arr[i] <= th.eps_y).unwrap_or(last);
        let mut forced = first_cross.saturating_sub(round_idx(0.05 * last as f64)).max(1);
        while forced > 1 && th.end - arr[forced] < cap_thresh {
            forced -= 1;
        }
        start = start.min(forced).max(1);
    }

    let width = last - start;
    if width < th.min_width_idx.max(3) {
        return None;
    }

    let y0 = arr[start].max(arr[start.saturating_sub(1)]);
    let m0 = slopes[start.max(1)].max(0.0);
    let w = width.max(1) as f64;
    for i in start..=last {
        let t = (i - start) as f64 / w;
        let y = hermite(t, y0, m0 * w, th.end, 0.0).clamp(0.0, th.end);
        let prev = if i > 0 { arr[i - 1] } else { 0.0 };
        arr[i] = prev.max(y.round());
    }

    Some(RolloffSegment {
        index: start,
        width_percent: width_percent(width, last),
    })
}

fn apply_toe(arr: &mut [f64], slopes: &[f64], th: &Thresholds, mut end_idx: usize) -> Option<RolloffSegment> {
    let last = th.last;

    // Advance so the join sits meaningfully above zero
    let fwd_limit = (end_idx + round_idx(0.10 * last as f64)).min(last);
    let mut be = end_idx;
    while be < fwd_limit && arr[be] < th.eps_y {
        be += 1;
    }
    if arr[be] >= th.eps_y {
        end_idx = be;
    }

    if arr[end_idx] < th.eps_y {
        let floor_thresh = (0.02 * th.end).round().max(2.0 * th.eps_y);
        let to = ((0.30 * last as f64).ceil() as usize).min(last);
        let last_floor = (0..=to).rev().find(|&i| arr[i] <= th.eps_y).unwrap_or(0);
        let mut forced = (last_floor + round_idx(0.05 * last as f64)).min(last - 1);
        while forced < last - 1 && arr[forced] < floor_thresh {
            forced += 1;
        }
        end_idx = end_idx.min(forced);
    }

    let width = end_idx;
    if width < th.min_width_idx.max(3) {
        return None;
    }

    let y1 = arr[end_idx];
    let m1 = slopes[end_idx.max(1)].max(0.0);
    let w = end_idx.max(1) as f64;
    for i in 0..=end_idx {
        let t = i as f64 / w;
        let y = hermite(t, 0.0, 0.0, y1, m1 * w).clamp(0.0, th.end);
        // Raise toward the toe without passing the next sample
        let next = if i < last { arr[i + 1] } else { y };
        arr[i] = arr[i].max(y.round()).min(next);
    }

    Some(RolloffSegment {
        index: end_idx,
        width_percent: width_percent(width, last),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CURVE_RESOLUTION;

    fn clipped_ramp(end: u32, knee: usize) -> Vec<u32> {
        (0..CURVE_RESOLUTION)
            .map(|i| ((i as f64 / knee as f64) * f64::from(end)).round().min(f64::from(end)) as u32)
            .collect()
    }

    fn is_monotone(curve: &[u32]) -> bool {
        curve.windows(2).all(|w| w[0] <= w[1])
    }

    #[test]
    fn test_disabled_is_pass_through() {
        let curve = clipped_ramp(40000, 180);
        let (out, meta) = apply_endpoint_rolloff(&curve, 40000, &RolloffConfig::default());
        assert_eq!(out, curve);
        assert!(meta.is_empty());
    }

    #[test]
    fn test_zero_end_is_pass_through() {
        let curve = vec![0; CURVE_RESOLUTION];
        let (out, meta) = apply_endpoint_rolloff(&curve, 0, &RolloffConfig::both());
        assert_eq!(out, curve);
        assert!(meta.is_empty());
    }

    #[test]
    fn test_shoulder_softens_plateau() {
        let end = 40000;
        let curve = clipped_ramp(end, 180);
        let config = RolloffConfig {
            apply_black: true,
            ..RolloffConfig::default()
        };
        let (out, meta) = apply_endpoint_rolloff(&curve, end, &config);

        let shoulder = meta.shoulder.expect("plateau should trigger a shoulder");
        assert!(shoulder.index < 180);
        assert!(shoulder.width_percent > 0.0);
        assert!(is_monotone(&out));
        assert_eq!(out[255], end);
        assert!(out.iter().all(|&v| v <= end));
        // The knee sits below the clip point instead of hitting it at full slope
        assert!(out[178] < curve[178]);
    }

    #[test]
    fn test_toe_lifts_floor() {
        let end = 30000;
        let curve: Vec<u32> = (0..CURVE_RESOLUTION)
            .map(|i| if i < 30 { 0 } else { (((i - 30) as f64 / 225.0) * f64::from(end)).round() as u32 })
            .collect();
        let config = RolloffConfig {
            apply_white: true,
            ..RolloffConfig::default()
        };
        let (out, meta) = apply_endpoint_rolloff(&curve, end, &config);

        assert!(meta.toe.is_some());
        assert!(is_monotone(&out));
        assert_eq!(out[0], 0);
        assert!(out.iter().zip(&curve).all(|(a, b)| a >= b));
        assert_eq!(curve[30], 0);
        assert!(out[30] > 0);
    }

    #[test]
    fn test_sanitized_clamps_overrides() {
        let config = RolloffConfig {
            limit_proximity_pct: 90.0,
            slope_absolute_pct: f64::NAN,
            sustain_samples: 0,
            ..RolloffConfig::default()
        }
        .sanitized();
        assert_eq!(config.limit_proximity_pct, 20.0);
        assert_eq!(config.slope_absolute_pct, 0.45);
        assert_eq!(config.sustain_samples, 1);
    }
}

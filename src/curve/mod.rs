//! Curve synthesis: from a channel's source data to its 256-sample ink curve.
//!
//! The pipeline for one channel is:
//!
//! 1. **Base curve**: loaded curve data, Smart control points, or a linear ramp
//! 2. **Per-channel LUT**: skipped for Smart channels or when disabled
//! 3. **Global LUT**: skipped for Smart channels, baked channels, or on request
//! 4. **Endpoint rolloff**: optional soft toe/shoulder
//! 5. **End renormalization**: optional rescale so the peak equals the end value
//!
//! Every stage degrades to passing its input through. [`CurveSynthesizer::make256`]
//! always returns exactly [`CURVE_RESOLUTION`] samples.
//!
//! ## Example
//!
//! ```
//! use quad_curves::curve::{CurveSource, CurveSynthesizer};
//!
//! let mut synth = CurveSynthesizer::default();
//! synth.set_source("K", CurveSource::Ramp);
//! let curve = synth.make256(30000, "K", false);
//! assert_eq!(curve[0], 0);
//! assert_eq!(curve[255], 30000);
//! ```

pub mod lut;
pub mod rolloff;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::interpolation::{InterpolationKind, LutCurve, LutDomain, Spline};
use crate::{CURVE_RESOLUTION, TOTAL_INK};

pub use lut::{ActiveRange, LutMode, apply_lut, detect_active_range};
pub use rolloff::{RolloffConfig, RolloffMeta, RolloffSegment, apply_endpoint_rolloff};

/// Minimum spacing between Smart control point inputs, in percent.
pub const SMART_MIN_GAP: f64 = 0.01;

/// Loaded curves peaking this close to full scale are used verbatim.
const SMART_DETECT_RATIO: f64 = 0.99;

//============================================================================
// Sources
//============================================================================

/// A Smart-curve key point, both axes in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Input position (0-100).
    pub input: f64,
    /// Output ink amount (0-100, percent of end value).
    pub output: f64,
}

impl ControlPoint {
    /// Create a control point.
    #[must_use]
    pub fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

/// Interpolation between Smart control points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartInterpolation {
    /// Shape-preserving PCHIP.
    #[default]
    Smooth,
    /// Straight segments.
    Linear,
}

/// Clamp, sort and de-duplicate control points.
///
/// Coincident inputs are pushed apart by [`SMART_MIN_GAP`]; a point that
/// would land past 100 is dropped.
#[must_use]
pub fn normalize_control_points(points: &[ControlPoint]) -> Vec<ControlPoint> {
    let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 100.0) } else { 0.0 };
    let mut clamped: Vec<ControlPoint> = points
        .iter()
        .map(|p| ControlPoint::new(clamp(p.input), clamp(p.output)))
        .collect();
    clamped.sort_by(|a, b| a.input.total_cmp(&b.input));

    let mut out: Vec<ControlPoint> = Vec::with_capacity(clamped.len());
    for mut p in clamped {
        if let Some(prev) = out.last() {
            if p.input <= prev.input {
                p.input = prev.input + SMART_MIN_GAP;
                if p.input > 100.0 {
                    continue;
                }
            }
        }
        out.push(p);
    }
    out
}

/// Where a channel's base curve comes from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurveSource {
    /// Curve data loaded from a file.
    Loaded {
        /// Raw curve samples.
        curve: Vec<u32>,
        /// End value the curve was authored against.
        #[serde(default)]
        baseline_end: Option<u32>,
        /// Curve holds Smart samples and must be used verbatim.
        #[serde(default)]
        treat_as_smart: bool,
    },
    /// Sparse key points expanded by interpolation.
    Smart {
        /// Key points (percent axes).
        points: Vec<ControlPoint>,
        /// Interpolation between points.
        #[serde(default)]
        interpolation: SmartInterpolation,
    },
    /// `round(i * end / 255)`.
    #[default]
    Ramp,
}

impl CurveSource {
    /// Smart channels skip both LUT stages.
    #[must_use]
    pub fn is_smart(&self) -> bool {
        match self {
            Self::Smart { points, .. } => points.len() >= 2,
            Self::Loaded { treat_as_smart, .. } => *treat_as_smart,
            Self::Ramp => false,
        }
    }
}

/// Result of the base-curve stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseCurve {
    /// 256 samples.
    pub values: Vec<u32>,
    /// No further stages should run (all-zero result).
    pub short_circuit: bool,
}

impl BaseCurve {
    fn zero() -> Self {
        Self {
            values: vec![0; CURVE_RESOLUTION],
            short_circuit: true,
        }
    }
}

/// Build the base curve for `end_value` from a source.
#[must_use]
pub fn build_base_curve(source: &CurveSource, end_value: u32) -> BaseCurve {
    if end_value == 0 {
        return BaseCurve::zero();
    }
    let end = f64::from(end_value);
    let denom = (CURVE_RESOLUTION - 1) as f64;

    match source {
        CurveSource::Loaded {
            curve,
            baseline_end,
            treat_as_smart,
        } => {
            let curve_max = curve.iter().copied().max().unwrap_or(0);
            if curve_max == 0 {
                return BaseCurve::zero();
            }
            let curve = resample_to_resolution(curve);

            let known_baseline = baseline_end.filter(|&b| b > 0);
            let verbatim = *treat_as_smart
                || (f64::from(curve_max) >= f64::from(TOTAL_INK) * SMART_DETECT_RATIO && known_baseline.is_some());
            let values = if verbatim {
                curve
            } else {
                let scale = end / f64::from(known_baseline.unwrap_or(curve_max));
                curve.iter().map(|&v| (f64::from(v) * scale).round() as u32).collect()
            };
            BaseCurve {
                values: bounded(values, end_value),
                short_circuit: false,
            }
        }
        CurveSource::Smart { points, interpolation } if points.len() >= 2 => {
            let normalized = normalize_control_points(points);
            let xs: Vec<f64> = normalized.iter().map(|p| p.input).collect();
            let ys: Vec<f64> = normalized.iter().map(|p| p.output).collect();
            let kind = match interpolation {
                SmartInterpolation::Smooth => InterpolationKind::Pchip,
                SmartInterpolation::Linear => InterpolationKind::Linear,
            };
            let spline = Spline::new(kind, &xs, &ys);
            let values = (0..CURVE_RESOLUTION)
                .map(|i| {
                    let percent = spline.evaluate(i as f64 / denom * 100.0).clamp(0.0, 100.0);
                    (percent / 100.0 * end).round() as u32
                })
                .collect();
            BaseCurve {
                values,
                short_circuit: false,
            }
        }
        CurveSource::Smart { .. } | CurveSource::Ramp => BaseCurve {
            values: ramp(end_value),
            short_circuit: false,
        },
    }
}

/// Clamp loaded samples into `[0, end_value]` and make them monotonic.
fn bounded(mut values: Vec<u32>, end_value: u32) -> Vec<u32> {
    for v in &mut values {
        *v = (*v).min(end_value);
    }
    enforce_monotonic(&mut values);
    values
}

/// Linear ramp from 0 to `end_value`.
#[must_use]
pub fn ramp(end_value: u32) -> Vec<u32> {
    let step = f64::from(end_value) / (CURVE_RESOLUTION - 1) as f64;
    (0..CURVE_RESOLUTION).map(|i| (i as f64 * step).round() as u32).collect()
}

/// Resample an arbitrary-length curve to [`CURVE_RESOLUTION`] samples.
fn resample_to_resolution(curve: &[u32]) -> Vec<u32> {
    if curve.len() == CURVE_RESOLUTION {
        return curve.to_vec();
    }
    if curve.len() == 1 {
        return vec![curve[0]; CURVE_RESOLUTION];
    }
    let src_last = (curve.len() - 1) as f64;
    (0..CURVE_RESOLUTION)
        .map(|i| {
            let pos = i as f64 / (CURVE_RESOLUTION - 1) as f64 * src_last;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(curve.len() - 1);
            let alpha = pos - lo as f64;
            ((1.0 - alpha) * f64::from(curve[lo]) + alpha * f64::from(curve[hi])).round() as u32
        })
        .collect()
}

//============================================================================
// Linearization
//============================================================================

/// A correction LUT as stored for a channel or globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearizationEntry {
    /// Correction samples (normalized output).
    pub samples: Vec<f64>,
    /// Input coordinate of the first sample.
    #[serde(default)]
    pub domain_min: f64,
    /// Input coordinate of the last sample.
    #[serde(default = "default_domain_max")]
    pub domain_max: f64,
    /// Disabled entries are kept but not applied.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the synthesizer's smoothing percent for this entry.
    #[serde(default)]
    pub smoothing_percent: Option<f64>,
}

fn default_domain_max() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl LinearizationEntry {
    /// Enabled entry over the unit domain.
    #[must_use]
    pub fn new(samples: Vec<f64>) -> Self {
        Self {
            samples,
            domain_min: 0.0,
            domain_max: 1.0,
            enabled: true,
            smoothing_percent: None,
        }
    }

    fn prepare(&self, options: &SynthesisOptions) -> Option<LutCurve> {
        if !self.enabled {
            return None;
        }
        LutCurve::prepare(
            &self.samples,
            LutDomain::new(self.domain_min, self.domain_max),
            options.interpolation,
            self.smoothing_percent.unwrap_or(options.smoothing_percent),
            options.anchor_endpoints,
        )
    }
}

/// Per-channel synthesis state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelCurveState {
    /// Base curve source.
    pub source: CurveSource,
    /// Per-channel correction.
    pub linearization: Option<LinearizationEntry>,
    /// Global correction is already baked into the source.
    pub baked_global: bool,
}

/// Options shared by every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Spline family for LUT fitting.
    pub interpolation: InterpolationKind,
    /// Smoothing reduction applied to LUT samples (0-100).
    pub smoothing_percent: f64,
    /// LUT application strategy.
    pub lut_mode: LutMode,
    /// Force LUT endpoints to exactly 0 and 1.
    pub anchor_endpoints: bool,
    /// Endpoint rolloff thresholds.
    pub rolloff: RolloffConfig,
    /// Rescale so the peak equals the end value.
    pub renormalize_end: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            interpolation: InterpolationKind::Cubic,
            smoothing_percent: 0.0,
            lut_mode: LutMode::FixedDomain,
            anchor_endpoints: false,
            rolloff: RolloffConfig::default(),
            renormalize_end: false,
        }
    }
}

//============================================================================
// Synthesizer
//============================================================================

/// A synthesized curve with rolloff diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedCurve {
    /// Channel name.
    pub channel: String,
    /// End value requested.
    pub end_value: u32,
    /// 256 samples in `[0, end_value]`.
    pub values: Vec<u32>,
    /// What rolloff did.
    pub rolloff: RolloffMeta,
}

/// Owns per-channel sources and LUT state; builds 256-sample curves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveSynthesizer {
    channels: BTreeMap<String, ChannelCurveState>,
    global: Option<LinearizationEntry>,
    options: SynthesisOptions,
}

impl CurveSynthesizer {
    /// Create a synthesizer with the given options.
    #[must_use]
    pub fn new(options: SynthesisOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Shared options.
    #[must_use]
    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    /// Mutable shared options.
    pub fn options_mut(&mut self) -> &mut SynthesisOptions {
        &mut self.options
    }

    /// Set a channel's base source.
    pub fn set_source(&mut self, channel: impl Into<String>, source: CurveSource) {
        self.channels.entry(channel.into()).or_default().source = source;
    }

    /// Set or clear a channel's correction LUT.
    pub fn set_linearization(&mut self, channel: impl Into<String>, entry: Option<LinearizationEntry>) {
        self.channels.entry(channel.into()).or_default().linearization = entry;
    }

    /// Mark a channel's source as already containing the global correction.
    pub fn set_baked_global(&mut self, channel: impl Into<String>, baked: bool) {
        self.channels.entry(channel.into()).or_default().baked_global = baked;
    }

    /// Set or clear the global correction LUT.
    pub fn set_global(&mut self, entry: Option<LinearizationEntry>) {
        self.global = entry;
    }

    /// Channel state, if any has been set.
    #[must_use]
    pub fn channel(&self, channel: &str) -> Option<&ChannelCurveState> {
        self.channels.get(channel)
    }

    /// Names of channels with explicit state.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Build the 256-sample curve for a channel.
    ///
    /// `apply_linearization` gates the global LUT stage. Channels with no
    /// state get a plain ramp.
    #[must_use]
    pub fn make256(&self, end_value: u32, channel: &str, apply_linearization: bool) -> Vec<u32> {
        self.synthesize(end_value, channel, apply_linearization).values
    }

    /// [`make256`](Self::make256) with rolloff diagnostics.
    #[must_use]
    pub fn synthesize(&self, end_value: u32, channel: &str, apply_linearization: bool) -> SynthesizedCurve {
        let end_value = end_value.min(TOTAL_INK);
        let default_state = ChannelCurveState::default();
        let state = self.channels.get(channel).unwrap_or(&default_state);
        let smart = state.source.is_smart();

        let base = build_base_curve(&state.source, end_value);
        let mut curve = SynthesizedCurve {
            channel: channel.to_string(),
            end_value,
            values: base.values,
            rolloff: RolloffMeta::default(),
        };
        if base.short_circuit {
            return curve;
        }

        if !smart {
            if let Some(lut) = state.linearization.as_ref().and_then(|e| e.prepare(&self.options)) {
                curve.values = apply_lut(&curve.values, &lut, end_value, self.options.lut_mode);
                log::trace!("{channel}: per-channel LUT applied");
            }
        }

        if apply_linearization && !smart && !state.baked_global {
            if let Some(lut) = self.global.as_ref().and_then(|e| e.prepare(&self.options)) {
                curve.values = apply_lut(&curve.values, &lut, end_value, self.options.lut_mode);
                log::trace!("{channel}: global LUT applied");
            }
        }

        let (values, meta) = apply_endpoint_rolloff(&curve.values, end_value, &self.options.rolloff);
        curve.values = values;
        curve.rolloff = meta;

        if self.options.renormalize_end {
            renormalize_end(&mut curve.values, end_value);
        }

        curve
    }

    /// Synthesize many channels; independent channels run in parallel.
    #[must_use]
    pub fn synthesize_all(&self, requests: &[(String, u32)], apply_linearization: bool) -> Vec<SynthesizedCurve> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            requests
                .par_iter()
                .map(|(channel, end)| self.synthesize(*end, channel, apply_linearization))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            requests
                .iter()
                .map(|(channel, end)| self.synthesize(*end, channel, apply_linearization))
                .collect()
        }
    }
}

//============================================================================
// Curve utilities
//============================================================================

/// Raise each sample to at least its predecessor.
pub fn enforce_monotonic(curve: &mut [u32]) {
    for i in 1..curve.len() {
        if curve[i] < curve[i - 1] {
            curve[i] = curve[i - 1];
        }
    }
}

/// Float variant of [`enforce_monotonic`]; non-finite samples become 0 first.
pub fn enforce_monotonic_f64(curve: &mut [f64]) {
    for v in curve.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    for i in 1..curve.len() {
        if curve[i] < curve[i - 1] {
            curve[i] = curve[i - 1];
        }
    }
}

/// Rescale so the curve's peak equals `end_value` exactly.
pub fn renormalize_end(curve: &mut [u32], end_value: u32) {
    let peak = curve.iter().copied().max().unwrap_or(0);
    if peak == 0 || peak == end_value {
        return;
    }
    let scale = f64::from(end_value) / f64::from(peak);
    for v in curve.iter_mut() {
        *v = ((f64::from(*v) * scale).round() as u32).min(end_value);
    }
}

/// Index of the first sample holding the curve's maximum.
#[must_use]
pub fn peak_index(curve: &[u32]) -> usize {
    let peak = curve.iter().copied().max().unwrap_or(0);
    curve.iter().position(|&v| v == peak).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_end_short_circuits() {
        let synth = CurveSynthesizer::default();
        let curve = synth.make256(0, "K", true);
        assert_eq!(curve, vec![0; CURVE_RESOLUTION]);
    }

    #[test]
    fn test_ramp_base() {
        let curve = ramp(25500);
        assert_eq!(curve.len(), CURVE_RESOLUTION);
        assert_eq!(curve[1], 100);
        assert_eq!(curve[255], 25500);
    }

    #[test]
    fn test_loaded_curve_rescaled_to_end() {
        let loaded: Vec<u32> = ramp(20000);
        let source = CurveSource::Loaded {
            curve: loaded,
            baseline_end: Some(20000),
            treat_as_smart: false,
        };
        let base = build_base_curve(&source, 40000);
        assert_eq!(base.values[255], 40000);
        assert!(!base.short_circuit);
    }

    #[test]
    fn test_loaded_near_full_scale_used_verbatim() {
        let loaded = ramp(TOTAL_INK);
        let source = CurveSource::Loaded {
            curve: loaded.clone(),
            baseline_end: Some(30000),
            treat_as_smart: false,
        };
        assert_eq!(build_base_curve(&source, TOTAL_INK).values, loaded);
    }

    #[test]
    fn test_loaded_curves_stay_within_end_value() {
        let mut synth = CurveSynthesizer::default();
        synth.set_source(
            "verbatim",
            CurveSource::Loaded {
                curve: ramp(TOTAL_INK),
                baseline_end: Some(TOTAL_INK),
                treat_as_smart: false,
            },
        );
        synth.set_source(
            "scaled",
            CurveSource::Loaded {
                curve: ramp(40000),
                baseline_end: Some(20000),
                treat_as_smart: false,
            },
        );
        let mut bumpy = ramp(40000);
        bumpy[100] = 0;
        synth.set_source(
            "flagged",
            CurveSource::Loaded {
                curve: bumpy,
                baseline_end: None,
                treat_as_smart: true,
            },
        );

        for channel in ["verbatim", "scaled", "flagged"] {
            let curve = synth.make256(30000, channel, true);
            assert_eq!(curve.len(), CURVE_RESOLUTION);
            assert!(curve.iter().all(|&v| v <= 30000), "{channel} exceeds end value");
            assert!(curve.windows(2).all(|w| w[0] <= w[1]), "{channel} not monotonic");
            assert_eq!(curve[255], 30000, "{channel}");
        }
    }

    #[test]
    fn test_all_zero_loaded_short_circuits() {
        let source = CurveSource::Loaded {
            curve: vec![0; CURVE_RESOLUTION],
            baseline_end: None,
            treat_as_smart: false,
        };
        assert!(build_base_curve(&source, 1000).short_circuit);
    }

    #[test]
    fn test_short_loaded_curve_is_resampled() {
        let source = CurveSource::Loaded {
            curve: vec![0, 500, 1000],
            baseline_end: None,
            treat_as_smart: false,
        };
        let base = build_base_curve(&source, 1000);
        assert_eq!(base.values.len(), CURVE_RESOLUTION);
        assert_eq!(base.values[255], 1000);
    }

    #[test]
    fn test_smart_points_expand() {
        let source = CurveSource::Smart {
            points: vec![ControlPoint::new(0.0, 0.0), ControlPoint::new(100.0, 100.0)],
            interpolation: SmartInterpolation::Linear,
        };
        let base = build_base_curve(&source, 25500);
        assert_eq!(base.values, ramp(25500));
    }

    #[test]
    fn test_normalize_control_points() {
        let points = [
            ControlPoint::new(50.0, 40.0),
            ControlPoint::new(-5.0, 0.0),
            ControlPoint::new(50.0, 60.0),
            ControlPoint::new(120.0, 130.0),
        ];
        let normalized = normalize_control_points(&points);
        assert_eq!(normalized[0], ControlPoint::new(0.0, 0.0));
        assert_eq!(normalized[1].input, 50.0);
        assert!((normalized[2].input - 50.01).abs() < 1e-9);
        assert_eq!(normalized[3], ControlPoint::new(100.0, 100.0));
    }

    #[test]
    fn test_smart_channel_skips_luts() {
        let mut synth = CurveSynthesizer::default();
        synth.set_source(
            "K",
            CurveSource::Smart {
                points: vec![ControlPoint::new(0.0, 0.0), ControlPoint::new(100.0, 100.0)],
                interpolation: SmartInterpolation::Linear,
            },
        );
        synth.set_linearization("K", Some(LinearizationEntry::new(vec![0.0, 0.1, 1.0])));
        synth.set_global(Some(LinearizationEntry::new(vec![0.0, 0.1, 1.0])));
        assert_eq!(synth.make256(25500, "K", true), ramp(25500));
    }

    #[test]
    fn test_global_lut_respects_flags() {
        let mut synth = CurveSynthesizer::new(SynthesisOptions {
            interpolation: InterpolationKind::Linear,
            ..SynthesisOptions::default()
        });
        synth.set_global(Some(LinearizationEntry::new(vec![0.0, 0.25, 1.0])));

        let plain = synth.make256(10000, "K", false);
        let corrected = synth.make256(10000, "K", true);
        assert_eq!(plain, ramp(10000));
        assert!(corrected[128] < plain[128]);

        synth.set_baked_global("K", true);
        assert_eq!(synth.make256(10000, "K", true), plain);
    }

    #[test]
    fn test_per_channel_lut_disabled() {
        let mut synth = CurveSynthesizer::default();
        let mut entry = LinearizationEntry::new(vec![0.0, 0.25, 1.0]);
        entry.enabled = false;
        synth.set_linearization("LK", Some(entry));
        assert_eq!(synth.make256(10000, "LK", false), ramp(10000));
    }

    #[test]
    fn test_renormalize_end() {
        let mut curve = vec![0, 100, 200, 500];
        renormalize_end(&mut curve, 1000);
        assert_eq!(curve, vec![0, 200, 400, 1000]);
    }

    #[test]
    fn test_enforce_monotonic() {
        let mut curve = vec![0, 5, 3, 8, 7];
        enforce_monotonic(&mut curve);
        assert_eq!(curve, vec![0, 5, 5, 8, 8]);

        let mut floats = vec![0.1, f64::NAN, 0.05, 0.3];
        enforce_monotonic_f64(&mut floats);
        assert_eq!(floats, vec![0.1, 0.1, 0.1, 0.3]);
    }

    #[test]
    fn test_synthesize_all_preserves_order() {
        let synth = CurveSynthesizer::default();
        let requests = vec![("K".to_string(), 60000), ("LK".to_string(), 20000), ("MK".to_string(), 0)];
        let curves = synth.synthesize_all(&requests, false);
        assert_eq!(curves.len(), 3);
        assert_eq!(curves[0].channel, "K");
        assert_eq!(curves[1].values[255], 20000);
        assert!(curves[2].values.iter().all(|&v| v == 0));
    }
}

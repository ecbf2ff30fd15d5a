//! Spline and LUT interpolation over sparse correction samples.
//!
//! Correction data (linearization LUTs, target density curves) arrives as a
//! short list of evenly spaced samples. This module turns those samples into a
//! continuous function that can be evaluated at any of the 256 curve inputs.
//!
//! ## Key Types
//!
//! - [`InterpolationKind`]: Which spline family to fit
//! - [`Spline`]: A fitted function over arbitrary (strictly increasing) knots
//! - [`LutCurve`]: Samples clamped to `[0, 1]` and fitted over a domain
//!
//! ## Supported Families
//!
//! | Kind | Notes |
//! |------|-------|
//! | `cubic` | Natural cubic spline (C2, may overshoot) |
//! | `catmull` | Catmull-Rom with tension (0 = tight, 1 = loose) |
//! | `pchip` / `smooth` | Shape-preserving, never overshoots monotone data |
//! | `linear` | Piecewise linear |
//!
//! Evaluation outside the knot range always clamps to the nearest endpoint
//! value; nothing here extrapolates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Clamp a value into `[0, 1]`, mapping non-finite input to 0.
#[must_use]
pub fn clamp01(x: f64) -> f64 {
    if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 }
}

/// Spline family used to fit correction samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationKind {
    /// Natural cubic spline.
    #[default]
    Cubic,
    /// Catmull-Rom spline with adjustable tension in `[0, 1]`.
    CatmullRom {
        /// 0.0 is close to linear, 0.5 is standard Catmull-Rom, 1.0 is loose.
        tension: f64,
    },
    /// Piecewise cubic Hermite (monotone-preserving).
    Pchip,
    /// Piecewise linear.
    Linear,
}

impl InterpolationKind {
    /// Standard Catmull-Rom tension.
    pub const DEFAULT_TENSION: f64 = 0.5;

    /// Catmull-Rom with the given tension, clamped to `[0, 1]`.
    #[must_use]
    pub fn catmull(tension: f64) -> Self {
        let tension = if tension.is_finite() {
            tension.clamp(0.0, 1.0)
        } else {
            Self::DEFAULT_TENSION
        };
        Self::CatmullRom { tension }
    }

    /// Short name as accepted by [`FromStr`].
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cubic => "cubic",
            Self::CatmullRom { .. } => "catmull",
            Self::Pchip => "pchip",
            Self::Linear => "linear",
        }
    }
}

impl FromStr for InterpolationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cubic" => Ok(Self::Cubic),
            "catmull" | "catmull-rom" | "catmullrom" => Ok(Self::catmull(Self::DEFAULT_TENSION)),
            // "smooth" is the historical name for the shape-preserving mode
            "pchip" | "smooth" => Ok(Self::Pchip),
            "linear" => Ok(Self::Linear),
            other => Err(Error::UnknownInterpolation(other.to_string())),
        }
    }
}

impl fmt::Display for InterpolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
enum Segments {
    Constant(f64),
    Natural { second: Vec<f64> },
    CatmullRom { tension: f64 },
    Pchip { slopes: Vec<f64> },
    Linear,
}

/// A fitted interpolation function over strictly increasing knots.
///
/// Construction never fails: fewer than two usable knots (or knots that are
/// not strictly increasing) produce a constant function of the first sample.
///
/// # Example
///
/// ```
/// use quad_curves::interpolation::{InterpolationKind, Spline};
///
/// let spline = Spline::new(InterpolationKind::Pchip, &[0.0, 0.5, 1.0], &[0.0, 0.7, 1.0]);
/// assert!((spline.evaluate(0.5) - 0.7).abs() < 1e-12);
/// assert_eq!(spline.evaluate(2.0), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct Spline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    segments: Segments,
}

impl Spline {
    /// Fit a spline of the given kind.
    #[must_use]
    pub fn new(kind: InterpolationKind, xs: &[f64], ys: &[f64]) -> Self {
        let n = xs.len().min(ys.len());
        let xs = xs[..n].to_vec();
        let ys: Vec<f64> = ys[..n]
            .iter()
            .map(|y| if y.is_finite() { *y } else { 0.0 })
            .collect();

        let usable = n >= 2
            && xs.iter().all(|x| x.is_finite())
            && xs.windows(2).all(|w| w[1] > w[0]);
        if !usable {
            let constant = ys.first().copied().unwrap_or(0.0);
            return Self {
                xs,
                ys,
                segments: Segments::Constant(constant),
            };
        }

        let segments = match kind {
            InterpolationKind::Cubic => Segments::Natural {
                second: natural_second_derivatives(&xs, &ys),
            },
            InterpolationKind::CatmullRom { tension } => Segments::CatmullRom {
                tension: tension.clamp(0.0, 1.0),
            },
            InterpolationKind::Pchip => Segments::Pchip {
                slopes: pchip_slopes(&xs, &ys),
            },
            InterpolationKind::Linear => Segments::Linear,
        };

        Self { xs, ys, segments }
    }

    /// Evaluate at `t`, clamping to the endpoint values outside the knots.
    #[must_use]
    pub fn evaluate(&self, t: f64) -> f64 {
        if let Segments::Constant(c) = self.segments {
            return c;
        }
        let n = self.xs.len();
        if !t.is_finite() || t <= self.xs[0] {
            return self.ys[0];
        }
        if t >= self.xs[n - 1] {
            return self.ys[n - 1];
        }

        let i = find_interval(&self.xs, t);
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let h = x1 - x0;

        match &self.segments {
            Segments::Constant(c) => *c,
            Segments::Natural { second } => {
                let a = (x1 - t) / h;
                let b = (t - x0) / h;
                a * y0 + b * y1 + ((a * a * a - a) * second[i] + (b * b * b - b) * second[i + 1]) * h * h / 6.0
            }
            Segments::CatmullRom { tension } => {
                let s = *tension;
                let p0 = self.ys[i.saturating_sub(1)];
                let p3 = self.ys[(i + 2).min(n - 1)];
                let u = (t - x0) / h;
                let u2 = u * u;
                let u3 = u2 * u;
                let q0 = -s * u3 + 2.0 * s * u2 - s * u;
                let q1 = (2.0 - s) * u3 + (s - 3.0) * u2 + 1.0;
                let q2 = (s - 2.0) * u3 + (3.0 - 2.0 * s) * u2 + s * u;
                let q3 = s * u3 - s * u2;
                p0 * q0 + y0 * q1 + y1 * q2 + p3 * q3
            }
            Segments::Pchip { slopes } => {
                let u = (t - x0) / h;
                hermite(u, y0, slopes[i] * h, y1, slopes[i + 1] * h)
            }
            Segments::Linear => {
                let alpha = (t - x0) / h;
                (1.0 - alpha) * y0 + alpha * y1
            }
        }
    }

    /// Knot positions.
    #[must_use]
    pub fn knots(&self) -> &[f64] {
        &self.xs
    }
}

/// Cubic Hermite segment on `u ∈ [0, 1]` with scaled tangents `m0`, `m1`.
#[must_use]
pub fn hermite(u: f64, y0: f64, m0: f64, y1: f64, m1: f64) -> f64 {
    let u2 = u * u;
    let u3 = u2 * u;
    let h00 = 2.0 * u3 - 3.0 * u2 + 1.0;
    let h10 = u3 - 2.0 * u2 + u;
    let h01 = -2.0 * u3 + 3.0 * u2;
    let h11 = u3 - u2;
    h00 * y0 + h10 * m0 + h01 * y1 + h11 * m1
}

/// Index `i` such that `xs[i] <= t < xs[i + 1]`, clamped to `[0, n - 2]`.
fn find_interval(xs: &[f64], t: f64) -> usize {
    let n = xs.len();
    let mut lo = 0;
    let mut hi = n - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if xs[mid] <= t {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Second derivatives of the natural cubic spline (zero at both ends).
fn natural_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut y2 = vec![0.0; n];
    let mut u = vec![0.0; n];

    // Forward sweep of the tridiagonal system
    for i in 1..n - 1 {
        let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
        let p = sig * y2[i - 1] + 2.0;
        y2[i] = (sig - 1.0) / p;
        let d = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]) - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
        u[i] = (6.0 * d / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
    }

    y2[n - 1] = 0.0;
    for k in (0..n - 1).rev() {
        y2[k] = y2[k] * y2[k + 1] + u[k];
    }
    y2[0] = 0.0;
    y2
}

/// PCHIP tangents: weighted harmonic mean inside monotone runs, zero at extrema.
fn pchip_slopes(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let delta: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

    let mut slopes = vec![0.0; n];
    slopes[0] = delta[0];
    slopes[n - 1] = delta[n - 2];
    for i in 1..n - 1 {
        if delta[i - 1] * delta[i] <= 0.0 {
            slopes[i] = 0.0;
        } else {
            let w1 = 2.0 * h[i] + h[i - 1];
            let w2 = h[i] + 2.0 * h[i - 1];
            slopes[i] = (w1 + w2) / (w1 / delta[i - 1] + w2 / delta[i]);
        }
    }
    slopes
}

/// Smoothing reduction for noisy correction samples.
///
/// Centered moving average with radius `round(percent/100 * (n-1)/8)`. The
/// first and last samples are preserved so the curve endpoints do not move.
#[must_use]
pub fn smooth_samples(samples: &[f64], percent: f64) -> Vec<f64> {
    let n = samples.len();
    if n < 3 || !percent.is_finite() || percent <= 0.0 {
        return samples.to_vec();
    }
    let radius = ((percent.min(100.0) / 100.0) * (n - 1) as f64 / 8.0).round() as usize;
    if radius == 0 {
        return samples.to_vec();
    }

    let mut out = samples.to_vec();
    for (i, slot) in out.iter_mut().enumerate().take(n - 1).skip(1) {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(n - 1);
        let window = &samples[lo..=hi];
        *slot = window.iter().sum::<f64>() / window.len() as f64;
    }
    out
}

/// Input domain of a LUT (the x range its samples are spread over).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LutDomain {
    /// Domain start.
    pub min: f64,
    /// Domain end.
    pub max: f64,
}

impl LutDomain {
    /// Create a domain.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the domain; degenerate domains fall back to 1.
    #[must_use]
    pub fn span(&self) -> f64 {
        let span = self.max - self.min;
        if span.is_finite() && span.abs() > 1e-9 { span } else { 1.0 }
    }

    /// Start of the domain (0 when non-finite).
    #[must_use]
    pub fn start(&self) -> f64 {
        if self.min.is_finite() { self.min } else { 0.0 }
    }
}

impl Default for LutDomain {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Correction samples fitted over a domain, output clamped to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct LutCurve {
    spline: Spline,
    samples: Vec<f64>,
    start: f64,
    span: f64,
}

impl LutCurve {
    /// Prepare a LUT from raw samples.
    ///
    /// Pipeline: smoothing reduction → clamp to `[0, 1]` → optional endpoint
    /// anchoring (first = 0, last = 1) → spline over evenly spaced knots.
    ///
    /// Returns `None` with fewer than two samples.
    #[must_use]
    pub fn prepare(
        samples: &[f64],
        domain: LutDomain,
        kind: InterpolationKind,
        smoothing_percent: f64,
        anchor_endpoints: bool,
    ) -> Option<Self> {
        if samples.len() < 2 {
            return None;
        }

        let mut processed: Vec<f64> = smooth_samples(samples, smoothing_percent)
            .into_iter()
            .map(clamp01)
            .collect();
        if anchor_endpoints {
            processed[0] = 0.0;
            let last = processed.len() - 1;
            processed[last] = 1.0;
        }

        let start = domain.start();
        let span = domain.span();
        let count = processed.len();
        let xs: Vec<f64> = (0..count)
            .map(|i| start + (i as f64 / (count - 1) as f64) * span)
            .collect();

        // Spline knots must increase; a reversed domain is fitted on the
        // mirrored axis.
        let spline = if span > 0.0 {
            Spline::new(kind, &xs, &processed)
        } else {
            let rev_x: Vec<f64> = xs.iter().rev().copied().collect();
            let rev_y: Vec<f64> = processed.iter().rev().copied().collect();
            Spline::new(kind, &rev_x, &rev_y)
        };

        Some(Self {
            spline,
            samples: processed,
            start,
            span,
        })
    }

    /// Evaluate at a domain coordinate, clamped to the domain and to `[0, 1]`.
    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        let (lo, hi) = if self.span > 0.0 {
            (self.start, self.start + self.span)
        } else {
            (self.start + self.span, self.start)
        };
        let x = if x.is_finite() { x.clamp(lo, hi) } else { lo };
        clamp01(self.spline.evaluate(x))
    }

    /// Evaluate at a normalized input `t ∈ [0, 1]` mapped onto the domain.
    #[must_use]
    pub fn evaluate_normalized(&self, t: f64) -> f64 {
        self.evaluate(self.start + clamp01(t) * self.span)
    }

    /// Processed (smoothed, clamped, anchored) samples.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [InterpolationKind; 4] = [
        InterpolationKind::Cubic,
        InterpolationKind::CatmullRom { tension: 0.5 },
        InterpolationKind::Pchip,
        InterpolationKind::Linear,
    ];

    #[test]
    fn test_interpolation_kind_from_str() {
        assert_eq!("cubic".parse::<InterpolationKind>().unwrap(), InterpolationKind::Cubic);
        assert_eq!("SMOOTH".parse::<InterpolationKind>().unwrap(), InterpolationKind::Pchip);
        assert_eq!("pchip".parse::<InterpolationKind>().unwrap(), InterpolationKind::Pchip);
        assert_eq!("linear".parse::<InterpolationKind>().unwrap(), InterpolationKind::Linear);
        assert_eq!(
            "catmull".parse::<InterpolationKind>().unwrap(),
            InterpolationKind::CatmullRom { tension: 0.5 }
        );
        assert!("bezier".parse::<InterpolationKind>().is_err());
    }

    #[test]
    fn test_all_kinds_pass_through_knots() {
        let xs = [0.0, 0.25, 0.5, 0.75, 1.0];
        let ys = [0.0, 0.2, 0.45, 0.8, 1.0];
        for kind in ALL_KINDS {
            let spline = Spline::new(kind, &xs, &ys);
            for (x, y) in xs.iter().zip(&ys) {
                assert!((spline.evaluate(*x) - y).abs() < 1e-9, "{kind} missed knot {x}");
            }
        }
    }

    #[test]
    fn test_evaluation_clamps_outside_domain() {
        let spline = Spline::new(InterpolationKind::Cubic, &[0.0, 0.5, 1.0], &[0.1, 0.4, 0.9]);
        assert_eq!(spline.evaluate(-3.0), 0.1);
        assert_eq!(spline.evaluate(7.0), 0.9);
        assert_eq!(spline.evaluate(f64::NAN), 0.1);
    }

    #[test]
    fn test_pchip_preserves_monotonicity() {
        let xs = [0.0, 0.1, 0.2, 0.6, 1.0];
        let ys = [0.0, 0.02, 0.5, 0.52, 1.0];
        let spline = Spline::new(InterpolationKind::Pchip, &xs, &ys);
        let mut prev = spline.evaluate(0.0);
        for i in 1..=200 {
            let y = spline.evaluate(i as f64 / 200.0);
            assert!(y >= prev - 1e-12, "pchip decreased at {i}");
            prev = y;
        }
    }

    #[test]
    fn test_linear_midpoint() {
        let spline = Spline::new(InterpolationKind::Linear, &[0.0, 1.0], &[0.2, 0.6]);
        assert!((spline.evaluate(0.5) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_knots_are_constant() {
        let spline = Spline::new(InterpolationKind::Cubic, &[0.5], &[0.3]);
        assert_eq!(spline.evaluate(0.9), 0.3);

        let spline = Spline::new(InterpolationKind::Cubic, &[0.0, 0.0, 1.0], &[0.2, 0.4, 0.6]);
        assert_eq!(spline.evaluate(0.7), 0.2);

        let spline = Spline::new(InterpolationKind::Linear, &[], &[]);
        assert_eq!(spline.evaluate(0.5), 0.0);
    }

    #[test]
    fn test_smooth_samples_preserves_endpoints() {
        let samples: Vec<f64> = (0..33).map(|i| if i % 2 == 0 { 0.4 } else { 0.6 }).collect();
        let smoothed = smooth_samples(&samples, 50.0);
        assert_eq!(smoothed[0], samples[0]);
        assert_eq!(smoothed[32], samples[32]);
        let spread = smoothed[1..32].iter().fold(0.0_f64, |m, v| m.max((v - 0.5).abs()));
        assert!(spread < 0.1);
        assert_eq!(smooth_samples(&samples, 0.0), samples);
    }

    #[test]
    fn test_lut_curve_clamps_and_anchors() {
        let lut = LutCurve::prepare(
            &[0.1, 1.4, -0.2, 0.9],
            LutDomain::default(),
            InterpolationKind::Linear,
            0.0,
            false,
        )
        .unwrap();
        assert_eq!(lut.samples(), &[0.1, 1.0, 0.0, 0.9]);

        let anchored = LutCurve::prepare(
            &[0.1, 0.5, 0.9],
            LutDomain::default(),
            InterpolationKind::Linear,
            0.0,
            true,
        )
        .unwrap();
        assert_eq!(anchored.evaluate(0.0), 0.0);
        assert_eq!(anchored.evaluate(1.0), 1.0);
    }

    #[test]
    fn test_lut_curve_domain_mapping() {
        let lut = LutCurve::prepare(
            &[0.0, 1.0],
            LutDomain::new(0.0, 100.0),
            InterpolationKind::Linear,
            0.0,
            false,
        )
        .unwrap();
        assert!((lut.evaluate(25.0) - 0.25).abs() < 1e-12);
        assert!((lut.evaluate_normalized(0.5) - 0.5).abs() < 1e-12);
        assert_eq!(lut.evaluate(250.0), 1.0);
    }

    #[test]
    fn test_lut_curve_requires_two_samples() {
        assert!(LutCurve::prepare(&[0.5], LutDomain::default(), InterpolationKind::Cubic, 0.0, false).is_none());
    }
}

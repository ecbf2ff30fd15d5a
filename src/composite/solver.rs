//! Density weight solver.
//!
//! Finds one scalar weight per channel such that
//! `Σ weight[c] × normalized[c][i]` approximates the target density at every
//! sample. Manual overrides are fixed and subtracted from the target first;
//! the remaining channels are fitted with ridge-regularized normal equations
//! solved by Gauss-Jordan elimination.
//!
//! The solver never fails. A singular system or a non-positive weight falls
//! back to an end-value heuristic and records a warning.

use serde::{Deserialize, Serialize};

use super::config::{CompositeConfig, WeightingMode};
use super::momentum::{MOMENTUM_RADIUS, momentum_series};
use crate::TOTAL_INK;

/// Where a channel's weight came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// Least-squares solution.
    Solved,
    /// End-value heuristic.
    Default,
    /// Caller override.
    Manual,
    /// Equal weighting.
    Equal,
    /// Channel has no ink and takes no part.
    Inactive,
}

/// Coverage ceiling of a channel, in fractions of total ink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageLimit {
    /// Ceiling.
    pub limit: f64,
    /// Slack above the ceiling.
    pub buffer: f64,
}

impl CoverageLimit {
    /// Ceiling plus slack.
    #[must_use]
    pub fn buffered(&self) -> f64 {
        self.limit + self.buffer
    }
}

/// Solver output.
#[derive(Debug, Clone)]
pub struct DensitySolution {
    /// Weight per channel (0 for inactive channels).
    pub weights: Vec<f64>,
    /// Origin of each weight.
    pub sources: Vec<WeightSource>,
    /// Channels with positive end value and positive baseline peak.
    pub active: Vec<bool>,
    /// Coverage ceiling per channel.
    pub coverage: Vec<CoverageLimit>,
    /// Per-sample share of density per channel (`prior[sample][channel]`).
    pub prior: Vec<Vec<f64>>,
    /// Peak momentum per channel (all zero outside momentum mode).
    pub momentum_peaks: Vec<f64>,
    /// The normal equations had no usable pivot.
    pub singular: bool,
    /// Degradation notices.
    pub warnings: Vec<String>,
}

/// Solve a dense linear system with Gauss-Jordan elimination and partial pivoting.
///
/// Returns `None` when a pivot magnitude falls below `tolerance`.
#[must_use]
pub fn gauss_jordan(mut a: Vec<Vec<f64>>, mut b: Vec<f64>, tolerance: f64) -> Option<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))?;
        let pivot = a[pivot_row][col];
        if !pivot.is_finite() || pivot.abs() < tolerance {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let inv = 1.0 / pivot;
        for v in &mut a[col] {
            *v *= inv;
        }
        b[col] *= inv;

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    b.iter().all(|v| v.is_finite()).then_some(b)
}

/// Normalized curve `value / end`, clamped to `[0, 1]`.
#[must_use]
pub fn normalize_curve(curve: &[u32], end_value: u32) -> Vec<f64> {
    if end_value == 0 {
        return vec![0.0; curve.len()];
    }
    let end = f64::from(end_value);
    curve.iter().map(|&v| (f64::from(v) / end).clamp(0.0, 1.0)).collect()
}

/// Inputs to [`solve_density_weights`].
#[derive(Debug, Clone, Copy)]
pub struct SolverInput<'a> {
    /// End value per channel.
    pub end_values: &'a [u32],
    /// Baseline curve per channel.
    pub baselines: &'a [Vec<u32>],
    /// Target density per sample.
    pub target: &'a [f64],
    /// Weighting mode.
    pub mode: WeightingMode,
    /// Manual weight per channel.
    pub manual: &'a [Option<f64>],
}

/// Compute weights, coverage ceilings and the per-sample share prior.
#[must_use]
pub fn solve_density_weights(input: &SolverInput<'_>, config: &CompositeConfig) -> DensitySolution {
    let channel_count = input.end_values.len();
    let samples = input.target.len();
    let normalized: Vec<Vec<f64>> = input
        .baselines
        .iter()
        .zip(input.end_values)
        .map(|(curve, &end)| normalize_curve(curve, end))
        .collect();
    let peaks: Vec<u32> = input
        .baselines
        .iter()
        .map(|c| c.iter().copied().max().unwrap_or(0))
        .collect();
    let active: Vec<bool> = (0..channel_count)
        .map(|c| input.end_values[c] > 0 && peaks[c] > 0)
        .collect();

    let mut weights = vec![0.0; channel_count];
    let mut sources = vec![WeightSource::Inactive; channel_count];
    let mut warnings = Vec::new();
    let mut singular = false;

    let target_peak = input.target.iter().copied().fold(0.0_f64, f64::max);
    let active_end_total: f64 = (0..channel_count)
        .filter(|&c| active[c])
        .map(|c| f64::from(input.end_values[c]))
        .sum();
    let default_weight = |c: usize| -> f64 {
        let share = if active_end_total > 0.0 {
            f64::from(input.end_values[c]) / active_end_total
        } else {
            0.0
        };
        (target_peak * share).clamp(config.min_density, config.max_density)
    };

    match input.mode {
        WeightingMode::Equal => {
            for c in (0..channel_count).filter(|&c| active[c]) {
                weights[c] = 1.0;
                sources[c] = WeightSource::Equal;
            }
        }
        WeightingMode::Normalized | WeightingMode::Momentum | WeightingMode::Isolated => {
            let mut free = Vec::new();
            for c in (0..channel_count).filter(|&c| active[c]) {
                match input.manual.get(c).copied().flatten() {
                    Some(m) if m.is_finite() => {
                        weights[c] = m.clamp(0.0, config.max_density);
                        sources[c] = WeightSource::Manual;
                    }
                    _ => free.push(c),
                }
            }

            // Residual target after fixed contributions
            let residual: Vec<f64> = (0..samples)
                .map(|i| {
                    let fixed: f64 = (0..channel_count)
                        .filter(|&c| sources[c] == WeightSource::Manual)
                        .map(|c| weights[c] * normalized[c][i])
                        .sum();
                    input.target[i] - fixed
                })
                .collect();

            if !free.is_empty() {
                match solve_free_weights(&free, &normalized, &residual, config) {
                    Some(solution) => {
                        for (&c, w) in free.iter().zip(solution) {
                            if w > 0.0 {
                                weights[c] = w.clamp(config.min_density, config.max_density);
                                sources[c] = WeightSource::Solved;
                            } else {
                                weights[c] = default_weight(c);
                                sources[c] = WeightSource::Default;
                            }
                        }
                    }
                    None => {
                        singular = true;
                        for &c in &free {
                            weights[c] = default_weight(c);
                            sources[c] = WeightSource::Default;
                        }
                        let msg = "density weight system is singular; using end-value defaults".to_string();
                        log::warn!("{msg}");
                        warnings.push(msg);
                    }
                }
            }
        }
    }

    let coverage: Vec<CoverageLimit> = (0..channel_count)
        .map(|c| {
            let total = f64::from(TOTAL_INK);
            let end_fraction = f64::from(input.end_values[c]) / total;
            let peak_fraction = f64::from(peaks[c]) / total;
            CoverageLimit {
                limit: weights[c].min(end_fraction).max(peak_fraction),
                buffer: config.coverage_buffer,
            }
        })
        .collect();

    let momentum: Vec<Vec<f64>> = if input.mode == WeightingMode::Momentum {
        normalized.iter().map(|n| momentum_series(n, MOMENTUM_RADIUS)).collect()
    } else {
        vec![vec![0.0; samples]; channel_count]
    };
    let momentum_peaks = momentum
        .iter()
        .map(|m| m.iter().copied().fold(0.0_f64, f64::max))
        .collect();

    let prior = (0..samples)
        .map(|i| {
            let raw: Vec<f64> = (0..channel_count)
                .map(|c| {
                    if !active[c] {
                        return 0.0;
                    }
                    let n = normalized[c].get(i).copied().unwrap_or(0.0);
                    n * (1.0 + momentum[c].get(i).copied().unwrap_or(0.0))
                })
                .collect();
            let total: f64 = raw.iter().sum();
            if total > 0.0 {
                raw.iter().map(|v| v / total).collect()
            } else {
                vec![0.0; channel_count]
            }
        })
        .collect();

    log::debug!(
        "density weights ({}): {:?} sources {:?}",
        input.mode,
        weights,
        sources
    );

    DensitySolution {
        weights,
        sources,
        active,
        coverage,
        prior,
        momentum_peaks,
        singular,
        warnings,
    }
}

/// Ridge-regularized least squares over the free channels.
fn solve_free_weights(
    free: &[usize],
    normalized: &[Vec<f64>],
    residual: &[f64],
    config: &CompositeConfig,
) -> Option<Vec<f64>> {
    let k = free.len();
    let mut ata = vec![vec![0.0; k]; k];
    let mut atb = vec![0.0; k];
    for (i, r) in residual.iter().enumerate() {
        for (a, &ca) in free.iter().enumerate() {
            let xa = normalized[ca][i];
            atb[a] += xa * r;
            for (b, &cb) in free.iter().enumerate() {
                ata[a][b] += xa * normalized[cb][i];
            }
        }
    }

    let trace: f64 = (0..k).map(|i| ata[i][i]).sum();
    let lambda = if trace > 0.0 { config.ridge * trace / k as f64 } else { config.ridge };
    for (i, row) in ata.iter_mut().enumerate() {
        row[i] += lambda;
    }

    gauss_jordan(ata, atb, config.pivot_tolerance)
}

//! Hand-off smoothing.
//!
//! When one channel stops absorbing corrections and another takes over, the
//! per-channel correction series has a step at the hand-off. This pass
//! replaces the step with a short cross-fade: inside a window centred on the
//! hand-off the outgoing channel keeps `(1 − p)^α` of the participants'
//! combined correction and the incoming channels share the rest. The
//! per-sample total is unchanged, so the modelled density is preserved.

use super::config::SmoothingWindowConfig;
use super::report::SmoothingWindow;

const CONTRIBUTION_EPSILON: f64 = 1e-9;

/// Inputs to [`apply_smoothing_windows`].
#[derive(Debug, Clone, Copy)]
pub struct SmoothingContext<'a> {
    /// Channel names.
    pub names: &'a [String],
    /// Active flag per channel.
    pub active: &'a [bool],
    /// Density correction per channel per sample (`contributions[c][i]`).
    pub contributions: &'a [Vec<f64>],
    /// First clamp-event sample per channel.
    pub first_clamp: &'a [Option<usize>],
}

/// Output of [`apply_smoothing_windows`].
#[derive(Debug, Clone, Default)]
pub struct SmoothingOutcome {
    /// Smoothed corrections, same shape as the input.
    pub contributions: Vec<Vec<f64>>,
    /// Windows applied.
    pub windows: Vec<SmoothingWindow>,
    /// Sum of each channel's smoothed corrections.
    pub totals: Vec<f64>,
}

/// Hand-off sample of one correction series.
///
/// The first sample where the series stays below `drop_ratio` × its running
/// peak for `sustain` consecutive samples.
#[must_use]
pub fn detect_handoff(series: &[f64], drop_ratio: f64, sustain: usize) -> Option<usize> {
    let sustain = sustain.max(1);
    let mut peak = 0.0_f64;
    let mut run = 0;
    for (i, &v) in series.iter().enumerate() {
        if peak > CONTRIBUTION_EPSILON && v < drop_ratio * peak {
            run += 1;
            if run >= sustain {
                return Some(i + 1 - sustain);
            }
        } else {
            run = 0;
            peak = peak.max(v);
        }
    }
    None
}

/// Cross-fade every detected hand-off.
#[must_use]
pub fn apply_smoothing_windows(ctx: &SmoothingContext<'_>, config: &SmoothingWindowConfig) -> SmoothingOutcome {
    let mut contributions = ctx.contributions.to_vec();
    let mut windows = Vec::new();

    if config.enabled {
        let len = contributions.iter().map(Vec::len).min().unwrap_or(0);
        let window_len = config.window_len(len);
        let mut claimed: Vec<(usize, usize)> = Vec::new();

        for out in (0..contributions.len()).filter(|&c| ctx.active.get(c).copied().unwrap_or(false)) {
            let handoff = if config.per_sample_ceiling {
                ctx.first_clamp.get(out).copied().flatten()
            } else {
                detect_handoff(&contributions[out][..len], config.drop_ratio, config.sustain_samples)
            };
            let Some(handoff) = handoff else { continue };
            if len < 2 {
                continue;
            }

            let start = handoff.saturating_sub(window_len / 2);
            let end = (start + window_len - 1).min(len - 1);
            if end <= start || claimed.iter().any(|&(s, e)| start <= e && s <= end) {
                continue;
            }

            let incoming: Vec<usize> = (0..contributions.len())
                .filter(|&c| c != out && ctx.active.get(c).copied().unwrap_or(false))
                .filter(|&c| contributions[c][end] > contributions[c][start] + CONTRIBUTION_EPSILON)
                .collect();
            if incoming.is_empty() {
                continue;
            }

            let participants: Vec<usize> = std::iter::once(out).chain(incoming.iter().copied()).collect();
            let negative = participants
                .iter()
                .any(|&c| contributions[c][start..=end].iter().any(|&v| v < 0.0));
            if negative {
                continue;
            }

            let in_totals: Vec<f64> = incoming
                .iter()
                .map(|&c| contributions[c][start..=end].iter().sum())
                .collect();
            let in_sum: f64 = in_totals.iter().sum();
            let span = (end - start + 1) as f64;

            for j in start..=end {
                let pool: f64 = participants.iter().map(|&c| contributions[c][j]).sum();
                let p = (j - start + 1) as f64 / (span + 1.0);
                let kept = pool * (1.0 - p).powf(config.alpha);
                contributions[out][j] = kept;
                for (&c, &total) in incoming.iter().zip(&in_totals) {
                    let share = if in_sum > 0.0 { total / in_sum } else { 1.0 / incoming.len() as f64 };
                    contributions[c][j] = (pool - kept) * share;
                }
            }

            log::debug!(
                "smoothing hand-off {} -> {:?} at {} over [{}, {}]",
                ctx.names[out],
                incoming.iter().map(|&c| ctx.names[c].as_str()).collect::<Vec<_>>(),
                handoff,
                start,
                end
            );
            claimed.push((start, end));
            windows.push(SmoothingWindow {
                outgoing: ctx.names[out].clone(),
                incoming: incoming.iter().map(|&c| ctx.names[c].clone()).collect(),
                handoff_index: handoff,
                start,
                end,
            });
        }
    }

    let totals = contributions.iter().map(|c| c.iter().sum::<f64>()).collect();
    SmoothingOutcome {
        contributions,
        windows,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_pair() -> Vec<Vec<f64>> {
        let out: Vec<f64> = (0..256).map(|i| if i < 100 { 0.1 } else { 0.0 }).collect();
        let inc: Vec<f64> = (0..256).map(|i| if i < 100 { 0.0 } else { 0.1 }).collect();
        vec![out, inc]
    }

    #[test]
    fn test_detect_handoff() {
        let series = step_pair();
        assert_eq!(detect_handoff(&series[0], 0.6, 2), Some(100));
        assert_eq!(detect_handoff(&series[1], 0.6, 2), None);
        // A one-sample dip is not sustained
        let mut dip = vec![0.1; 50];
        dip[20] = 0.0;
        assert_eq!(detect_handoff(&dip, 0.6, 2), None);
    }

    #[test]
    fn test_handoff_window_conserves_density() {
        let contributions = step_pair();
        let names = vec!["LK".to_string(), "K".to_string()];
        let ctx = SmoothingContext {
            names: &names,
            active: &[true, true],
            contributions: &contributions,
            first_clamp: &[None, None],
        };
        let outcome = apply_smoothing_windows(&ctx, &SmoothingWindowConfig::default());

        assert_eq!(outcome.windows.len(), 1);
        let window = &outcome.windows[0];
        assert_eq!(window.outgoing, "LK");
        assert_eq!(window.incoming, vec!["K".to_string()]);
        assert_eq!(window.handoff_index, 100);
        assert_eq!((window.start, window.end), (96, 104));

        for i in 0..256 {
            let before = contributions[0][i] + contributions[1][i];
            let after = outcome.contributions[0][i] + outcome.contributions[1][i];
            assert!((before - after).abs() < 1e-6, "sample {i}");
        }
        let before_total: f64 = contributions.iter().flatten().sum();
        let after_total: f64 = outcome.totals.iter().sum();
        assert!((before_total - after_total).abs() < 1e-6);

        // Strict cross-fade inside the window
        let out = &outcome.contributions[0];
        let inc = &outcome.contributions[1];
        for j in 96..104 {
            assert!(out[j + 1] < out[j], "outgoing not decreasing at {j}");
            assert!(inc[j + 1] > inc[j], "incoming not increasing at {j}");
        }
        assert!(out[104] < 0.01);
    }

    #[test]
    fn test_disabled_is_identity() {
        let contributions = step_pair();
        let names = vec!["LK".to_string(), "K".to_string()];
        let config = SmoothingWindowConfig {
            enabled: false,
            ..SmoothingWindowConfig::default()
        };
        let ctx = SmoothingContext {
            names: &names,
            active: &[true, true],
            contributions: &contributions,
            first_clamp: &[None, None],
        };
        let outcome = apply_smoothing_windows(&ctx, &config);
        assert!(outcome.windows.is_empty());
        assert_eq!(outcome.contributions, contributions);
    }

    #[test]
    fn test_per_sample_ceiling_uses_first_clamp() {
        let contributions = step_pair();
        let names = vec!["LK".to_string(), "K".to_string()];
        let config = SmoothingWindowConfig {
            per_sample_ceiling: true,
            ..SmoothingWindowConfig::default()
        };
        let ctx = SmoothingContext {
            names: &names,
            active: &[true, true],
            contributions: &contributions,
            first_clamp: &[Some(98), None],
        };
        let outcome = apply_smoothing_windows(&ctx, &config);
        assert_eq!(outcome.windows[0].handoff_index, 98);
        assert_eq!(outcome.windows[0].start, 94);
    }

    #[test]
    fn test_negative_corrections_are_skipped() {
        let mut contributions = step_pair();
        contributions[1][98] = -0.01;
        let names = vec!["LK".to_string(), "K".to_string()];
        let ctx = SmoothingContext {
            names: &names,
            active: &[true, true],
            contributions: &contributions,
            first_clamp: &[None, None],
        };
        let outcome = apply_smoothing_windows(&ctx, &SmoothingWindowConfig::default());
        assert!(outcome.windows.is_empty());
    }
}

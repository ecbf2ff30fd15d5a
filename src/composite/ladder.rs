//! Channel ladder: total order of active channels from lightest to darkest.

use std::cmp::Ordering;

/// Relative tolerance under which two weights tie.
pub const WEIGHT_TIE_TOLERANCE: f64 = 1e-9;

/// Whether two weights are equal within [`WEIGHT_TIE_TOLERANCE`].
#[must_use]
pub fn weights_tie(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1e-12);
    (a - b).abs() <= WEIGHT_TIE_TOLERANCE * scale
}

/// Ladder over channel indices.
///
/// Ordered by ascending weight; ties are broken by total baseline ink
/// (ascending), then by name, so the order never depends on input order.
#[derive(Debug, Clone, Default)]
pub struct Ladder {
    order: Vec<usize>,
    position: Vec<Option<usize>>,
    weights: Vec<f64>,
}

impl Ladder {
    /// Build a ladder over the channels flagged in `active`.
    #[must_use]
    pub fn build(names: &[String], weights: &[f64], total_ink: &[f64], active: &[bool]) -> Self {
        let mut order: Vec<usize> = (0..names.len()).filter(|&i| active[i]).collect();
        order.sort_by(|&a, &b| {
            let by_weight = if weights_tie(weights[a], weights[b]) {
                Ordering::Equal
            } else {
                weights[a].total_cmp(&weights[b])
            };
            by_weight
                .then_with(|| total_ink[a].total_cmp(&total_ink[b]))
                .then_with(|| names[a].cmp(&names[b]))
        });

        let mut position = vec![None; names.len()];
        for (pos, &idx) in order.iter().enumerate() {
            position[idx] = Some(pos);
        }
        Self {
            order,
            position,
            weights: weights.to_vec(),
        }
    }

    /// Channel indices, lightest first.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Ladder position of a channel (None when inactive).
    #[must_use]
    pub fn position(&self, channel: usize) -> Option<usize> {
        self.position.get(channel).copied().flatten()
    }

    /// Number of laddered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// No active channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// `a` is strictly lighter than `b` (lower weight, not a tie).
    #[must_use]
    pub fn is_lighter(&self, a: usize, b: usize) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(_), Some(_)) => {
                !weights_tie(self.weights[a], self.weights[b]) && self.weights[a] < self.weights[b]
            }
            _ => false,
        }
    }

    /// Laddered channels strictly lighter than `channel`.
    pub fn lighter_than(&self, channel: usize) -> impl Iterator<Item = usize> + '_ {
        self.order.iter().copied().filter(move |&other| self.is_lighter(other, channel))
    }

    /// Laddered channels strictly darker than `channel`.
    pub fn darker_than(&self, channel: usize) -> impl Iterator<Item = usize> + '_ {
        self.order.iter().copied().filter(move |&other| self.is_lighter(channel, other))
    }

    /// Names in ladder order.
    #[must_use]
    pub fn names(&self, names: &[String]) -> Vec<String> {
        self.order.iter().map(|&i| names[i].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_orders_by_weight() {
        let n = names(&["K", "LK", "C"]);
        let ladder = Ladder::build(&n, &[1.0, 0.054, 0.21], &[0.0; 3], &[true; 3]);
        assert_eq!(ladder.names(&n), vec!["LK", "C", "K"]);
        assert_eq!(ladder.position(1), Some(0));
        assert!(ladder.is_lighter(1, 0));
        assert_eq!(ladder.darker_than(2).collect::<Vec<_>>(), vec![0]);
        assert_eq!(ladder.lighter_than(2).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_ties_break_by_total_ink_then_name() {
        let n = names(&["B", "A", "C"]);
        let ladder = Ladder::build(&n, &[1.0, 1.0, 1.0], &[50.0, 50.0, 10.0], &[true; 3]);
        assert_eq!(ladder.names(&n), vec!["C", "A", "B"]);
        assert!(!ladder.is_lighter(2, 0));
        assert_eq!(ladder.darker_than(2).count(), 0);
    }

    #[test]
    fn test_order_is_stable_under_permutation() {
        let a = names(&["K", "LK"]);
        let b = names(&["LK", "K"]);
        let la = Ladder::build(&a, &[1.0, 1.0], &[100.0, 30.0], &[true, true]);
        let lb = Ladder::build(&b, &[1.0, 1.0], &[30.0, 100.0], &[true, true]);
        assert_eq!(la.names(&a), lb.names(&b));
    }

    #[test]
    fn test_inactive_channels_are_excluded() {
        let n = names(&["K", "LK"]);
        let ladder = Ladder::build(&n, &[1.0, 0.0], &[100.0, 0.0], &[true, false]);
        assert_eq!(ladder.len(), 1);
        assert_eq!(ladder.position(1), None);
        assert!(!ladder.is_lighter(1, 0));
    }
}

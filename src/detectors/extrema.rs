//! Local extrema under a symmetric comparison window.

use serde::{Deserialize, Serialize};

use crate::{Period, Timestamp};

/// Which side of the comparator an extremum sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtremumKind {
    Max,
    Min,
}

impl ExtremumKind {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            ExtremumKind::Max => ExtremumKind::Min,
            ExtremumKind::Min => ExtremumKind::Max,
        }
    }
}

/// A local maximum or minimum of a close series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extremum {
    /// Index into the caller's bar slice
    pub index: usize,
    pub timestamp: Timestamp,
    pub value: f64,
    pub kind: ExtremumKind,
}

/// Positions `i` where `values[i]` is >= (Max) or <= (Min) every value in
/// `[i - window, i + window]`, clipped to the slice.
///
/// The comparator is inclusive, so a flat run yields adjacent extrema. Fewer
/// than `2 * window + 1` values yields an empty result.
pub fn find_extrema(values: &[f64], window: Period, kind: ExtremumKind) -> Vec<usize> {
    let w = window.get();
    let n = values.len();
    if n < window.span() {
        return Vec::new();
    }

    (0..n)
        .filter(|&i| {
            let lo = i.saturating_sub(w);
            let hi = i.saturating_add(w).min(n - 1);
            let v = values[i];
            values[lo..=hi].iter().all(|&x| match kind {
                ExtremumKind::Max => v >= x,
                ExtremumKind::Min => v <= x,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const W1: Period = Period::new_const(1);

    #[test]
    fn test_reference_scenario() {
        let values = [10.0, 12.0, 11.0, 12.0, 10.0];
        assert_eq!(find_extrema(&values, W1, ExtremumKind::Max), vec![1, 3]);
        assert_eq!(find_extrema(&values, W1, ExtremumKind::Min), vec![0, 2, 4]);
    }

    #[test]
    fn test_too_short_is_empty() {
        let values = [1.0, 2.0, 1.0, 2.0];
        assert!(find_extrema(&values, Period::new_const(2), ExtremumKind::Max).is_empty());
        assert!(find_extrema(&[], W1, ExtremumKind::Min).is_empty());
    }

    #[test]
    fn test_flat_run_marks_every_bar() {
        let values = [5.0; 4];
        assert_eq!(find_extrema(&values, W1, ExtremumKind::Max), vec![0, 1, 2, 3]);
        assert_eq!(find_extrema(&values, W1, ExtremumKind::Min), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_edges_compare_only_existing_bars() {
        // index 0 only sees index 1 and 2; index 3 ties its left neighbor
        let values = [9.0, 8.0, 7.0, 8.0, 6.0];
        assert_eq!(
            find_extrema(&values, Period::new_const(2), ExtremumKind::Max),
            vec![0, 3]
        );
        let falling = [9.0, 8.0, 7.0, 6.0, 5.0];
        assert_eq!(find_extrema(&falling, Period::new_const(2), ExtremumKind::Max), vec![0]);
        assert_eq!(find_extrema(&falling, Period::new_const(2), ExtremumKind::Min), vec![4]);
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let values = [1.0, 2.0, 3.0];
        assert!(find_extrema(&values, Period::new_const(usize::MAX), ExtremumKind::Max).is_empty());
    }

    #[test]
    fn test_opposite() {
        assert_eq!(ExtremumKind::Max.opposite(), ExtremumKind::Min);
    }
}

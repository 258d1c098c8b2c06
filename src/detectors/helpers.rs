//! Common helper functions shared by the pattern detectors
//!
//! Percentage differences, confidence scoring and the upper/lower trendline
//! pair used by the triangle and wedge detectors.

use super::{
    extrema::{Extremum, ExtremumKind},
    trendline::{fit_trendline, Trendline, MIN_TRENDLINE_POINTS},
};
use crate::{CloseSeries, Period};

// ============================================================
// SCORING
// ============================================================

/// Round to two decimals.
#[inline]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `|a - b| / max(a, b)`; zero when both are zero.
#[inline]
pub fn pct_diff(a: f64, b: f64) -> f64 {
    let denom = a.max(b);
    if denom <= 0.0 {
        return 0.0;
    }
    (a - b).abs() / denom
}

/// `round(1 - diff * scale, 2)` clamped to [0, 1].
#[inline]
pub fn confidence_from_diff(diff: f64, scale: f64) -> f64 {
    round2(1.0 - diff * scale).clamp(0.0, 1.0)
}

/// `max(0, round(1 - min(|upper - lower| * scale, 1), 2))`.
#[inline]
pub fn slope_confidence(upper: f64, lower: f64, scale: f64) -> f64 {
    let spread = ((upper - lower).abs() * scale).min(1.0);
    round2(1.0 - spread).max(0.0)
}

// ============================================================
// TRENDLINE BOUNDS
// ============================================================

/// Upper (through maxima) and lower (through minima) trendlines
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub upper: Trendline,
    pub lower: Trendline,
    /// Earliest extremum used in either fit
    pub first: Extremum,
    /// Latest extremum used in either fit
    pub last: Extremum,
}

impl Bounds {
    #[inline]
    pub fn upper_slope(&self) -> f64 {
        self.upper.slope
    }

    #[inline]
    pub fn lower_slope(&self) -> f64 {
        self.lower.slope
    }
}

/// Fit both trendlines over the last `lookback` points.
///
/// `None` unless there are at least three maxima and three minima.
pub fn fit_bounds(series: &CloseSeries, window: Period, lookback: Period) -> Option<Bounds> {
    let recent = series.tail(lookback.get());
    let highs = recent.extrema(window, ExtremumKind::Max);
    let lows = recent.extrema(window, ExtremumKind::Min);
    if highs.len() < MIN_TRENDLINE_POINTS || lows.len() < MIN_TRENDLINE_POINTS {
        return None;
    }

    let upper = fit_trendline(&values(&highs))?;
    let lower = fit_trendline(&values(&lows))?;

    let first = *[highs.first()?, lows.first()?].into_iter().min_by_key(|e| e.index)?;
    let last = *[highs.last()?, lows.last()?].into_iter().max_by_key(|e| e.index)?;

    Some(Bounds { upper, lower, first, last })
}

fn values(extrema: &[Extremum]) -> Vec<f64> {
    extrema.iter().map(|e| e.value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceBar;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.587), 0.59);
        assert_eq!(round2(1.0), 1.0);
    }

    #[test]
    fn test_pct_diff() {
        assert_eq!(pct_diff(12.0, 12.0), 0.0);
        assert!((pct_diff(10.0, 8.0) - 0.2).abs() < 1e-12);
        assert!((pct_diff(8.0, 10.0) - 0.2).abs() < 1e-12);
        assert_eq!(pct_diff(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_confidence_from_diff() {
        assert_eq!(confidence_from_diff(0.0, 50.0), 1.0);
        assert_eq!(confidence_from_diff(0.01, 50.0), 0.5);
        assert_eq!(confidence_from_diff(0.05, 50.0), 0.0);
    }

    #[test]
    fn test_slope_confidence() {
        assert_eq!(slope_confidence(0.0, 0.0, 10.0), 1.0);
        assert_eq!(slope_confidence(-0.03, 0.03, 10.0), 0.4);
        assert_eq!(slope_confidence(-1.0, 1.0, 10.0), 0.0);
        assert_eq!(slope_confidence(-0.4, -0.2, 0.5), 0.9);
    }

    #[test]
    fn test_fit_bounds_needs_three_of_each() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars: Vec<PriceBar> = [10.0, 12.0, 10.0, 12.0, 10.0]
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::from_close(start + Duration::days(i as i64), c))
            .collect();
        let series = CloseSeries::from_bars(&bars);
        assert!(fit_bounds(&series, Period::new_const(1), Period::new_const(60)).is_none());
    }

    #[test]
    fn test_fit_bounds_spans_extrema() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let closes = [10.0, 14.0, 11.0, 14.0, 12.0, 14.0, 13.0];
        let bars: Vec<PriceBar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::from_close(start + Duration::days(i as i64), c))
            .collect();
        let series = CloseSeries::from_bars(&bars);
        let bounds = fit_bounds(&series, Period::new_const(1), Period::new_const(60)).unwrap();
        assert_eq!(bounds.upper_slope(), 0.0);
        assert!(bounds.lower_slope() > 0.0);
        assert_eq!(bounds.first.index, 0);
        assert_eq!(bounds.last.index, 6);
    }
}

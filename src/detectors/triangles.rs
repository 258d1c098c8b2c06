//! Ascending, Descending and Symmetrical triangles from trendline slopes

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{fit_bounds, slope_confidence};
use crate::{
    params::{get_factor, get_period, get_ratio, ParamMeta, ParameterizedDetector},
    CloseSeries, Pattern, PatternDetector, PatternError, PatternKind, Period, Ratio, Result,
};

impl_with_defaults!(TriangleDetector);

/// Triangle classification over the last `lookback` closes.
///
/// Emits at most one pattern, spanning the earliest and latest extrema used
/// in the fits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangleDetector {
    pub window: Period,
    pub lookback: Period,
    /// A slope below this in magnitude counts as flat
    pub flat_slope: f64,
    /// A slope beyond this counts as rising (or falling)
    pub min_slope: f64,
    pub confidence_scale: f64,
    pub min_confidence: Ratio,
}

impl Default for TriangleDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(5),
            lookback: Period::new_const(60),
            flat_slope: 0.02,
            min_slope: 0.01,
            confidence_scale: 10.0,
            min_confidence: Ratio::new_const(0.4),
        }
    }
}

impl TriangleDetector {
    /// Classify a pair of trendline slopes. Checked in order: ascending,
    /// descending, symmetrical.
    pub fn classify(&self, upper: f64, lower: f64) -> Option<PatternKind> {
        if upper.abs() < self.flat_slope && lower > self.min_slope {
            Some(PatternKind::AscendingTriangle)
        } else if lower.abs() < self.flat_slope && upper < -self.min_slope {
            Some(PatternKind::DescendingTriangle)
        } else if upper < 0.0 && lower > 0.0 {
            Some(PatternKind::SymmetricalTriangle)
        } else {
            None
        }
    }
}

impl PatternDetector for TriangleDetector {
    fn name(&self) -> &'static str {
        "triangles"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[
            PatternKind::AscendingTriangle,
            PatternKind::DescendingTriangle,
            PatternKind::SymmetricalTriangle,
        ]
    }

    fn min_bars(&self) -> usize {
        self.window.span()
    }

    fn detect(&self, series: &CloseSeries) -> Vec<Pattern> {
        let Some(bounds) = fit_bounds(series, self.window, self.lookback) else {
            return Vec::new();
        };
        let (upper, lower) = (bounds.upper_slope(), bounds.lower_slope());
        let Some(kind) = self.classify(upper, lower) else {
            return Vec::new();
        };

        let confidence = slope_confidence(upper, lower, self.confidence_scale);
        if confidence < self.min_confidence.get() {
            return Vec::new();
        }
        vec![Pattern::spanning(kind, &bounds.first, &bounds.last, confidence)]
    }

    fn validate_config(&self) -> Result<()> {
        for (field, value) in [
            ("flat_slope", self.flat_slope),
            ("min_slope", self.min_slope),
            ("confidence_scale", self.confidence_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PatternError::OutOfRange {
                    field,
                    value,
                    min: f64::MIN_POSITIVE,
                    max: f64::MAX,
                });
            }
        }
        Ok(())
    }
}

static TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 5.0, (2.0, 10.0, 1.0), "Extrema comparison window"),
    ParamMeta::period("lookback", 60.0, (30.0, 120.0, 10.0), "Closes considered for the fits"),
    ParamMeta::factor("flat_slope", 0.02, (0.01, 0.05, 0.01), "Flat trendline limit"),
    ParamMeta::factor("min_slope", 0.01, (0.005, 0.03, 0.005), "Rising/falling trendline limit"),
    ParamMeta::factor("confidence_scale", 10.0, (5.0, 20.0, 5.0), "Confidence lost per unit slope spread"),
    ParamMeta::ratio("min_confidence", 0.4, (0.2, 0.6, 0.1), "Acceptance threshold"),
];

impl ParameterizedDetector for TriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            window: get_period(params, "window", 5)?,
            lookback: get_period(params, "lookback", 60)?,
            flat_slope: get_factor(params, "flat_slope", 0.02)?,
            min_slope: get_factor(params, "min_slope", 0.01)?,
            confidence_scale: get_factor(params, "confidence_scale", 10.0)?,
            min_confidence: get_ratio(params, "min_confidence", 0.4)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "triangles"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceBar;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> CloseSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars: Vec<PriceBar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::from_close(start + Duration::days(i as i64), c))
            .collect();
        CloseSeries::from_bars(&bars)
    }

    fn w1() -> TriangleDetector {
        TriangleDetector {
            window: Period::new_const(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify() {
        let d = TriangleDetector::default();
        assert_eq!(d.classify(0.0, 0.05), Some(PatternKind::AscendingTriangle));
        assert_eq!(d.classify(-0.05, 0.0), Some(PatternKind::DescendingTriangle));
        assert_eq!(d.classify(-0.05, 0.05), Some(PatternKind::SymmetricalTriangle));
        assert_eq!(d.classify(0.05, 0.05), None);
        assert_eq!(d.classify(0.0, 0.0), None);
    }

    #[test]
    fn test_ascending_triangle() {
        // flat highs at 14, lows rising by 0.02 per extremum
        let s = series(&[10.0, 14.0, 10.02, 14.0, 10.04, 14.0, 10.06]);
        let patterns = w1().detect(&s);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::AscendingTriangle);
        assert_eq!(patterns[0].confidence, 0.8);
        assert_eq!((patterns[0].start_index, patterns[0].end_index), (0, 6));
    }

    #[test]
    fn test_low_confidence_rejected() {
        // lows rising by 1.0 per extremum: spread * 10 saturates
        let s = series(&[10.0, 14.0, 11.0, 14.0, 12.0, 14.0, 13.0]);
        assert!(w1().detect(&s).is_empty());
    }

    #[test]
    fn test_too_few_extrema() {
        let s = series(&[10.0, 14.0, 10.0, 14.0, 10.0]);
        assert!(w1().detect(&s).is_empty());
    }

    #[test]
    fn test_validate_config() {
        let bad = TriangleDetector {
            min_slope: 0.0,
            ..Default::default()
        };
        assert!(bad.validate_config().is_err());
        assert!(TriangleDetector::default().validate_config().is_ok());
    }
}

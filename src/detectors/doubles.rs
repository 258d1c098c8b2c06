//! Double Top / Double Bottom
//!
//! Two adjacent extrema of the same kind at nearly the same price.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{
    extrema::{Extremum, ExtremumKind},
    helpers::{confidence_from_diff, pct_diff},
};
use crate::{
    params::{get_days, get_factor, get_period, get_ratio, ParamMeta, ParameterizedDetector},
    CloseSeries, Pattern, PatternDetector, PatternError, PatternKind, Period, Ratio, Result,
};

impl_with_defaults!(DoublesDetector);

/// Calendar-day distance allowed between the two extrema (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayGap {
    pub min_days: i64,
    pub max_days: i64,
}

impl Default for DayGap {
    fn default() -> Self {
        Self {
            min_days: 10,
            max_days: 60,
        }
    }
}

impl DayGap {
    #[inline]
    pub fn contains(&self, first: &Extremum, second: &Extremum) -> bool {
        let days = (second.timestamp - first.timestamp).num_days();
        (self.min_days..=self.max_days).contains(&days)
    }
}

/// Double Top (adjacent maxima) and Double Bottom (adjacent minima)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoublesDetector {
    /// Extrema comparison window
    pub window: Period,
    /// Maximum `pct_diff` between the two prices (exclusive)
    pub tolerance: Ratio,
    pub min_confidence: Ratio,
    /// Confidence lost per unit of `pct_diff`
    pub confidence_scale: f64,
    /// Optional calendar-day gate between the extrema
    pub day_gap: Option<DayGap>,
    /// Restrict detection to the last N closes
    pub lookback: Option<Period>,
}

impl Default for DoublesDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(5),
            tolerance: Ratio::new_const(0.02),
            min_confidence: Ratio::new_const(0.2),
            confidence_scale: 50.0,
            day_gap: None,
            lookback: None,
        }
    }
}

impl DoublesDetector {
    fn pairs(&self, extrema: &[Extremum], kind: PatternKind, out: &mut Vec<Pattern>) {
        for pair in extrema.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let diff = pct_diff(a.value, b.value);
            if diff >= self.tolerance.get() {
                continue;
            }
            if let Some(gap) = self.day_gap {
                if !gap.contains(a, b) {
                    continue;
                }
            }
            let confidence = confidence_from_diff(diff, self.confidence_scale);
            if confidence >= self.min_confidence.get() {
                out.push(Pattern::spanning(kind, a, b, confidence));
            }
        }
    }
}

impl PatternDetector for DoublesDetector {
    fn name(&self) -> &'static str {
        "doubles"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::DoubleTop, PatternKind::DoubleBottom]
    }

    fn min_bars(&self) -> usize {
        self.window.span()
    }

    fn detect(&self, series: &CloseSeries) -> Vec<Pattern> {
        let scoped;
        let series = match self.lookback {
            Some(n) => {
                scoped = series.tail(n.get());
                &scoped
            }
            None => series,
        };

        let mut patterns = Vec::new();
        self.pairs(
            &series.extrema(self.window, ExtremumKind::Max),
            PatternKind::DoubleTop,
            &mut patterns,
        );
        self.pairs(
            &series.extrema(self.window, ExtremumKind::Min),
            PatternKind::DoubleBottom,
            &mut patterns,
        );
        patterns
    }

    fn validate_config(&self) -> Result<()> {
        if !self.confidence_scale.is_finite() || self.confidence_scale <= 0.0 {
            return Err(PatternError::InvalidValue(
                "confidence_scale must be finite and > 0",
            ));
        }
        if let Some(gap) = self.day_gap {
            if gap.min_days < 0 || gap.min_days > gap.max_days {
                return Err(PatternError::InvalidValue(
                    "day_gap requires 0 <= min_days <= max_days",
                ));
            }
        }
        Ok(())
    }
}

static DOUBLES_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 5.0, (2.0, 10.0, 1.0), "Extrema comparison window"),
    ParamMeta::ratio("tolerance", 0.02, (0.01, 0.05, 0.01), "Maximum price difference"),
    ParamMeta::ratio("min_confidence", 0.2, (0.2, 0.4, 0.1), "Acceptance threshold"),
    ParamMeta::factor("confidence_scale", 50.0, (20.0, 60.0, 10.0), "Confidence lost per unit difference"),
];

impl ParameterizedDetector for DoublesDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLES_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let day_gap = match (params.get("min_days"), params.get("max_days")) {
            (None, None) => None,
            _ => {
                let defaults = DayGap::default();
                Some(DayGap {
                    min_days: get_days(params, "min_days", defaults.min_days)?,
                    max_days: get_days(params, "max_days", defaults.max_days)?,
                })
            }
        };
        let lookback = match params.get("lookback") {
            Some(_) => Some(get_period(params, "lookback", 60)?),
            None => None,
        };

        let detector = Self {
            window: get_period(params, "window", 5)?,
            tolerance: get_ratio(params, "tolerance", 0.02)?,
            min_confidence: get_ratio(params, "min_confidence", 0.2)?,
            confidence_scale: get_factor(params, "confidence_scale", 50.0)?,
            day_gap,
            lookback,
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "doubles"
    }
}

//! Rising and Falling wedges

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{fit_bounds, slope_confidence};
use crate::{
    params::{get_factor, get_period, get_ratio, ParamMeta, ParameterizedDetector},
    CloseSeries, Pattern, PatternDetector, PatternError, PatternKind, Period, Ratio, Result,
};

impl_with_defaults!(WedgeDetector);

/// Converging trendlines sloping the same way.
///
/// The confidence scale is much gentler than the triangle detector's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WedgeDetector {
    pub window: Period,
    pub lookback: Period,
    pub confidence_scale: f64,
    pub min_confidence: Ratio,
}

impl Default for WedgeDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(5),
            lookback: Period::new_const(60),
            confidence_scale: 0.5,
            min_confidence: Ratio::new_const(0.2),
        }
    }
}

impl WedgeDetector {
    pub fn classify(&self, upper: f64, lower: f64) -> Option<PatternKind> {
        if upper < 0.0 && lower < 0.0 && upper.abs() > lower.abs() {
            Some(PatternKind::FallingWedge)
        } else if upper > 0.0 && lower > 0.0 && lower.abs() > upper.abs() {
            Some(PatternKind::RisingWedge)
        } else {
            None
        }
    }
}

impl PatternDetector for WedgeDetector {
    fn name(&self) -> &'static str {
        "wedges"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::RisingWedge, PatternKind::FallingWedge]
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
        if !self.confidence_scale.is_finite() || self.confidence_scale <= 0.0 {
            return Err(PatternError::InvalidValue(
                "confidence_scale must be finite and > 0",
            ));
        }
        Ok(())
    }
}

static WEDGE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 5.0, (2.0, 10.0, 1.0), "Extrema comparison window"),
    ParamMeta::period("lookback", 60.0, (30.0, 120.0, 10.0), "Closes considered for the fits"),
    ParamMeta::factor("confidence_scale", 0.5, (0.25, 2.0, 0.25), "Confidence lost per unit slope spread"),
    ParamMeta::ratio("min_confidence", 0.2, (0.2, 0.6, 0.1), "Acceptance threshold"),
];

impl ParameterizedDetector for WedgeDetector {
    fn param_meta() -> &'static [ParamMeta] {
        WEDGE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            window: get_period(params, "window", 5)?,
            lookback: get_period(params, "lookback", 60)?,
            confidence_scale: get_factor(params, "confidence_scale", 0.5)?,
            min_confidence: get_ratio(params, "min_confidence", 0.2)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "wedges"
    }
}

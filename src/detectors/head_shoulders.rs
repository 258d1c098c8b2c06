//! Head and Shoulders (regular and inverse)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{
    extrema::{Extremum, ExtremumKind},
    helpers::{confidence_from_diff, pct_diff},
};
use crate::{
    params::{get_factor, get_period, get_ratio, ParamMeta, ParameterizedDetector},
    CloseSeries, Pattern, PatternDetector, PatternError, PatternKind, Period, Ratio, Result,
};

impl_with_defaults!(HeadShouldersDetector);

/// Three consecutive maxima (or minima for the inverse) where the middle one
/// is the most extreme and the shoulders roughly match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadShouldersDetector {
    pub window: Period,
    /// Maximum `pct_diff` between the two shoulders (exclusive)
    pub shoulder_tolerance: Ratio,
    pub min_confidence: Ratio,
    pub confidence_scale: f64,
    /// Require an opposite extremum strictly between the shoulders
    pub require_neckline: bool,
    pub lookback: Option<Period>,
}

impl Default for HeadShouldersDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(5),
            shoulder_tolerance: Ratio::new_const(0.05),
            min_confidence: Ratio::new_const(0.2),
            confidence_scale: 50.0,
            require_neckline: true,
            lookback: None,
        }
    }
}

impl HeadShouldersDetector {
    fn scan(
        &self,
        peaks: &[Extremum],
        troughs: &[Extremum],
        kind: PatternKind,
        out: &mut Vec<Pattern>,
    ) {
        let inverse = kind == PatternKind::InverseHeadAndShoulders;

        for triple in peaks.windows(3) {
            let (left, head, right) = (&triple[0], &triple[1], &triple[2]);

            let head_extreme = if inverse {
                head.value < left.value && head.value < right.value
            } else {
                head.value > left.value && head.value > right.value
            };
            if !head_extreme {
                continue;
            }

            let diff = pct_diff(left.value, right.value);
            if diff >= self.shoulder_tolerance.get() {
                continue;
            }

            if self.require_neckline && neckline(troughs, left, right, inverse).is_none() {
                continue;
            }

            let confidence = confidence_from_diff(diff, self.confidence_scale);
            if confidence >= self.min_confidence.get() {
                let mut pattern = Pattern::spanning(kind, left, right, confidence);
                pattern.midpoint = Some(head.timestamp);
                out.push(pattern);
            }
        }
    }
}

/// Lowest trough (highest peak for the inverse) strictly between the shoulders.
fn neckline(troughs: &[Extremum], left: &Extremum, right: &Extremum, inverse: bool) -> Option<f64> {
    let between = troughs
        .iter()
        .filter(|t| t.index > left.index && t.index < right.index)
        .map(|t| t.value);
    if inverse {
        between.reduce(f64::max)
    } else {
        between.reduce(f64::min)
    }
}

impl PatternDetector for HeadShouldersDetector {
    fn name(&self) -> &'static str {
        "head_shoulders"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::HeadAndShoulders, PatternKind::InverseHeadAndShoulders]
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

        let maxima = series.extrema(self.window, ExtremumKind::Max);
        let minima = series.extrema(self.window, ExtremumKind::Min);

        let mut patterns = Vec::new();
        self.scan(&maxima, &minima, PatternKind::HeadAndShoulders, &mut patterns);
        self.scan(&minima, &maxima, PatternKind::InverseHeadAndShoulders, &mut patterns);
        patterns
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

static HEAD_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 5.0, (2.0, 10.0, 1.0), "Extrema comparison window"),
    ParamMeta::ratio("shoulder_tolerance", 0.05, (0.02, 0.08, 0.01), "Maximum shoulder difference"),
    ParamMeta::ratio("min_confidence", 0.2, (0.2, 0.4, 0.1), "Acceptance threshold"),
    ParamMeta::factor("confidence_scale", 50.0, (20.0, 60.0, 10.0), "Confidence lost per unit difference"),
];

impl ParameterizedDetector for HeadShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let lookback = match params.get("lookback") {
            Some(_) => Some(get_period(params, "lookback", 60)?),
            None => None,
        };
        let detector = Self {
            window: get_period(params, "window", 5)?,
            shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.05)?,
            min_confidence: get_ratio(params, "min_confidence", 0.2)?,
            confidence_scale: get_factor(params, "confidence_scale", 50.0)?,
            require_neckline: params.get("require_neckline").map_or(true, |&v| v != 0.0),
            lookback,
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "head_shoulders"
    }
}

//! Weighted pattern score and the outlook it maps to

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Pattern, PatternError, PatternKind, Ratio, Result, Timestamp};

/// Signed weight per pattern kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternWeights {
    pub double_top: i64,
    pub double_bottom: i64,
    pub head_and_shoulders: i64,
    pub inverse_head_and_shoulders: i64,
    pub ascending_triangle: i64,
    pub descending_triangle: i64,
    pub symmetrical_triangle: i64,
    pub rising_wedge: i64,
    pub falling_wedge: i64,
}

impl Default for PatternWeights {
    fn default() -> Self {
        Self {
            double_top: -20,
            double_bottom: 20,
            head_and_shoulders: -20,
            inverse_head_and_shoulders: 20,
            ascending_triangle: 10,
            descending_triangle: -10,
            symmetrical_triangle: 0,
            rising_wedge: -20,
            falling_wedge: 20,
        }
    }
}

impl PatternWeights {
    pub fn weight(&self, kind: PatternKind) -> i64 {
        match kind {
            PatternKind::DoubleTop => self.double_top,
            PatternKind::DoubleBottom => self.double_bottom,
            PatternKind::HeadAndShoulders => self.head_and_shoulders,
            PatternKind::InverseHeadAndShoulders => self.inverse_head_and_shoulders,
            PatternKind::AscendingTriangle => self.ascending_triangle,
            PatternKind::DescendingTriangle => self.descending_triangle,
            PatternKind::SymmetricalTriangle => self.symmetrical_triangle,
            PatternKind::RisingWedge => self.rising_wedge,
            PatternKind::FallingWedge => self.falling_wedge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outlook {
    StrongBearish,
    Bearish,
    Neutral,
    Bullish,
    StrongBullish,
}

impl Outlook {
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s <= -150 => Outlook::StrongBearish,
            s if s < -50 => Outlook::Bearish,
            -50..=50 => Outlook::Neutral,
            s if s < 150 => Outlook::Bullish,
            _ => Outlook::StrongBullish,
        }
    }
}

impl fmt::Display for Outlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outlook::StrongBearish => "STRONG BEARISH",
            Outlook::Bearish => "BEARISH",
            Outlook::Neutral => "NEUTRAL",
            Outlook::Bullish => "BULLISH",
            Outlook::StrongBullish => "STRONG BULLISH",
        })
    }
}

/// One counted pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Contribution {
    pub start: Timestamp,
    pub end: Timestamp,
    pub kind: PatternKind,
    pub confidence: f64,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub score: i64,
    pub outlook: Outlook,
    pub contributions: Vec<Contribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternScorer {
    pub weights: PatternWeights,
    /// Patterns counted per kind, in input order
    pub max_per_kind: usize,
    pub min_confidence: Ratio,
}

impl Default for PatternScorer {
    fn default() -> Self {
        Self {
            weights: PatternWeights::default(),
            max_per_kind: 5,
            min_confidence: Ratio::new_const(0.2),
        }
    }
}

impl PatternScorer {
    pub fn validate(&self) -> Result<()> {
        if self.max_per_kind == 0 {
            return Err(PatternError::InvalidValue("max_per_kind must be > 0"));
        }
        Ok(())
    }

    /// Sum `round(confidence * weight)` over the counted patterns. Half-way
    /// products round to even.
    pub fn score(&self, patterns: &[Pattern]) -> ScoreReport {
        let mut seen: HashMap<PatternKind, usize> = HashMap::new();
        let mut contributions = Vec::new();

        for p in patterns {
            if p.confidence < self.min_confidence.get() {
                continue;
            }
            let count = seen.entry(p.kind).or_default();
            if *count >= self.max_per_kind {
                continue;
            }
            *count += 1;

            let weight = self.weights.weight(p.kind);
            let points = (p.confidence * weight as f64).round_ties_even() as i64;
            debug!(kind = %p.kind, confidence = p.confidence, weight, points, "pattern contribution");
            contributions.push(Contribution {
                start: p.start,
                end: p.end,
                kind: p.kind,
                confidence: p.confidence,
                points,
            });
        }

        let score = contributions.iter().map(|c| c.points).sum();
        ScoreReport {
            score,
            outlook: Outlook::from_score(score),
            contributions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn pattern(kind: PatternKind, confidence: f64) -> Pattern {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Pattern {
            start: ts,
            end: ts,
            kind,
            confidence,
            midpoint: None,
            start_index: 0,
            end_index: 0,
        }
    }

    #[test]
    fn test_outlook_thresholds() {
        assert_eq!(Outlook::from_score(-150), Outlook::StrongBearish);
        assert_eq!(Outlook::from_score(-51), Outlook::Bearish);
        assert_eq!(Outlook::from_score(-50), Outlook::Neutral);
        assert_eq!(Outlook::from_score(50), Outlook::Neutral);
        assert_eq!(Outlook::from_score(149), Outlook::Bullish);
        assert_eq!(Outlook::from_score(150), Outlook::StrongBullish);
    }

    #[test]
    fn test_score_weights_and_rounding() {
        let report = PatternScorer::default().score(&[
            pattern(PatternKind::DoubleBottom, 0.87),
            pattern(PatternKind::DescendingTriangle, 0.25),
            pattern(PatternKind::SymmetricalTriangle, 1.0),
        ]);
        // 17.4 -> 17, -2.5 -> -2
        assert_eq!(report.score, 15);
        assert_eq!(report.contributions.len(), 3);
        assert_eq!(report.outlook, Outlook::Neutral);
    }

    #[test]
    fn test_caps_per_kind_and_threshold() {
        let mut patterns = vec![pattern(PatternKind::FallingWedge, 1.0); 7];
        patterns.push(pattern(PatternKind::DoubleTop, 0.1));
        let report = PatternScorer::default().score(&patterns);
        assert_eq!(report.contributions.len(), 5);
        assert_eq!(report.score, 100);
        assert_eq!(report.outlook, Outlook::Bullish);
    }

    #[test]
    fn test_outlook_display() {
        assert_eq!(Outlook::StrongBearish.to_string(), "STRONG BEARISH");
    }
}

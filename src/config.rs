//! Pipeline configuration, loadable from TOML
//!
//! Every section is optional; omitted fields take their defaults.
//!
//! ```toml
//! min_confidence = 0.3
//! anchor = "start"
//!
//! [detectors]
//! enabled = ["doubles", "head_shoulders"]
//!
//! [detectors.doubles]
//! tolerance = 0.05
//! day_gap = { min_days = 10, max_days = 60 }
//!
//! [backtest]
//! allow_nearest_price_match = true
//!
//! [backtest.rules.crossover]
//! enabled = false
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    backtest::BacktestConfig, indicators::IndicatorConfig, score::PatternScorer,
    signals::PatternAnchor, BuiltinDetector, DoublesDetector, HeadShouldersDetector,
    PatternError, Ratio, Result, TriangleDetector, WedgeDetector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorName {
    Doubles,
    HeadShoulders,
    Triangles,
    Wedges,
}

impl DetectorName {
    pub const ALL: [DetectorName; 4] = [
        DetectorName::Doubles,
        DetectorName::HeadShoulders,
        DetectorName::Triangles,
        DetectorName::Wedges,
    ];
}

/// Which builtin detectors run, and their parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub enabled: Vec<DetectorName>,
    pub doubles: DoublesDetector,
    pub head_shoulders: HeadShouldersDetector,
    pub triangles: TriangleDetector,
    pub wedges: WedgeDetector,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            enabled: DetectorName::ALL.to_vec(),
            doubles: DoublesDetector::default(),
            head_shoulders: HeadShouldersDetector::default(),
            triangles: TriangleDetector::default(),
            wedges: WedgeDetector::default(),
        }
    }
}

impl DetectorSettings {
    /// Enabled detectors in a fixed order, each at most once.
    pub fn builtin(&self) -> Vec<BuiltinDetector> {
        DetectorName::ALL
            .into_iter()
            .filter(|name| self.enabled.contains(name))
            .map(|name| match name {
                DetectorName::Doubles => BuiltinDetector::Doubles(self.doubles.clone()),
                DetectorName::HeadShoulders => {
                    BuiltinDetector::HeadAndShoulders(self.head_shoulders.clone())
                }
                DetectorName::Triangles => BuiltinDetector::Triangles(self.triangles.clone()),
                DetectorName::Wedges => BuiltinDetector::Wedges(self.wedges.clone()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Engine-wide confidence floor on top of each detector's own threshold
    pub min_confidence: Option<Ratio>,
    pub anchor: PatternAnchor,
    pub detectors: DetectorSettings,
    pub indicators: IndicatorConfig,
    pub backtest: BacktestConfig,
    pub scoring: PatternScorer,
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| PatternError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.detectors.enabled.is_empty() {
            return Err(PatternError::InvalidConfig(
                "at least one detector must be enabled".to_string(),
            ));
        }
        for detector in self.detectors.builtin() {
            detector.validate_config()?;
        }
        self.indicators.validate()?;
        self.backtest.validate()?;
        self.scoring.validate()
    }
}

//! # chartpat - chart pattern detection and backtesting
//!
//! Detects multi-bar chart shapes (double tops/bottoms, head-and-shoulders,
//! triangles, wedges) over closing prices and replays them, together with
//! indicator signals, through a single-position trade simulator.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartpat::prelude::*;
//! use chrono::{TimeZone, Utc};
//!
//! let closes = [10.0, 12.0, 11.0, 12.0, 10.0];
//! let bars: Vec<PriceBar> = closes
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &c)| PriceBar::from_close(Utc.timestamp_opt(i as i64 * 86_400, 0).unwrap(), c))
//!     .collect();
//!
//! let engine = EngineBuilder::new()
//!     .add(BuiltinDetector::Doubles(DoublesDetector {
//!         window: Period::new(1).unwrap(),
//!         ..Default::default()
//!     }))
//!     .build()
//!     .unwrap();
//!
//! let patterns = engine.scan(&bars).unwrap();
//! assert_eq!(patterns[0].kind, PatternKind::DoubleTop);
//! assert_eq!(patterns[0].confidence, 1.0);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod backtest;
pub mod config;
pub mod detectors;
pub mod indicators;
pub mod metrics;
pub mod params;
pub mod pipeline;
pub mod score;
pub mod signals;

pub mod prelude {
    pub use crate::{
        // Backtest
        backtest::{
            AlignmentRule, BacktestConfig, BacktestReport, BacktestState, Backtester,
            CrossoverRule, ExitPolicy, OscillatorRule, PatternRule, Position, RuleClass, RuleSet,
            Trade, TradeAction,
        },
        // Configuration
        config::{DetectorName, DetectorSettings, PipelineConfig},
        // Detectors
        detectors::*,
        // Indicators
        indicators::{FibonacciLevels, IndicatorConfig, Indicators, MaType, SwingDirection},
        // Metrics
        metrics::{summarize, Summary},
        // Parameters
        params::{get_days, get_factor, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Pipeline
        pipeline::{Pipeline, RunError, RunReport},
        // Parallel
        scan_parallel,
        // Scoring
        score::{Outlook, PatternScorer, PatternWeights, ScoreReport},
        // Signals
        signals::{PatternAnchor, PatternSignal, SignalRow, SignalTable},
        // Engine
        BuiltinDetector,
        ClosePoint,
        CloseSeries,
        Direction,
        EngineBuilder,
        OHLCVExt,
        Pattern,
        // Core traits
        PatternDetector,
        PatternEngine,
        // Errors
        PatternError,
        PatternKind,
        Period,
        PriceBar,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        Timestamp,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised for invalid parameters or broken caller contracts.
///
/// Missing data, empty series and too few extrema are not errors: detectors
/// return an empty list and the backtest skips the row.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Timestamps not strictly increasing at row {index}")]
    UnorderedSeries { index: usize },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }

    /// Bars needed for a symmetric window of this size: `2 * period + 1`.
    #[inline]
    pub fn span(self) -> usize {
        self.0.saturating_mul(2).saturating_add(1)
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Bar timestamp (UTC).
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Core OHLCV data trait
pub trait OHLCV {
    fn timestamp(&self) -> Timestamp;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with data-quality helpers for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// Close price if it is finite and strictly positive.
    #[inline]
    fn valid_close(&self) -> Option<f64> {
        let close = self.close();
        (close.is_finite() && close > 0.0).then_some(close)
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Concrete price bar as supplied by the data collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(timestamp: Timestamp, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Flat bar where open = high = low = close and volume is zero.
    pub fn from_close(timestamp: Timestamp, close: f64) -> Self {
        Self::new(timestamp, close, close, close, close, 0.0)
    }
}

impl OHLCV for PriceBar {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Check that timestamps are strictly increasing.
pub fn ensure_strictly_increasing<I>(timestamps: I) -> Result<()>
where
    I: IntoIterator<Item = Timestamp>,
{
    let mut previous: Option<Timestamp> = None;
    for (index, ts) in timestamps.into_iter().enumerate() {
        if let Some(prev) = previous {
            if ts <= prev {
                return Err(PatternError::UnorderedSeries { index });
            }
        }
        previous = Some(ts);
    }
    Ok(())
}

// ============================================================
// CLOSE SERIES - filtered view shared by all detectors
// ============================================================

/// A usable close price and the bar it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClosePoint {
    /// Index into the caller's bar slice
    pub index: usize,
    pub timestamp: Timestamp,
    pub close: f64,
    pub volume: f64,
}

/// Closing prices with non-finite and non-positive values removed.
///
/// Positions in this series differ from bar indices once a close has been
/// dropped; [`ClosePoint::index`] always refers back to the bar slice.
#[derive(Debug, Clone, Default)]
pub struct CloseSeries {
    points: Vec<ClosePoint>,
    values: Vec<f64>,
}

impl CloseSeries {
    pub fn from_bars<T: OHLCV>(bars: &[T]) -> Self {
        let points: Vec<ClosePoint> = bars
            .iter()
            .enumerate()
            .filter_map(|(index, bar)| {
                bar.valid_close().map(|close| ClosePoint {
                    index,
                    timestamp: bar.timestamp(),
                    close,
                    volume: bar.volume(),
                })
            })
            .collect();

        let dropped = bars.len() - points.len();
        if dropped > 0 {
            debug!(dropped, total = bars.len(), "filtered unusable close prices");
        }

        Self::from_valid_points(points)
    }

    fn from_valid_points(points: Vec<ClosePoint>) -> Self {
        let values = points.iter().map(|p| p.close).collect();
        Self { points, values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn points(&self) -> &[ClosePoint] {
        &self.points
    }

    #[inline]
    pub fn point(&self, position: usize) -> Option<&ClosePoint> {
        self.points.get(position)
    }

    /// Keep only the last `n` points.
    pub fn tail(&self, n: usize) -> Self {
        let start = self.points.len().saturating_sub(n);
        Self {
            points: self.points[start..].to_vec(),
            values: self.values[start..].to_vec(),
        }
    }

    /// Local extrema of this series, mapped back to bar indices.
    pub fn extrema(&self, window: Period, kind: ExtremumKind) -> Vec<Extremum> {
        find_extrema(&self.values, window, kind)
            .into_iter()
            .map(|pos| {
                let p = &self.points[pos];
                Extremum {
                    index: p.index,
                    timestamp: p.timestamp,
                    value: p.close,
                    kind,
                }
            })
            .collect()
    }
}

// ============================================================
// PATTERN - result of detection
// ============================================================

/// Chart pattern shapes recognized by the builtin detectors
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum PatternKind {
    #[serde(rename = "Double Top")]
    DoubleTop,
    #[serde(rename = "Double Bottom")]
    DoubleBottom,
    #[serde(rename = "Head and Shoulders")]
    HeadAndShoulders,
    #[serde(rename = "Inverse Head and Shoulders")]
    InverseHeadAndShoulders,
    #[serde(rename = "Ascending Triangle")]
    AscendingTriangle,
    #[serde(rename = "Descending Triangle")]
    DescendingTriangle,
    #[serde(rename = "Symmetrical Triangle")]
    SymmetricalTriangle,
    #[serde(rename = "Rising Wedge")]
    RisingWedge,
    #[serde(rename = "Falling Wedge")]
    FallingWedge,
}

impl PatternKind {
    pub const ALL: [PatternKind; 9] = [
        PatternKind::DoubleTop,
        PatternKind::DoubleBottom,
        PatternKind::HeadAndShoulders,
        PatternKind::InverseHeadAndShoulders,
        PatternKind::AscendingTriangle,
        PatternKind::DescendingTriangle,
        PatternKind::SymmetricalTriangle,
        PatternKind::RisingWedge,
        PatternKind::FallingWedge,
    ];

    /// Display name, identical to the serialized form
    pub fn name(self) -> &'static str {
        match self {
            PatternKind::DoubleTop => "Double Top",
            PatternKind::DoubleBottom => "Double Bottom",
            PatternKind::HeadAndShoulders => "Head and Shoulders",
            PatternKind::InverseHeadAndShoulders => "Inverse Head and Shoulders",
            PatternKind::AscendingTriangle => "Ascending Triangle",
            PatternKind::DescendingTriangle => "Descending Triangle",
            PatternKind::SymmetricalTriangle => "Symmetrical Triangle",
            PatternKind::RisingWedge => "Rising Wedge",
            PatternKind::FallingWedge => "Falling Wedge",
        }
    }

    /// Returns the typical direction this pattern signals.
    pub fn direction(self) -> Direction {
        match self {
            PatternKind::DoubleBottom
            | PatternKind::InverseHeadAndShoulders
            | PatternKind::AscendingTriangle
            | PatternKind::FallingWedge => Direction::Bullish,
            PatternKind::DoubleTop
            | PatternKind::HeadAndShoulders
            | PatternKind::DescendingTriangle
            | PatternKind::RisingWedge => Direction::Bearish,
            PatternKind::SymmetricalTriangle => Direction::Neutral,
        }
    }

    pub fn category(self) -> PatternCategory {
        match self {
            PatternKind::DoubleTop | PatternKind::DoubleBottom => PatternCategory::TwoPoint,
            PatternKind::HeadAndShoulders | PatternKind::InverseHeadAndShoulders => {
                PatternCategory::ThreePoint
            }
            _ => PatternCategory::Trendline,
        }
    }

    #[inline]
    pub fn is_bullish(self) -> bool {
        self.direction().is_bullish()
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        self.direction().is_bearish()
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// A detected pattern occurrence.
///
/// Serializes as a flat record: start, end, kind, confidence, midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub start: Timestamp,
    pub end: Timestamp,
    pub kind: PatternKind,
    /// Heuristic score 0.0..=1.0, never below the detector's threshold
    pub confidence: f64,
    /// Head of a head-and-shoulders pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midpoint: Option<Timestamp>,
    #[serde(skip)]
    pub start_index: usize,
    #[serde(skip)]
    pub end_index: usize,
}

impl Pattern {
    /// Pattern spanning two extrema.
    pub fn spanning(kind: PatternKind, first: &Extremum, last: &Extremum, confidence: f64) -> Self {
        Self {
            start: first.timestamp,
            end: last.timestamp,
            kind,
            confidence,
            midpoint: None,
            start_index: first.index,
            end_index: last.index,
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Shape family of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternCategory {
    /// Two matching extrema (doubles)
    TwoPoint,
    /// Shoulder, head, shoulder
    ThreePoint,
    /// Upper and lower trendlines fitted over a lookback window
    Trendline,
}

/// Additional metadata about a detector
#[derive(Debug, Clone)]
pub struct DetectorMetadata {
    pub name: &'static str,
    pub kinds: &'static [PatternKind],
    pub category: PatternCategory,
}

/// Pattern detector over a filtered close series.
///
/// Detectors are pure: the same series always yields the same patterns and
/// too little data yields an empty list.
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn kinds(&self) -> &'static [PatternKind];
    fn min_bars(&self) -> usize;
    fn detect(&self, series: &CloseSeries) -> Vec<Pattern>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    fn metadata(&self) -> DetectorMetadata {
        let kinds = self.kinds();
        DetectorMetadata {
            name: self.name(),
            kinds,
            category: kinds
                .first()
                .map(|k| k.category())
                .unwrap_or(PatternCategory::TwoPoint),
        }
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect(&self, series: &CloseSeries) -> Vec<Pattern> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, series)),*
                }
            }

            #[inline]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(d) => PatternDetector::name(d)),*
                }
            }

            #[inline]
            pub fn kinds(&self) -> &'static [PatternKind] {
                match self {
                    $(Self::$variant(d) => PatternDetector::kinds(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    Doubles(DoublesDetector),
    HeadAndShoulders(HeadShouldersDetector),
    Triangles(TriangleDetector),
    Wedges(WedgeDetector),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub min_confidence: Option<f64>,
    pub pattern_filter: Option<Vec<PatternKind>>,
    /// Reject bar slices whose timestamps are not strictly increasing
    pub check_order: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_confidence: None,
            pattern_filter: None,
            check_order: true,
        }
    }
}

/// Main pattern detection engine
pub struct PatternEngine {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn PatternDetector>>,
    config: EngineConfig,
}

impl PatternEngine {
    // ===========================================
    // LOW-LEVEL: Primitives
    // ===========================================

    /// Build the filtered close series once; reuse it across scans.
    pub fn close_series<T: OHLCV>(&self, bars: &[T]) -> Result<CloseSeries> {
        if self.config.check_order {
            ensure_strictly_increasing(bars.iter().map(|b| b.timestamp()))?;
        }
        Ok(CloseSeries::from_bars(bars))
    }

    /// Run every detector on a prepared series.
    pub fn scan_series(&self, series: &CloseSeries) -> Vec<Pattern> {
        let mut results = Vec::new();

        // Fast path: builtin detectors (enum dispatch, no vtable)
        for detector in &self.builtin {
            if series.len() >= detector.min_bars() {
                results.extend(
                    detector
                        .detect(series)
                        .into_iter()
                        .filter(|p| self.should_include(p)),
                );
            }
        }

        // Slow path: custom detectors (vtable)
        for detector in &self.custom {
            if series.len() >= detector.min_bars() {
                results.extend(
                    detector
                        .detect(series)
                        .into_iter()
                        .filter(|p| self.should_include(p)),
                );
            }
        }

        results.sort_by_key(|p| (p.start_index, p.end_index));
        results
    }

    // ===========================================
    // HIGH-LEVEL: Batch processing
    // ===========================================

    /// Scan all bars and return a flat list of patterns ordered by start.
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<Pattern>> {
        let series = self.close_series(bars)?;
        Ok(self.scan_series(&series))
    }

    /// Scan and return patterns grouped by kind.
    pub fn scan_grouped<T: OHLCV>(
        &self,
        bars: &[T],
    ) -> Result<BTreeMap<PatternKind, Vec<Pattern>>> {
        let mut grouped: BTreeMap<PatternKind, Vec<Pattern>> = BTreeMap::new();
        for pattern in self.scan(bars)? {
            grouped.entry(pattern.kind).or_default().push(pattern);
        }
        Ok(grouped)
    }

    /// Number of registered detectors.
    pub fn detector_count(&self) -> usize {
        self.builtin.len() + self.custom.len()
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn should_include(&self, p: &Pattern) -> bool {
        if let Some(min) = self.config.min_confidence {
            if p.confidence < min {
                return false;
            }
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&p.kind) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        if let Some(min) = self.config.min_confidence {
            Ratio::new(min)?;
        }
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
pub struct EngineBuilder {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn PatternDetector>>,
    config: EngineConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            builtin: Vec::new(),
            custom: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    /// Add all four builtin detectors with default configurations
    pub fn with_all_defaults(mut self) -> Self {
        self.builtin.extend([
            BuiltinDetector::Doubles(DoublesDetector::with_defaults()),
            BuiltinDetector::HeadAndShoulders(HeadShouldersDetector::with_defaults()),
            BuiltinDetector::Triangles(TriangleDetector::with_defaults()),
            BuiltinDetector::Wedges(WedgeDetector::with_defaults()),
        ]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add several builtin detectors
    pub fn add_all(mut self, detectors: impl IntoIterator<Item = BuiltinDetector>) -> Self {
        self.builtin.extend(detectors);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Add a custom detector (slow path)
    pub fn add_custom<D: PatternDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    /// Drop patterns below this confidence, on top of each detector's own threshold
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.config.min_confidence = Some(confidence);
        self
    }

    /// Filter to specific pattern kinds only
    pub fn only_patterns(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.config.pattern_filter = Some(kinds.into_iter().collect());
        self
    }

    /// Enable/disable the timestamp ordering check
    pub fn check_order(mut self, enable: bool) -> Self {
        self.config.check_order = enable;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        let engine = PatternEngine {
            builtin: self.builtin,
            custom: self.custom,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub patterns: Vec<Pattern>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel scanning of multiple instruments
pub fn scan_parallel<'a, T, I>(
    engine: &PatternEngine,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .scan(bars)
                .map(|patterns| ScanResult {
                    symbol: symbol.to_string(),
                    patterns,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

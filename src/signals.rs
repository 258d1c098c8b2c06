//! Time-indexed signal table fed to the backtester
//!
//! One row per bar, carrying the close (if usable), indicator values and any
//! patterns anchored at that timestamp. Missing values stay `None`.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    ensure_strictly_increasing, indicators::Indicators, OHLCVExt, Pattern, PatternKind, Result,
    Timestamp, OHLCV,
};

/// Which end of a pattern's span carries its signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternAnchor {
    #[default]
    Start,
    End,
}

impl PatternAnchor {
    #[inline]
    pub fn timestamp(self, pattern: &Pattern) -> Timestamp {
        match self {
            PatternAnchor::Start => pattern.start,
            PatternAnchor::End => pattern.end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternSignal {
    pub kind: PatternKind,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRow {
    pub timestamp: Timestamp,
    pub close: Option<f64>,
    #[serde(flatten)]
    pub indicators: Indicators,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<PatternSignal>,
}

impl SignalRow {
    pub fn new(timestamp: Timestamp, close: Option<f64>) -> Self {
        Self {
            timestamp,
            close,
            indicators: Indicators::default(),
            patterns: Vec::new(),
        }
    }

    /// Close if finite and strictly positive.
    #[inline]
    pub fn valid_close(&self) -> Option<f64> {
        self.close.filter(|c| c.is_finite() && *c > 0.0)
    }
}

/// Rows ordered by strictly increasing timestamp
#[derive(Debug, Clone, Default)]
pub struct SignalTable {
    rows: Vec<SignalRow>,
}

impl SignalTable {
    /// One row per bar; unusable closes become `None`.
    pub fn from_bars<T: OHLCV>(bars: &[T]) -> Result<Self> {
        ensure_strictly_increasing(bars.iter().map(|b| b.timestamp()))?;
        Ok(Self {
            rows: bars
                .iter()
                .map(|b| SignalRow::new(b.timestamp(), b.valid_close()))
                .collect(),
        })
    }

    /// Wrap prepared rows after checking their order.
    pub fn from_rows(rows: Vec<SignalRow>) -> Result<Self> {
        ensure_strictly_increasing(rows.iter().map(|r| r.timestamp))?;
        Ok(Self { rows })
    }

    /// Attach indicator values to the rows with matching timestamps.
    pub fn merge_indicators<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (Timestamp, Indicators)>,
    {
        for (timestamp, indicators) in values {
            match self.position(timestamp) {
                Ok(i) => self.rows[i].indicators = indicators,
                Err(_) => trace!(%timestamp, "indicator timestamp not in table"),
            }
        }
    }

    /// Attach each pattern at its anchor timestamp. A timestamp not present
    /// in the table gets a new row with no close.
    pub fn merge_patterns(&mut self, patterns: &[Pattern], anchor: PatternAnchor) {
        for pattern in patterns {
            let timestamp = anchor.timestamp(pattern);
            let signal = PatternSignal {
                kind: pattern.kind,
                confidence: pattern.confidence,
            };
            match self.position(timestamp) {
                Ok(i) => self.rows[i].patterns.push(signal),
                Err(i) => {
                    let mut row = SignalRow::new(timestamp, None);
                    row.patterns.push(signal);
                    self.rows.insert(i, row);
                }
            }
        }
    }

    #[inline]
    pub fn rows(&self) -> &[SignalRow] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// See [`nearest_close`].
    pub fn nearest_close(&self, index: usize) -> Option<f64> {
        nearest_close(&self.rows, index)
    }

    fn position(&self, timestamp: Timestamp) -> std::result::Result<usize, usize> {
        self.rows.binary_search_by_key(&timestamp, |r| r.timestamp)
    }
}

/// Close of the row closest in time to `rows[index]` that has a usable close.
/// Ties go to the earlier row.
pub fn nearest_close(rows: &[SignalRow], index: usize) -> Option<f64> {
    let target = rows.get(index)?.timestamp;
    rows.iter()
        .filter_map(|r| r.valid_close().map(|c| ((r.timestamp - target).abs(), c)))
        // min_by_key keeps the first of equal keys, i.e. the earlier row
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, close)| close)
}

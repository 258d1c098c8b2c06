//! Single-position backtest simulator
//!
//! Walks a signal table in time order. Flat positions open on the first entry
//! rule that fires; long positions close on the first exit rule that fires.
//! A position still open after the last row is sold at the last available
//! close.

mod rules;

pub use rules::{
    AlignmentRule, CrossoverRule, OscillatorRule, PatternRule, RowContext, RuleClass, RuleSet,
    Signal,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::{
    ensure_strictly_increasing,
    metrics::{summarize, Summary},
    signals::{nearest_close, SignalRow},
    PatternError, Ratio, Result, Timestamp,
};

// ============================================================
// TRADES AND STATE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    /// Forced liquidation after the last row
    #[serde(rename = "SELL_END")]
    SellAtEnd,
}

impl TradeAction {
    #[inline]
    pub fn is_sell(self) -> bool {
        matches!(self, TradeAction::Sell | TradeAction::SellAtEnd)
    }
}

/// One entry in the trade log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub action: TradeAction,
    pub timestamp: Timestamp,
    pub price: f64,
    pub size: u64,
    pub cash_after: f64,
    /// Realized profit, sells only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Flat,
    Long {
        size: u64,
        entry_price: f64,
        opened_by: RuleClass,
    },
}

/// Cash, position and trade log of one run
#[derive(Debug, Clone)]
pub struct BacktestState {
    pub cash: f64,
    pub position: Position,
    pub trades: Vec<Trade>,
}

impl BacktestState {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            position: Position::Flat,
            trades: Vec::new(),
        }
    }

    #[inline]
    pub fn is_long(&self) -> bool {
        matches!(self.position, Position::Long { .. })
    }

    /// Buy `floor(cash * risk / price)` units. No-op when that is zero.
    fn open(&mut self, timestamp: Timestamp, price: f64, risk: Ratio, signal: Signal) {
        let size = (self.cash * risk.get() / price).floor();
        if size < 1.0 {
            trace!(%timestamp, price, cash = self.cash, "entry signal too small to size");
            return;
        }
        let size = size as u64;
        self.cash -= size as f64 * price;
        self.position = Position::Long {
            size,
            entry_price: price,
            opened_by: signal.class,
        };
        debug!(%timestamp, price, size, reason = %signal.reason, "opened position");
        self.trades.push(Trade {
            action: TradeAction::Buy,
            timestamp,
            price,
            size,
            cash_after: self.cash,
            pnl: None,
            reason: signal.reason,
            confidence: signal.confidence,
        });
    }

    fn close(
        &mut self,
        action: TradeAction,
        timestamp: Timestamp,
        price: f64,
        reason: String,
        confidence: Option<f64>,
    ) {
        let Position::Long {
            size, entry_price, ..
        } = self.position
        else {
            return;
        };
        self.cash += size as f64 * price;
        let pnl = (price - entry_price) * size as f64;
        self.position = Position::Flat;
        debug!(%timestamp, price, size, pnl, reason = %reason, "closed position");
        self.trades.push(Trade {
            action,
            timestamp,
            price,
            size,
            cash_after: self.cash,
            pnl: Some(pnl),
            reason,
            confidence,
        });
    }
}

// ============================================================
// CONFIGURATION
// ============================================================

/// Which rules may close an open position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Every enabled rule's exit, in precedence order
    #[default]
    AnyEnabled,
    /// Only the rule class that opened the position
    EntryRuleOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    /// Share of cash committed per entry
    pub risk_fraction: Ratio,
    /// Price a row without a close at the closest-in-time close
    pub allow_nearest_price_match: bool,
    pub exit_policy: ExitPolicy,
    pub rules: RuleSet,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: 10_000.0,
            risk_fraction: Ratio::new_const(0.2),
            allow_nearest_price_match: false,
            exit_policy: ExitPolicy::AnyEnabled,
            rules: RuleSet::default(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.initial_cash.is_finite() || self.initial_cash < 0.0 {
            return Err(PatternError::OutOfRange {
                field: "initial_cash",
                value: self.initial_cash,
                min: 0.0,
                max: f64::MAX,
            });
        }
        if self.risk_fraction.get() <= 0.0 {
            return Err(PatternError::OutOfRange {
                field: "risk_fraction",
                value: self.risk_fraction.get(),
                min: f64::MIN_POSITIVE,
                max: 1.0,
            });
        }
        self.rules.validate()
    }
}

// ============================================================
// SIMULATOR
// ============================================================

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub trades: Vec<Trade>,
    pub summary: Summary,
}

#[derive(Debug, Clone)]
pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Replay `rows` and return the trade log with its summary.
    ///
    /// Rows must have strictly increasing timestamps. Rows with no price, or
    /// where no enabled rule has the data it reads, are skipped.
    pub fn run(&self, rows: &[SignalRow]) -> Result<BacktestReport> {
        ensure_strictly_increasing(rows.iter().map(|r| r.timestamp))?;

        let rules = self.config.rules.enabled();
        let mut state = BacktestState::new(self.config.initial_cash);
        let mut skipped = 0usize;

        // rows without a close of their own carry no indicators
        let mut last_priced: Option<&SignalRow> = None;

        for (i, row) in rows.iter().enumerate() {
            let prev = last_priced;
            if row.valid_close().is_some() {
                last_priced = Some(row);
            }

            let Some(price) = self.price_at(rows, i) else {
                trace!(timestamp = %row.timestamp, "no price, row skipped");
                skipped += 1;
                continue;
            };
            let ctx = RowContext { row, prev, price };

            let long = state.is_long();
            if !rules.iter().any(|r| r.evaluable(&ctx, long)) {
                trace!(timestamp = %row.timestamp, "no evaluable rule, row skipped");
                skipped += 1;
                continue;
            }

            match state.position {
                Position::Flat => {
                    if let Some(signal) = rules.iter().find_map(|r| r.entry(&ctx)) {
                        state.open(row.timestamp, price, self.config.risk_fraction, signal);
                    }
                }
                Position::Long {
                    entry_price,
                    opened_by,
                    ..
                } => {
                    let exit = rules
                        .iter()
                        .filter(|r| match self.config.exit_policy {
                            ExitPolicy::AnyEnabled => true,
                            ExitPolicy::EntryRuleOnly => r.class() == opened_by,
                        })
                        .find_map(|r| r.exit(&ctx, entry_price));
                    if let Some(signal) = exit {
                        state.close(
                            TradeAction::Sell,
                            row.timestamp,
                            price,
                            signal.reason,
                            signal.confidence,
                        );
                    }
                }
            }
        }

        if let Position::Long { entry_price, .. } = state.position {
            let (timestamp, price) = last_close(rows).unwrap_or_else(|| {
                let opened = state.trades.last().map_or(rows[rows.len() - 1].timestamp, |t| t.timestamp);
                (opened, entry_price)
            });
            state.close(TradeAction::SellAtEnd, timestamp, price, "end_of_data".to_string(), None);
        }

        let summary = summarize(&state.trades, self.config.initial_cash);
        info!(
            rows = rows.len(),
            skipped,
            final_cash = summary.final_cash,
            net_pnl = summary.net_pnl,
            trades = summary.trade_count,
            "backtest complete"
        );

        Ok(BacktestReport {
            trades: state.trades,
            summary,
        })
    }

    fn price_at(&self, rows: &[SignalRow], index: usize) -> Option<f64> {
        rows[index].valid_close().or_else(|| {
            if self.config.allow_nearest_price_match {
                nearest_close(rows, index)
            } else {
                None
            }
        })
    }
}

/// Timestamp and close of the last row with a usable close.
fn last_close(rows: &[SignalRow]) -> Option<(Timestamp, f64)> {
    rows.iter()
        .rev()
        .find_map(|r| r.valid_close().map(|c| (r.timestamp, c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{indicators::Indicators, signals::PatternSignal, PatternKind};
    use chrono::{Duration, TimeZone, Utc};

    fn day(i: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i)
    }

    fn pattern_row(i: i64, close: Option<f64>, kind: Option<PatternKind>) -> SignalRow {
        let mut row = SignalRow::new(day(i), close);
        if let Some(kind) = kind {
            row.patterns.push(PatternSignal { kind, confidence: 0.9 });
        }
        row
    }

    fn patterns_only() -> Backtester {
        Backtester::new(BacktestConfig {
            rules: RuleSet::patterns_only(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(BacktestConfig::default().validate().is_ok());
        let bad = BacktestConfig {
            initial_cash: f64::NAN,
            ..Default::default()
        };
        assert!(Backtester::new(bad).is_err());
        let bad = BacktestConfig {
            risk_fraction: Ratio::new_const(0.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_empty_table() {
        let report = patterns_only().run(&[]).unwrap();
        assert!(report.trades.is_empty());
        assert_eq!(report.summary.final_cash, 10_000.0);
        assert_eq!(report.summary.trade_count, 0);
    }

    #[test]
    fn test_round_trip() {
        let rows = vec![
            pattern_row(0, Some(100.0), Some(PatternKind::DoubleBottom)),
            pattern_row(1, Some(110.0), None),
            pattern_row(2, Some(120.0), Some(PatternKind::DoubleTop)),
        ];
        let report = patterns_only().run(&rows).unwrap();
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.trades[0].size, 20);
        assert_eq!(report.trades[0].cash_after, 8_000.0);
        assert_eq!(report.trades[0].reason, "Double Bottom");
        assert_eq!(report.trades[0].confidence, Some(0.9));
        assert_eq!(report.trades[1].action, TradeAction::Sell);
        assert_eq!(report.trades[1].pnl, Some(400.0));
        assert_eq!(report.summary.final_cash, 10_400.0);
    }

    #[test]
    fn test_forced_liquidation_at_last_close() {
        let rows = vec![
            pattern_row(0, Some(100.0), Some(PatternKind::DoubleBottom)),
            pattern_row(1, Some(105.0), None),
            pattern_row(2, None, None),
        ];
        let report = patterns_only().run(&rows).unwrap();
        let last = report.trades.last().unwrap();
        assert_eq!(last.action, TradeAction::SellAtEnd);
        assert_eq!(last.price, 105.0);
        assert_eq!(last.timestamp, day(1));
        assert_eq!(last.pnl, Some(100.0));
    }

    #[test]
    fn test_too_small_to_size() {
        let bt = Backtester::new(BacktestConfig {
            initial_cash: 100.0,
            rules: RuleSet::patterns_only(),
            ..Default::default()
        })
        .unwrap();
        let rows = vec![pattern_row(0, Some(500.0), Some(PatternKind::DoubleBottom))];
        assert!(bt.run(&rows).unwrap().trades.is_empty());
    }

    #[test]
    fn test_exit_policy_entry_rule_only() {
        let mut rows = vec![
            pattern_row(0, Some(100.0), Some(PatternKind::DoubleBottom)),
            pattern_row(1, Some(101.0), None),
            pattern_row(2, Some(102.0), None),
        ];
        rows[1].indicators = Indicators {
            rsi: Some(90.0),
            macd: Some(1.0),
            ..Default::default()
        };

        let mut config = BacktestConfig::default();
        let any = Backtester::new(config.clone()).unwrap().run(&rows).unwrap();
        assert_eq!(any.trades[1].reason, "rsi_overbought");
        assert_eq!(any.trades[1].action, TradeAction::Sell);

        config.exit_policy = ExitPolicy::EntryRuleOnly;
        let only = Backtester::new(config).unwrap().run(&rows).unwrap();
        assert_eq!(only.trades[1].action, TradeAction::SellAtEnd);
    }

    #[test]
    fn test_unordered_rows_rejected() {
        let rows = vec![pattern_row(1, Some(1.0), None), pattern_row(0, Some(1.0), None)];
        assert!(matches!(
            patterns_only().run(&rows),
            Err(PatternError::UnorderedSeries { index: 1 })
        ));
    }

    #[test]
    fn test_trade_action_serialization() {
        assert_eq!(serde_json::to_string(&TradeAction::SellAtEnd).unwrap(), "\"SELL_END\"");
        assert_eq!(serde_json::to_string(&TradeAction::Buy).unwrap(), "\"BUY\"");
    }
}

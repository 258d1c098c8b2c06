//! Trade log summary

use serde::{Deserialize, Serialize};

use crate::backtest::{Trade, TradeAction};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// `cash_after` of the last trade, or the initial cash
    pub final_cash: f64,
    /// Sum of realized P&L
    pub net_pnl: f64,
    /// Completed round trips: `trades.len() / 2`
    pub trade_count: usize,
    pub buys: usize,
    /// Sells, forced liquidation included
    pub sells: usize,
}

pub fn summarize(trades: &[Trade], initial_cash: f64) -> Summary {
    Summary {
        final_cash: trades.last().map_or(initial_cash, |t| t.cash_after),
        net_pnl: trades.iter().filter_map(|t| t.pnl).sum(),
        trade_count: trades.len() / 2,
        buys: trades.iter().filter(|t| t.action == TradeAction::Buy).count(),
        sells: trades.iter().filter(|t| t.action.is_sell()).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn trade(action: TradeAction, cash_after: f64, pnl: Option<f64>) -> Trade {
        Trade {
            action,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            price: 1.0,
            size: 1,
            cash_after,
            pnl,
            reason: "test".to_string(),
            confidence: None,
        }
    }

    #[test]
    fn test_empty() {
        let s = summarize(&[], 10_000.0);
        assert_eq!(s.final_cash, 10_000.0);
        assert_eq!(s.net_pnl, 0.0);
        assert_eq!(s.trade_count, 0);
    }

    #[test]
    fn test_counts_and_pnl() {
        let trades = [
            trade(TradeAction::Buy, 9_000.0, None),
            trade(TradeAction::Sell, 10_200.0, Some(200.0)),
            trade(TradeAction::Buy, 9_000.0, None),
            trade(TradeAction::SellAtEnd, 9_900.0, Some(-300.0)),
        ];
        let s = summarize(&trades, 10_000.0);
        assert_eq!(s.final_cash, 9_900.0);
        assert_eq!(s.net_pnl, -100.0);
        assert_eq!(s.trade_count, 2);
        assert_eq!((s.buys, s.sells), (2, 2));
    }

    #[test]
    fn test_odd_length_rounds_down() {
        let trades = [trade(TradeAction::Buy, 9_000.0, None)];
        assert_eq!(summarize(&trades, 10_000.0).trade_count, 0);
    }
}

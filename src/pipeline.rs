//! Per-instrument run: scan, score, build the signal table, backtest
//!
//! Instruments are independent. [`Pipeline::run_batch`] fans them out on the
//! rayon pool; each run owns its series, table and backtest state.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    backtest::{Backtester, Trade},
    config::PipelineConfig,
    indicators::{self, FibonacciLevels},
    metrics::Summary,
    score::ScoreReport,
    signals::SignalTable,
    EngineBuilder, Pattern, PatternEngine, PatternError, Result, OHLCV,
};

/// Everything produced for one instrument
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub symbol: String,
    pub patterns: Vec<Pattern>,
    pub score: ScoreReport,
    /// Levels of the latest swing, when the series covers the lookback
    pub fibonacci: Option<FibonacciLevels>,
    pub trades: Vec<Trade>,
    pub summary: Summary,
}

/// A failed instrument in a batch
#[derive(Debug)]
pub struct RunError {
    pub symbol: String,
    pub error: PatternError,
}

pub struct Pipeline {
    config: PipelineConfig,
    engine: PatternEngine,
    backtester: Backtester,
}

impl Pipeline {
    /// Validate the config and build the engine and backtester once.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = EngineBuilder::new().add_all(config.detectors.builtin());
        if let Some(min) = config.min_confidence {
            builder = builder.min_confidence(min.get());
        }
        let engine = builder.build()?;
        let backtester = Backtester::new(config.backtest.clone())?;

        Ok(Self {
            config,
            engine,
            backtester,
        })
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn engine(&self) -> &PatternEngine {
        &self.engine
    }

    pub fn run<T: OHLCV>(&self, symbol: &str, bars: &[T]) -> Result<RunReport> {
        let series = self.engine.close_series(bars)?;
        let patterns = self.engine.scan_series(&series);
        let score = self.config.scoring.score(&patterns);
        debug!(symbol, patterns = patterns.len(), score = score.score, "scan complete");

        let mut table = SignalTable::from_bars(bars)?;
        table.merge_indicators(indicators::compute(&series, &self.config.indicators));
        table.merge_patterns(&patterns, self.config.anchor);

        let report = self.backtester.run(table.rows())?;
        let fibonacci = indicators::fibonacci(series.values(), self.config.indicators.fib_lookback);

        Ok(RunReport {
            symbol: symbol.to_string(),
            patterns,
            score,
            fibonacci,
            trades: report.trades,
            summary: report.summary,
        })
    }

    /// Run every instrument in parallel, splitting successes from failures.
    pub fn run_batch<'a, T, I>(&self, instruments: I) -> (Vec<RunReport>, Vec<RunError>)
    where
        T: OHLCV + Sync + 'a,
        I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    {
        let results: Vec<_> = instruments
            .into_par_iter()
            .map(|(symbol, bars)| {
                self.run(symbol, bars).map_err(|error| {
                    warn!(symbol, %error, "instrument failed");
                    RunError {
                        symbol: symbol.to_string(),
                        error,
                    }
                })
            })
            .collect();

        let mut reports = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(r) => reports.push(r),
                Err(e) => errors.push(e),
            }
        }
        (reports, errors)
    }
}

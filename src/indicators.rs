//! Indicator series computed over a close series
//!
//! Values line up with [`CloseSeries::points`]; a value that is not yet
//! defined (warm-up) is `None`, never zero.
//!
//! - **SMA**: rolling mean, `None` for the first `period - 1` points.
//! - **EMA**: `None` for the first `period - 1` points, then seeded with the
//!   SMA of those points, `alpha = 2 / (span + 1)`.
//! - **RSI**: rolling-mean gains over rolling-mean losses.
//! - **MACD**: difference of two EMAs seeded at the first value, plus a
//!   signal line of the same kind.
//! - **OBV**: running sum of volume signed by the close-to-close direction.
//! - **Bollinger**: rolling mean plus or minus `k` sample standard deviations.
//! - **Fibonacci**: retracement and extension levels of the last swing,
//!   computed once per series.

use serde::{Deserialize, Serialize};

use crate::{CloseSeries, PatternError, Period, Ratio, Result, Timestamp};

// ============================================================
// CONFIGURATION
// ============================================================

/// Moving average flavor used for the crossover and alignment lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaType {
    #[default]
    Ema,
    Sma,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: Period,
    pub macd_fast: Period,
    pub macd_slow: Period,
    pub macd_signal: Period,
    pub ma_type: MaType,
    /// Double moving average
    pub fast: Period,
    pub slow: Period,
    /// Triple moving average
    pub short: Period,
    pub medium: Period,
    pub long: Period,
    pub bollinger_window: Period,
    /// Band width in standard deviations
    pub bollinger_std_dev: f64,
    /// Closes considered when locating the Fibonacci swing
    pub fib_lookback: Period,
    /// Relative distance within which a close counts as touching a level
    pub fib_tolerance: Ratio,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: Period::new_const(7),
            macd_fast: Period::new_const(12),
            macd_slow: Period::new_const(26),
            macd_signal: Period::new_const(9),
            ma_type: MaType::Ema,
            fast: Period::new_const(20),
            slow: Period::new_const(50),
            short: Period::new_const(9),
            medium: Period::new_const(21),
            long: Period::new_const(50),
            bollinger_window: Period::new_const(20),
            bollinger_std_dev: 2.0,
            fib_lookback: Period::new_const(100),
            fib_tolerance: Ratio::new_const(0.01),
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.macd_fast >= self.macd_slow {
            return Err(PatternError::InvalidConfig(format!(
                "macd_fast ({}) must be below macd_slow ({})",
                self.macd_fast.get(),
                self.macd_slow.get()
            )));
        }
        if self.fast >= self.slow {
            return Err(PatternError::InvalidConfig(format!(
                "fast ({}) must be below slow ({})",
                self.fast.get(),
                self.slow.get()
            )));
        }
        if !(self.short < self.medium && self.medium < self.long) {
            return Err(PatternError::InvalidConfig(format!(
                "expected short < medium < long, got {} / {} / {}",
                self.short.get(),
                self.medium.get(),
                self.long.get()
            )));
        }
        if self.bollinger_window.get() < 2 {
            return Err(PatternError::OutOfRange {
                field: "bollinger_window",
                value: self.bollinger_window.get() as f64,
                min: 2.0,
                max: f64::MAX,
            });
        }
        if !self.bollinger_std_dev.is_finite() || self.bollinger_std_dev <= 0.0 {
            return Err(PatternError::OutOfRange {
                field: "bollinger_std_dev",
                value: self.bollinger_std_dev,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        Ok(())
    }
}

// ============================================================
// PER-ROW VALUES
// ============================================================

/// Indicator values at one timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_signal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ma_fast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ma_slow: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ma_short: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ma_medium: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ma_long: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_upper: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb_lower: Option<f64>,
    /// Fibonacci ratio of the level the close is touching
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fib_level: Option<f64>,
}

impl Indicators {
    #[inline]
    pub fn fast_slow(&self) -> Option<(f64, f64)> {
        Some((self.ma_fast?, self.ma_slow?))
    }

    #[inline]
    pub fn triple(&self) -> Option<(f64, f64, f64)> {
        Some((self.ma_short?, self.ma_medium?, self.ma_long?))
    }
}

// ============================================================
// SERIES FUNCTIONS
// ============================================================

/// Rolling mean over `period` values.
pub fn sma(values: &[f64], period: Period) -> Vec<Option<f64>> {
    let p = period.get();
    let mut out = vec![None; values.len()];
    if values.len() < p {
        return out;
    }
    for (i, window) in values.windows(p).enumerate() {
        out[i + p - 1] = Some(window.iter().sum::<f64>() / p as f64);
    }
    out
}

/// Exponential moving average with `alpha = 2 / (span + 1)`.
///
/// The first `span - 1` points are `None`; the average is seeded with the SMA
/// of the first `span` values.
pub fn ema(values: &[f64], span: Period) -> Vec<Option<f64>> {
    let p = span.get();
    let mut out = vec![None; values.len()];
    if values.len() < p {
        return out;
    }

    let alpha = 2.0 / (p as f64 + 1.0);
    let mut prev = values[..p].iter().sum::<f64>() / p as f64;
    out[p - 1] = Some(prev);
    for (i, &v) in values.iter().enumerate().skip(p) {
        prev = alpha * v + (1.0 - alpha) * prev;
        out[i] = Some(prev);
    }
    out
}

/// Exponentially weighted mean seeded at the first value, defined everywhere.
fn ewm(values: &[f64], span: Period) -> Vec<f64> {
    let alpha = 2.0 / (span.get() as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            Some(p) => alpha * v + (1.0 - alpha) * p,
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Relative strength index from rolling means of gains and losses.
///
/// `None` until `period` price changes exist. A window with no losses is 100
/// when it has gains and `None` when flat.
pub fn rsi(values: &[f64], period: Period) -> Vec<Option<f64>> {
    let p = period.get();
    let mut out = vec![None; values.len()];
    if values.len() <= p {
        return out;
    }

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    for (i, window) in deltas.windows(p).enumerate() {
        let gain = window.iter().map(|d| d.max(0.0)).sum::<f64>() / p as f64;
        let loss = window.iter().map(|d| (-d).max(0.0)).sum::<f64>() / p as f64;
        // deltas[i] is the change into values[i + 1]
        out[i + p] = if loss == 0.0 {
            (gain > 0.0).then_some(100.0)
        } else {
            Some(100.0 - 100.0 / (1.0 + gain / loss))
        };
    }
    out
}

/// MACD line and its signal line.
pub fn macd(values: &[f64], fast: Period, slow: Period, signal: Period) -> (Vec<f64>, Vec<f64>) {
    let line: Vec<f64> = ewm(values, fast)
        .into_iter()
        .zip(ewm(values, slow))
        .map(|(f, s)| f - s)
        .collect();
    let signal = ewm(&line, signal);
    (line, signal)
}

/// Moving average of the configured flavor.
pub fn moving_average(values: &[f64], period: Period, ma_type: MaType) -> Vec<Option<f64>> {
    match ma_type {
        MaType::Ema => ema(values, period),
        MaType::Sma => sma(values, period),
    }
}

/// On-balance volume. The first point is 0; a bar with a non-finite volume
/// leaves the total unchanged.
pub fn obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    let mut out = Vec::with_capacity(closes.len());
    for (i, (&close, &volume)) in closes.iter().zip(volumes).enumerate() {
        if i > 0 && volume.is_finite() {
            let prev = closes[i - 1];
            if close > prev {
                total += volume;
            } else if close < prev {
                total -= volume;
            }
        }
        out.push(total);
    }
    out
}

/// Bollinger band at one point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BollingerBand {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Rolling mean plus or minus `k` sample standard deviations.
pub fn bollinger(values: &[f64], window: Period, k: f64) -> Vec<Option<BollingerBand>> {
    let p = window.get();
    let mut out = vec![None; values.len()];
    if p < 2 || values.len() < p {
        return out;
    }
    for (i, w) in values.windows(p).enumerate() {
        let mean = w.iter().sum::<f64>() / p as f64;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (p - 1) as f64;
        let width = k * var.sqrt();
        out[i + p - 1] = Some(BollingerBand {
            middle: mean,
            upper: mean + width,
            lower: mean - width,
        });
    }
    out
}

pub const FIB_RETRACEMENTS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];
pub const FIB_EXTENSIONS: [f64; 3] = [1.272, 1.618, 2.618];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingDirection {
    Uptrend,
    Downtrend,
}

/// Retracement and extension prices of one swing.
///
/// In a downtrend the swing runs from the high to the low, so levels are
/// measured downward from the low.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FibonacciLevels {
    pub direction: SwingDirection,
    pub swing_low: f64,
    pub swing_high: f64,
    /// `(ratio, price)` pairs
    pub retracements: Vec<(f64, f64)>,
    pub extensions: Vec<(f64, f64)>,
}

impl FibonacciLevels {
    /// Ratio of the level `price` is within `tolerance` of. Extensions take
    /// precedence over retracements.
    pub fn touching(&self, price: f64, tolerance: f64) -> Option<f64> {
        let near = |levels: &[(f64, f64)]| {
            levels
                .iter()
                .find(|&&(_, level)| level > 0.0 && (price - level).abs() / level < tolerance)
                .map(|&(ratio, _)| ratio)
        };
        near(&self.extensions).or_else(|| near(&self.retracements))
    }
}

/// Levels of the swing across the last `lookback` values. `None` when fewer
/// values exist.
pub fn fibonacci(values: &[f64], lookback: Period) -> Option<FibonacciLevels> {
    let n = lookback.get();
    if values.len() < n {
        return None;
    }
    let recent = &values[values.len() - n..];
    let high = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = recent.iter().copied().fold(f64::INFINITY, f64::min);
    let mean = recent.iter().sum::<f64>() / n as f64;

    let last = values[values.len() - 1];
    let (direction, swing_low, swing_high) = if last > mean {
        (SwingDirection::Uptrend, low, high)
    } else {
        (SwingDirection::Downtrend, high, low)
    };
    let diff = swing_high - swing_low;

    Some(FibonacciLevels {
        direction,
        swing_low,
        swing_high,
        retracements: FIB_RETRACEMENTS.iter().map(|&r| (r, swing_high - r * diff)).collect(),
        extensions: FIB_EXTENSIONS.iter().map(|&e| (e, swing_high + (e - 1.0) * diff)).collect(),
    })
}

/// Every configured indicator, keyed by the timestamp of each close point.
pub fn compute(series: &CloseSeries, config: &IndicatorConfig) -> Vec<(Timestamp, Indicators)> {
    let values = series.values();
    let volumes: Vec<f64> = series.points().iter().map(|p| p.volume).collect();

    let rsi = rsi(values, config.rsi_period);
    let (macd, macd_signal) = macd(values, config.macd_fast, config.macd_slow, config.macd_signal);
    let ma = |p| moving_average(values, p, config.ma_type);
    let (fast, slow) = (ma(config.fast), ma(config.slow));
    let (short, medium, long) = (ma(config.short), ma(config.medium), ma(config.long));
    let obv = obv(values, &volumes);
    let bands = bollinger(values, config.bollinger_window, config.bollinger_std_dev);
    let fib = fibonacci(values, config.fib_lookback);

    series
        .points()
        .iter()
        .enumerate()
        .map(|(i, point)| {
            (
                point.timestamp,
                Indicators {
                    rsi: rsi[i],
                    macd: Some(macd[i]),
                    macd_signal: Some(macd_signal[i]),
                    ma_fast: fast[i],
                    ma_slow: slow[i],
                    ma_short: short[i],
                    ma_medium: medium[i],
                    ma_long: long[i],
                    obv: Some(obv[i]),
                    bb_upper: bands[i].map(|b| b.upper),
                    bb_lower: bands[i].map(|b| b.lower),
                    fib_level: fib
                        .as_ref()
                        .and_then(|f| f.touching(point.close, config.fib_tolerance.get())),
                },
            )
        })
        .collect()
}

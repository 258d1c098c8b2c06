//! Entry and exit rules, evaluated in a fixed precedence order:
//! oscillator, crossover, alignment, pattern.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    signals::{PatternSignal, SignalRow},
    PatternError, PatternKind, Ratio, Result,
};

/// Family of the rule that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleClass {
    Oscillator,
    Crossover,
    Alignment,
    Pattern,
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleClass::Oscillator => "oscillator",
            RuleClass::Crossover => "crossover",
            RuleClass::Alignment => "alignment",
            RuleClass::Pattern => "pattern",
        })
    }
}

/// A fired rule
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub class: RuleClass,
    pub reason: String,
    /// Confidence of the pattern behind the signal, if any
    pub confidence: Option<f64>,
}

impl Signal {
    fn new(class: RuleClass, reason: &str) -> Self {
        Self {
            class,
            reason: reason.to_string(),
            confidence: None,
        }
    }
}

/// Inputs visible to a rule at one row
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub row: &'a SignalRow,
    /// Closest earlier row with a valid close of its own
    pub prev: Option<&'a SignalRow>,
    pub price: f64,
}

// ============================================================
// OSCILLATOR: RSI + MACD
// ============================================================

/// Enters when RSI is oversold while MACD is above the momentum floor; exits
/// when RSI is overbought or price falls `stop_loss` below entry.
/// `require_rising_obv` also demands OBV above its previous value on entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorRule {
    pub enabled: bool,
    pub oversold: f64,
    pub overbought: f64,
    pub momentum_floor: f64,
    pub stop_loss: Ratio,
    pub require_rising_obv: bool,
}

impl Default for OscillatorRule {
    fn default() -> Self {
        Self {
            enabled: true,
            oversold: 30.0,
            overbought: 70.0,
            momentum_floor: 0.0,
            stop_loss: Ratio::new_const(0.10),
            require_rising_obv: false,
        }
    }
}

impl OscillatorRule {
    fn entry(&self, ctx: &RowContext) -> Option<Signal> {
        let rsi = ctx.row.indicators.rsi?;
        let macd = ctx.row.indicators.macd?;
        if self.require_rising_obv {
            let (prev, cur) = (ctx.prev?.indicators.obv?, ctx.row.indicators.obv?);
            if cur <= prev {
                return None;
            }
        }
        (rsi < self.oversold && macd > self.momentum_floor)
            .then(|| Signal::new(RuleClass::Oscillator, "rsi_oversold_macd_positive"))
    }

    fn exit(&self, ctx: &RowContext, entry_price: f64) -> Option<Signal> {
        if ctx.row.indicators.rsi.is_some_and(|rsi| rsi > self.overbought) {
            return Some(Signal::new(RuleClass::Oscillator, "rsi_overbought"));
        }
        (ctx.price < entry_price * (1.0 - self.stop_loss.get()))
            .then(|| Signal::new(RuleClass::Oscillator, "stop_loss"))
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.oversold)
            || !(0.0..=100.0).contains(&self.overbought)
            || self.oversold >= self.overbought
        {
            return Err(PatternError::InvalidConfig(format!(
                "oscillator thresholds need 0 <= oversold ({}) < overbought ({}) <= 100",
                self.oversold, self.overbought
            )));
        }
        if !self.momentum_floor.is_finite() {
            return Err(PatternError::InvalidValue("momentum_floor must be finite"));
        }
        Ok(())
    }
}

// ============================================================
// CROSSOVER: fast / slow moving average
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverRule {
    pub enabled: bool,
}

impl Default for CrossoverRule {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl CrossoverRule {
    fn lines(ctx: &RowContext) -> Option<((f64, f64), (f64, f64))> {
        Some((ctx.prev?.indicators.fast_slow()?, ctx.row.indicators.fast_slow()?))
    }

    fn entry(&self, ctx: &RowContext) -> Option<Signal> {
        let ((pf, ps), (f, s)) = Self::lines(ctx)?;
        (pf <= ps && f > s).then(|| Signal::new(RuleClass::Crossover, "ma_crossover"))
    }

    fn exit(&self, ctx: &RowContext) -> Option<Signal> {
        let ((pf, ps), (f, s)) = Self::lines(ctx)?;
        (pf >= ps && f < s).then(|| Signal::new(RuleClass::Crossover, "ma_crossunder"))
    }
}

// ============================================================
// ALIGNMENT: short / medium / long moving average
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentRule {
    pub enabled: bool,
}

impl Default for AlignmentRule {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AlignmentRule {
    fn lines(ctx: &RowContext) -> Option<((f64, f64, f64), (f64, f64, f64))> {
        Some((ctx.prev?.indicators.triple()?, ctx.row.indicators.triple()?))
    }

    fn entry(&self, ctx: &RowContext) -> Option<Signal> {
        let (prev, cur) = Self::lines(ctx)?;
        let bullish = |(s, m, l): (f64, f64, f64)| s > m && m > l;
        (!bullish(prev) && bullish(cur))
            .then(|| Signal::new(RuleClass::Alignment, "ma_bullish_alignment"))
    }

    fn exit(&self, ctx: &RowContext) -> Option<Signal> {
        let (prev, cur) = Self::lines(ctx)?;
        let bearish = |(s, m, l): (f64, f64, f64)| s < m && m < l;
        (!bearish(prev) && bearish(cur))
            .then(|| Signal::new(RuleClass::Alignment, "ma_bearish_alignment"))
    }
}

// ============================================================
// PATTERN
// ============================================================

/// Enters on an `entry_kinds` pattern and exits on an `exit_kinds` pattern,
/// each at or above `min_confidence`. The most confident match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternRule {
    pub enabled: bool,
    pub min_confidence: Ratio,
    pub entry_kinds: Vec<PatternKind>,
    pub exit_kinds: Vec<PatternKind>,
}

impl Default for PatternRule {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: Ratio::new_const(0.5),
            entry_kinds: PatternKind::ALL.into_iter().filter(|k| k.is_bullish()).collect(),
            exit_kinds: PatternKind::ALL.into_iter().filter(|k| k.is_bearish()).collect(),
        }
    }
}

impl PatternRule {
    fn strongest(&self, patterns: &[PatternSignal], kinds: &[PatternKind]) -> Option<Signal> {
        let best = patterns
            .iter()
            .filter(|p| kinds.contains(&p.kind) && p.confidence >= self.min_confidence.get())
            // max_by returns the last of equal elements; reverse keeps the first
            .rev()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;
        Some(Signal {
            class: RuleClass::Pattern,
            reason: best.kind.name().to_string(),
            confidence: Some(best.confidence),
        })
    }

    fn entry(&self, ctx: &RowContext) -> Option<Signal> {
        self.strongest(&ctx.row.patterns, &self.entry_kinds)
    }

    fn exit(&self, ctx: &RowContext) -> Option<Signal> {
        self.strongest(&ctx.row.patterns, &self.exit_kinds)
    }
}

// ============================================================
// RULE SET
// ============================================================

/// Every rule, each individually enabled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub oscillator: OscillatorRule,
    pub crossover: CrossoverRule,
    pub alignment: AlignmentRule,
    pub pattern: PatternRule,
}

/// Enabled rule, borrowed from a [`RuleSet`]
#[derive(Debug, Clone, Copy)]
pub(crate) enum Rule<'a> {
    Oscillator(&'a OscillatorRule),
    Crossover(&'a CrossoverRule),
    Alignment(&'a AlignmentRule),
    Pattern(&'a PatternRule),
}

impl Rule<'_> {
    pub(crate) fn class(&self) -> RuleClass {
        match self {
            Rule::Oscillator(_) => RuleClass::Oscillator,
            Rule::Crossover(_) => RuleClass::Crossover,
            Rule::Alignment(_) => RuleClass::Alignment,
            Rule::Pattern(_) => RuleClass::Pattern,
        }
    }

    /// Whether the row carries what this rule reads. An open position makes
    /// the oscillator evaluable on price alone, for its stop-loss.
    pub(crate) fn evaluable(&self, ctx: &RowContext, long: bool) -> bool {
        let ind = &ctx.row.indicators;
        match self {
            Rule::Oscillator(_) => long || (ind.rsi.is_some() && ind.macd.is_some()),
            Rule::Crossover(_) => CrossoverRule::lines(ctx).is_some(),
            Rule::Alignment(_) => AlignmentRule::lines(ctx).is_some(),
            Rule::Pattern(_) => !ctx.row.patterns.is_empty(),
        }
    }

    pub(crate) fn entry(&self, ctx: &RowContext) -> Option<Signal> {
        match self {
            Rule::Oscillator(r) => r.entry(ctx),
            Rule::Crossover(r) => r.entry(ctx),
            Rule::Alignment(r) => r.entry(ctx),
            Rule::Pattern(r) => r.entry(ctx),
        }
    }

    pub(crate) fn exit(&self, ctx: &RowContext, entry_price: f64) -> Option<Signal> {
        match self {
            Rule::Oscillator(r) => r.exit(ctx, entry_price),
            Rule::Crossover(r) => r.exit(ctx),
            Rule::Alignment(r) => r.exit(ctx),
            Rule::Pattern(r) => r.exit(ctx),
        }
    }
}

impl RuleSet {
    /// Only the pattern rule enabled
    pub fn patterns_only() -> Self {
        Self {
            oscillator: OscillatorRule {
                enabled: false,
                ..Default::default()
            },
            crossover: CrossoverRule { enabled: false },
            alignment: AlignmentRule { enabled: false },
            pattern: PatternRule::default(),
        }
    }

    /// Only the oscillator rule enabled
    pub fn oscillator_only() -> Self {
        Self {
            pattern: PatternRule {
                enabled: false,
                ..Default::default()
            },
            crossover: CrossoverRule { enabled: false },
            alignment: AlignmentRule { enabled: false },
            oscillator: OscillatorRule::default(),
        }
    }

    /// Enabled rules in precedence order.
    pub(crate) fn enabled(&self) -> Vec<Rule<'_>> {
        let mut rules = Vec::with_capacity(4);
        if self.oscillator.enabled {
            rules.push(Rule::Oscillator(&self.oscillator));
        }
        if self.crossover.enabled {
            rules.push(Rule::Crossover(&self.crossover));
        }
        if self.alignment.enabled {
            rules.push(Rule::Alignment(&self.alignment));
        }
        if self.pattern.enabled {
            rules.push(Rule::Pattern(&self.pattern));
        }
        rules
    }

    pub fn validate(&self) -> Result<()> {
        if self.oscillator.enabled {
            self.oscillator.validate()?;
        }
        if self.enabled().is_empty() {
            return Err(PatternError::InvalidConfig(
                "at least one backtest rule must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::Indicators;
    use chrono::{TimeZone, Utc};

    fn row(indicators: Indicators) -> SignalRow {
        let mut row = SignalRow::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), Some(100.0));
        row.indicators = indicators;
        row
    }

    fn ctx<'a>(row: &'a SignalRow, prev: Option<&'a SignalRow>) -> RowContext<'a> {
        RowContext { row, prev, price: row.close.unwrap_or(0.0) }
    }

    #[test]
    fn test_oscillator_entry_needs_both() {
        let rule = OscillatorRule::default();
        let r = row(Indicators { rsi: Some(25.0), macd: Some(0.5), ..Default::default() });
        assert!(rule.entry(&ctx(&r, None)).is_some());
        let r = row(Indicators { rsi: Some(25.0), macd: Some(-0.5), ..Default::default() });
        assert!(rule.entry(&ctx(&r, None)).is_none());
        let r = row(Indicators { rsi: Some(25.0), ..Default::default() });
        assert!(rule.entry(&ctx(&r, None)).is_none());
    }

    #[test]
    fn test_oscillator_rising_obv() {
        let rule = OscillatorRule { require_rising_obv: true, ..Default::default() };
        let oversold = |obv| row(Indicators { rsi: Some(25.0), macd: Some(0.5), obv, ..Default::default() });
        let (low, high) = (oversold(Some(100.0)), oversold(Some(150.0)));

        assert!(rule.entry(&ctx(&high, Some(&low))).is_some());
        assert!(rule.entry(&ctx(&low, Some(&high))).is_none());
        assert!(rule.entry(&ctx(&high, None)).is_none());
        assert!(OscillatorRule::default().entry(&ctx(&low, Some(&high))).is_some());
    }

    #[test]
    fn test_oscillator_stop_loss() {
        let rule = OscillatorRule::default();
        let r = row(Indicators::default());
        // 100 < 120 * 0.9
        let sig = rule.exit(&ctx(&r, None), 120.0).unwrap();
        assert_eq!(sig.reason, "stop_loss");
        assert!(rule.exit(&ctx(&r, None), 105.0).is_none());
    }

    #[test]
    fn test_crossover() {
        let rule = CrossoverRule::default();
        let prev = row(Indicators { ma_fast: Some(1.0), ma_slow: Some(1.0), ..Default::default() });
        let cur = row(Indicators { ma_fast: Some(2.0), ma_slow: Some(1.0), ..Default::default() });
        assert!(rule.entry(&ctx(&cur, Some(&prev))).is_some());
        assert!(rule.entry(&ctx(&cur, None)).is_none());
        assert!(rule.exit(&ctx(&prev, Some(&cur))).is_none());
    }

    #[test]
    fn test_alignment() {
        let rule = AlignmentRule::default();
        let flat = row(Indicators {
            ma_short: Some(1.0),
            ma_medium: Some(1.0),
            ma_long: Some(1.0),
            ..Default::default()
        });
        let up = row(Indicators {
            ma_short: Some(3.0),
            ma_medium: Some(2.0),
            ma_long: Some(1.0),
            ..Default::default()
        });
        let down = row(Indicators {
            ma_short: Some(1.0),
            ma_medium: Some(2.0),
            ma_long: Some(3.0),
            ..Default::default()
        });
        assert!(rule.entry(&ctx(&up, Some(&flat))).is_some());
        assert!(rule.entry(&ctx(&up, Some(&up))).is_none());
        assert_eq!(rule.exit(&ctx(&down, Some(&up))).unwrap().reason, "ma_bearish_alignment");
    }

    #[test]
    fn test_pattern_rule_picks_most_confident() {
        let rule = PatternRule::default();
        let mut r = row(Indicators::default());
        r.patterns = vec![
            PatternSignal { kind: PatternKind::DoubleBottom, confidence: 0.6 },
            PatternSignal { kind: PatternKind::FallingWedge, confidence: 0.9 },
            PatternSignal { kind: PatternKind::DoubleTop, confidence: 0.95 },
            PatternSignal { kind: PatternKind::InverseHeadAndShoulders, confidence: 0.4 },
        ];
        let sig = rule.entry(&ctx(&r, None)).unwrap();
        assert_eq!(sig.reason, "Falling Wedge");
        assert_eq!(sig.confidence, Some(0.9));
        assert_eq!(rule.exit(&ctx(&r, None)).unwrap().reason, "Double Top");
    }

    #[test]
    fn test_symmetrical_triangle_is_neither() {
        let rule = PatternRule::default();
        assert!(!rule.entry_kinds.contains(&PatternKind::SymmetricalTriangle));
        assert!(!rule.exit_kinds.contains(&PatternKind::SymmetricalTriangle));
    }

    #[test]
    fn test_rule_set_validation() {
        assert!(RuleSet::default().validate().is_ok());
        let mut none = RuleSet::patterns_only();
        none.pattern.enabled = false;
        assert!(none.validate().is_err());

        let mut bad = RuleSet::default();
        bad.oscillator.oversold = 80.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_precedence_order() {
        let classes: Vec<RuleClass> = RuleSet::default().enabled().iter().map(|r| r.class()).collect();
        assert_eq!(
            classes,
            vec![RuleClass::Oscillator, RuleClass::Crossover, RuleClass::Alignment, RuleClass::Pattern]
        );
    }
}

//! Entry signal detection.
//!
//! [`EntryDetector`] folds an ordered chain of [`Filter`] objects over the
//! newest bar of a window. The first filter to reject wins and produces a
//! `NoSignal` with its reason; a chain that survives end to end is still only
//! a candidate until its quality score clears the configured floor and the
//! ranging-market veto declines to intervene. Rejection is an everyday
//! outcome here, never an error.

use chrono::NaiveDateTime;

use super::bar::{keys, Bar, RibbonState, VolumeClass};
use super::error::TradesimError;
use super::signal::{Detection, Direction, EntrySignal};

/// Bars of history required before any signal is considered.
pub const MIN_HISTORY: usize = 20;

/// Price must be this far (percent) on the wrong side of VWAP before the
/// VWAP filter hard-rejects; closer misses stay neutral.
const VWAP_WRONG_SIDE_PCT: f64 = 0.5;

/// Stochastic zone edges used by the entry-side rule.
const STOCH_OVERBOUGHT: f64 = 80.0;
const STOCH_OVERSOLD: f64 = 20.0;

/// Ranging-market veto thresholds.
const RANGING_RANGE_MAX_PCT: f64 = 3.0;
const RANGING_EXPANSION_MAX: f64 = 2.0;
const RANGING_COMPRESSION_MIN: f64 = 7.0;
const RANGING_COMPRESSION_BARS: usize = 5;
const RANGING_FLIP_COUNT: usize = 3;

/// Entry-side strategy parameters, immutable for the life of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryConfig {
    /// Minimum |long_score - short_score|.
    pub confluence_gap_min: f64,
    /// Minimum winning-side confluence score.
    pub confluence_score_min: f64,
    /// RSI band for longs; the short band is the mirror around 50.
    pub rsi_min: f64,
    pub rsi_max: f64,
    /// Volume classes a bar may carry to be tradeable.
    pub volume_requirement: Vec<VolumeClass>,
    pub require_ema_alignment: bool,
    pub require_macd_confirmation: bool,
    /// Close must sit at least this far (percent) beyond ema20 for the
    /// alignment filter to count the bar as aligned.
    pub min_price_above_ema20: f64,
    /// Compression floor; `None` disables the filter.
    pub min_compression: Option<f64>,
    pub use_stochastic: bool,
    pub use_bollinger: bool,
    pub use_vwap: bool,
    pub require_ribbon_flip: bool,
    /// Ribbon alignment floor; `None` disables the filter.
    pub min_ribbon_alignment: Option<f64>,
    /// Quality score (0-100) a surviving candidate must reach.
    pub min_quality_score: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        EntryConfig {
            confluence_gap_min: 10.0,
            confluence_score_min: 50.0,
            rsi_min: 40.0,
            rsi_max: 70.0,
            volume_requirement: vec![
                VolumeClass::Spike,
                VolumeClass::Elevated,
                VolumeClass::Normal,
            ],
            require_ema_alignment: true,
            require_macd_confirmation: false,
            min_price_above_ema20: 0.0,
            min_compression: None,
            use_stochastic: true,
            use_bollinger: true,
            use_vwap: false,
            require_ribbon_flip: false,
            min_ribbon_alignment: None,
            min_quality_score: 60.0,
        }
    }
}

/// Everything a filter may look at for one candidate.
pub struct FilterContext<'a> {
    pub window: &'a [Bar],
    pub bar: &'a Bar,
    pub direction: Direction,
    pub gap: f64,
    /// Winning-side confluence score.
    pub score: f64,
}

/// Result of one filter evaluation. A neutral pass contributes nothing; a
/// confirming pass adds confidence and counts toward the quality score.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Pass { confidence: f64, confirms: bool },
    Reject(String),
}

impl FilterOutcome {
    fn neutral() -> Self {
        FilterOutcome::Pass {
            confidence: 0.0,
            confirms: false,
        }
    }

    fn confirm(confidence: f64) -> Self {
        FilterOutcome::Pass {
            confidence,
            confirms: true,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        FilterOutcome::Reject(reason.into())
    }
}

/// One link of the entry chain. Filters are evaluated in a fixed order and
/// the first rejection short-circuits the rest.
pub trait Filter {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome;
}

struct GapFloor {
    min: f64,
}

impl Filter for GapFloor {
    fn name(&self) -> &'static str {
        "confluence_gap"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        if ctx.gap < self.min {
            FilterOutcome::reject(format!("gap {:.1} below {:.1}", ctx.gap, self.min))
        } else {
            FilterOutcome::confirm(0.0)
        }
    }
}

struct ScoreFloor {
    min: f64,
}

impl Filter for ScoreFloor {
    fn name(&self) -> &'static str {
        "confluence_score"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        if ctx.score < self.min {
            FilterOutcome::reject(format!("score {:.1} below {:.1}", ctx.score, self.min))
        } else {
            FilterOutcome::confirm(0.0)
        }
    }
}

struct VolumeFilter {
    allowed: Vec<VolumeClass>,
}

impl Filter for VolumeFilter {
    fn name(&self) -> &'static str {
        "volume_class"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let Some(class) = ctx.bar.volume_class else {
            return FilterOutcome::reject("volume class unavailable");
        };
        if !self.allowed.contains(&class) {
            return FilterOutcome::reject(format!("volume class {class:?} not allowed"));
        }
        match class {
            VolumeClass::Spike => FilterOutcome::confirm(10.0),
            VolumeClass::Elevated => FilterOutcome::confirm(5.0),
            _ => FilterOutcome::confirm(0.0),
        }
    }
}

struct RsiBand {
    min: f64,
    max: f64,
}

impl Filter for RsiBand {
    fn name(&self) -> &'static str {
        "rsi_band"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let Some(rsi) = ctx.bar.indicator(keys::RSI) else {
            return FilterOutcome::reject("rsi unavailable");
        };
        let (lo, hi) = match ctx.direction {
            Direction::Long => (self.min, self.max),
            Direction::Short => (100.0 - self.max, 100.0 - self.min),
        };
        if rsi < lo || rsi > hi {
            FilterOutcome::reject(format!("rsi {rsi:.1} outside {lo:.1}-{hi:.1}"))
        } else {
            FilterOutcome::confirm(0.0)
        }
    }
}

struct EmaAlignment {
    required: bool,
    min_price_above_ema20: f64,
}

impl EmaAlignment {
    fn aligned(&self, ctx: &FilterContext<'_>) -> Option<bool> {
        let ema9 = ctx.bar.indicator(keys::EMA9)?;
        let ema20 = ctx.bar.indicator(keys::EMA20)?;
        let ema50 = ctx.bar.indicator(keys::EMA50)?;
        let margin = self.min_price_above_ema20 / 100.0;
        let ok = match ctx.direction {
            Direction::Long => {
                ema9 > ema20 && ema20 > ema50 && ctx.bar.close >= ema20 * (1.0 + margin)
            }
            Direction::Short => {
                ema9 < ema20 && ema20 < ema50 && ctx.bar.close <= ema20 * (1.0 - margin)
            }
        };
        Some(ok)
    }
}

impl Filter for EmaAlignment {
    fn name(&self) -> &'static str {
        "ema_alignment"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        match self.aligned(ctx) {
            Some(true) => FilterOutcome::confirm(10.0),
            Some(false) if self.required => FilterOutcome::reject("emas not aligned"),
            None if self.required => FilterOutcome::reject("ema values unavailable"),
            _ => FilterOutcome::neutral(),
        }
    }
}

struct MacdConfirmation {
    required: bool,
}

impl Filter for MacdConfirmation {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let confirms = ctx.bar.indicator(keys::MACD_HIST).map(|hist| match ctx.direction {
            Direction::Long => hist > 0.0,
            Direction::Short => hist < 0.0,
        });
        match confirms {
            Some(true) => FilterOutcome::confirm(5.0),
            Some(false) if self.required => FilterOutcome::reject("macd histogram opposes"),
            None if self.required => FilterOutcome::reject("macd unavailable"),
            _ => FilterOutcome::neutral(),
        }
    }
}

struct CompressionFloor {
    min: f64,
}

impl Filter for CompressionFloor {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let Some(compression) = ctx.bar.indicator(keys::COMPRESSION) else {
            return FilterOutcome::reject("compression unavailable");
        };
        if compression < self.min {
            FilterOutcome::reject(format!("compression {compression:.1} below {:.1}", self.min))
        } else {
            FilterOutcome::confirm(5.0)
        }
    }
}

struct StochasticZone;

impl Filter for StochasticZone {
    fn name(&self) -> &'static str {
        "stochastic"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let (Some(k), Some(d)) = (
            ctx.bar.indicator(keys::STOCH_K),
            ctx.bar.indicator(keys::STOCH_D),
        ) else {
            return FilterOutcome::neutral();
        };
        match ctx.direction {
            Direction::Long => {
                if k >= STOCH_OVERBOUGHT {
                    FilterOutcome::reject(format!("stochastic overbought at {k:.1}"))
                } else if k > d && k >= STOCH_OVERSOLD {
                    FilterOutcome::confirm(5.0)
                } else {
                    FilterOutcome::neutral()
                }
            }
            Direction::Short => {
                if k <= STOCH_OVERSOLD {
                    FilterOutcome::reject(format!("stochastic oversold at {k:.1}"))
                } else if k < d && k <= STOCH_OVERBOUGHT {
                    FilterOutcome::confirm(5.0)
                } else {
                    FilterOutcome::neutral()
                }
            }
        }
    }
}

struct BollingerFilter;

impl Filter for BollingerFilter {
    fn name(&self) -> &'static str {
        "bollinger"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let (Some(upper), Some(lower)) = (
            ctx.bar.indicator(keys::BB_UPPER),
            ctx.bar.indicator(keys::BB_LOWER),
        ) else {
            return FilterOutcome::neutral();
        };
        let interesting = match ctx.direction {
            // Expansion-side breakout or a mean-reversion touch of the far band.
            Direction::Long => ctx.bar.close > upper || ctx.bar.low <= lower,
            Direction::Short => ctx.bar.close < lower || ctx.bar.high >= upper,
        };
        if interesting {
            FilterOutcome::confirm(5.0)
        } else {
            FilterOutcome::neutral()
        }
    }
}

struct VwapFilter;

impl Filter for VwapFilter {
    fn name(&self) -> &'static str {
        "vwap"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let Some(vwap) = ctx.bar.indicator(keys::VWAP) else {
            return FilterOutcome::neutral();
        };
        let margin = VWAP_WRONG_SIDE_PCT / 100.0;
        match ctx.direction {
            Direction::Long => {
                if ctx.bar.close >= vwap {
                    FilterOutcome::confirm(5.0)
                } else if ctx.bar.close < vwap * (1.0 - margin) {
                    FilterOutcome::reject(format!("close well below vwap {vwap:.4}"))
                } else {
                    FilterOutcome::neutral()
                }
            }
            Direction::Short => {
                if ctx.bar.close <= vwap {
                    FilterOutcome::confirm(5.0)
                } else if ctx.bar.close > vwap * (1.0 + margin) {
                    FilterOutcome::reject(format!("close well above vwap {vwap:.4}"))
                } else {
                    FilterOutcome::neutral()
                }
            }
        }
    }
}

struct RibbonFlip;

/// Most recent ribbon-state change in the window, newest first.
fn latest_ribbon_flip(window: &[Bar]) -> Option<RibbonState> {
    for pair in window.windows(2).rev() {
        if let (Some(prev), Some(curr)) = (pair[0].ribbon_state, pair[1].ribbon_state) {
            if prev != curr {
                return Some(curr);
            }
        }
    }
    None
}

impl Filter for RibbonFlip {
    fn name(&self) -> &'static str {
        "ribbon_flip"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let wanted = match ctx.direction {
            Direction::Long => RibbonState::Bullish,
            Direction::Short => RibbonState::Bearish,
        };
        match latest_ribbon_flip(ctx.window) {
            Some(state) if state == wanted => FilterOutcome::confirm(5.0),
            Some(state) => {
                FilterOutcome::reject(format!("latest ribbon flip went {state:?}"))
            }
            None => FilterOutcome::reject("no ribbon flip in the window"),
        }
    }
}

struct RibbonAlignmentFloor {
    min: f64,
}

impl Filter for RibbonAlignmentFloor {
    fn name(&self) -> &'static str {
        "ribbon_alignment"
    }

    fn evaluate(&self, ctx: &FilterContext<'_>) -> FilterOutcome {
        let Some(alignment) = ctx.bar.indicator(keys::RIBBON_ALIGNMENT) else {
            return FilterOutcome::reject("ribbon alignment unavailable");
        };
        if alignment < self.min {
            FilterOutcome::reject(format!(
                "ribbon alignment {alignment:.1} below {:.1}",
                self.min
            ))
        } else {
            FilterOutcome::confirm(5.0)
        }
    }
}

/// One row of the batch scan: the decision for the bar closing the window.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    pub timestamp: NaiveDateTime,
    pub detection: Detection,
}

pub struct EntryDetector {
    config: EntryConfig,
    filters: Vec<Box<dyn Filter>>,
}

impl EntryDetector {
    pub fn new(config: EntryConfig) -> Result<Self, TradesimError> {
        Self::validate(&config)?;
        let filters = Self::build_chain(&config);
        Ok(EntryDetector { config, filters })
    }

    fn validate(config: &EntryConfig) -> Result<(), TradesimError> {
        let invalid = |key: &str, reason: String| TradesimError::ConfigInvalid {
            section: "entry".to_string(),
            key: key.to_string(),
            reason,
        };
        if config.rsi_min >= config.rsi_max {
            return Err(invalid(
                "rsi_min",
                format!("{} must be below rsi_max {}", config.rsi_min, config.rsi_max),
            ));
        }
        if !(0.0..=100.0).contains(&config.rsi_min) || !(0.0..=100.0).contains(&config.rsi_max) {
            return Err(invalid("rsi_max", "rsi band must lie in 0-100".to_string()));
        }
        if config.volume_requirement.is_empty() {
            return Err(invalid(
                "volume_requirement",
                "at least one volume class must be allowed".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&config.min_quality_score) {
            return Err(invalid(
                "min_quality_score",
                format!("{} must lie in 0-100", config.min_quality_score),
            ));
        }
        if config.confluence_gap_min < 0.0 || config.confluence_score_min < 0.0 {
            return Err(invalid(
                "confluence_gap_min",
                "confluence floors must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    fn build_chain(config: &EntryConfig) -> Vec<Box<dyn Filter>> {
        let mut filters: Vec<Box<dyn Filter>> = vec![
            Box::new(GapFloor {
                min: config.confluence_gap_min,
            }),
            Box::new(ScoreFloor {
                min: config.confluence_score_min,
            }),
            Box::new(VolumeFilter {
                allowed: config.volume_requirement.clone(),
            }),
            Box::new(RsiBand {
                min: config.rsi_min,
                max: config.rsi_max,
            }),
            Box::new(EmaAlignment {
                required: config.require_ema_alignment,
                min_price_above_ema20: config.min_price_above_ema20,
            }),
            Box::new(MacdConfirmation {
                required: config.require_macd_confirmation,
            }),
        ];
        if let Some(min) = config.min_compression {
            filters.push(Box::new(CompressionFloor { min }));
        }
        if config.use_stochastic {
            filters.push(Box::new(StochasticZone));
        }
        if config.use_bollinger {
            filters.push(Box::new(BollingerFilter));
        }
        if config.use_vwap {
            filters.push(Box::new(VwapFilter));
        }
        if config.require_ribbon_flip {
            filters.push(Box::new(RibbonFlip));
        }
        if let Some(min) = config.min_ribbon_alignment {
            filters.push(Box::new(RibbonAlignmentFloor { min }));
        }
        filters
    }

    /// Evaluates the newest bar of `window`. The window must be ordered;
    /// only the most recent [`MIN_HISTORY`] bars are consulted.
    pub fn detect(&self, window: &[Bar]) -> Detection {
        if window.len() < MIN_HISTORY {
            return Detection::none(format!(
                "{} bars of history, need {MIN_HISTORY}",
                window.len()
            ));
        }
        let bar = match window.last() {
            Some(bar) => bar,
            None => return Detection::none("empty window"),
        };
        let (Some(long_score), Some(short_score)) = (
            bar.indicator(keys::LONG_SCORE),
            bar.indicator(keys::SHORT_SCORE),
        ) else {
            return Detection::none("confluence scores unavailable");
        };

        let gap = (long_score - short_score).abs();
        let (direction, score) = if long_score >= short_score {
            (Direction::Long, long_score)
        } else {
            (Direction::Short, short_score)
        };
        let ctx = FilterContext {
            window,
            bar,
            direction,
            gap,
            score,
        };

        let mut confidence = 50.0;
        let mut filters_passed: Vec<&'static str> = Vec::new();
        for filter in &self.filters {
            match filter.evaluate(&ctx) {
                FilterOutcome::Reject(reason) => {
                    return Detection::none(format!("{}: {reason}", filter.name()));
                }
                FilterOutcome::Pass {
                    confidence: boost,
                    confirms,
                } => {
                    confidence += boost;
                    if confirms {
                        filters_passed.push(filter.name());
                    }
                }
            }
        }

        let quality_score = self.quality_score(&ctx, &filters_passed);
        if quality_score < self.config.min_quality_score {
            return Detection::none(format!(
                "quality score {quality_score:.0} below {:.0}",
                self.config.min_quality_score
            ));
        }

        if self.config.require_ribbon_flip && is_ranging_market(window) {
            return Detection::none("ribbon flip vetoed inside a ranging market");
        }

        Detection::Signal(EntrySignal {
            direction,
            confidence: confidence.min(100.0),
            quality_score,
            filters_passed,
            reason: format!(
                "{direction:?} confluence gap {gap:.1}, quality {quality_score:.0}"
            ),
        })
    }

    /// Weighted 0-100 score of how much of the picture agrees with the
    /// candidate. Gates count among `filters_passed`, so the multi-confirmation
    /// bonus needs real confirmations on top of them.
    fn quality_score(&self, ctx: &FilterContext<'_>, filters_passed: &[&'static str]) -> f64 {
        let mut score = match ctx.gap {
            g if g >= 30.0 => 25.0,
            g if g >= 20.0 => 20.0,
            g if g >= 10.0 => 12.0,
            _ => 5.0,
        };
        score += match ctx.score {
            s if s >= 70.0 => 10.0,
            s if s >= 50.0 => 5.0,
            _ => 0.0,
        };
        score += match ctx.bar.volume_class {
            Some(VolumeClass::Spike) => 15.0,
            Some(VolumeClass::Elevated) => 10.0,
            Some(VolumeClass::Normal) => 5.0,
            _ => 0.0,
        };
        // Confirmations beyond the four gates.
        let confirmations = filters_passed.len().saturating_sub(4);
        score += (confirmations as f64 * 5.0).min(25.0);
        if filters_passed.contains(&"ema_alignment") && filters_passed.contains(&"macd") {
            score += 10.0;
        }
        score += match filters_passed.len() {
            n if n >= 8 => 10.0,
            n if n >= 6 => 5.0,
            _ => 0.0,
        };
        score.clamp(0.0, 100.0)
    }

    /// Batch replay of [`detect`](Self::detect) over a full series, one row
    /// per bar once enough history exists.
    pub fn scan(&self, bars: &[Bar]) -> Vec<ScanRow> {
        (MIN_HISTORY..=bars.len())
            .map(|end| ScanRow {
                timestamp: bars[end - 1].timestamp,
                detection: self.detect(&bars[..end]),
            })
            .collect()
    }
}

/// Tight 20-bar range with flat expansion and either persistent compression
/// or an oscillating ribbon. Flips inside such a box are unreliable, so a
/// flip-gated acceptance is vetoed.
fn is_ranging_market(window: &[Bar]) -> bool {
    let recent = &window[window.len() - MIN_HISTORY..];
    let high = recent.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = recent.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    if low <= 0.0 {
        return false;
    }
    if (high - low) / low * 100.0 >= RANGING_RANGE_MAX_PCT {
        return false;
    }

    let last10 = &recent[recent.len().saturating_sub(10)..];
    let rates: Vec<f64> = last10
        .iter()
        .filter_map(|b| b.indicator(keys::EXPANSION_RATE))
        .map(f64::abs)
        .collect();
    if rates.is_empty() {
        return false;
    }
    let mean_rate = rates.iter().sum::<f64>() / rates.len() as f64;
    if mean_rate >= RANGING_EXPANSION_MAX {
        return false;
    }

    let squeezed_bars = last10
        .iter()
        .filter(|b| {
            b.indicator(keys::COMPRESSION)
                .is_some_and(|c| c >= RANGING_COMPRESSION_MIN)
        })
        .count();
    let last5 = &recent[recent.len().saturating_sub(5)..];
    let flips = last5
        .windows(2)
        .filter(|pair| match (pair[0].ribbon_state, pair[1].ribbon_state) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        })
        .count();
    squeezed_bars >= RANGING_COMPRESSION_BARS || flips >= RANGING_FLIP_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + chrono::Duration::minutes(minute as i64)
    }

    /// A bar that passes the default chain as a long candidate.
    fn bullish_bar(minute: u32) -> Bar {
        let mut indicators = HashMap::new();
        indicators.insert(keys::LONG_SCORE.to_string(), 75.0);
        indicators.insert(keys::SHORT_SCORE.to_string(), 40.0);
        indicators.insert(keys::RSI.to_string(), 55.0);
        indicators.insert(keys::EMA9.to_string(), 101.0);
        indicators.insert(keys::EMA20.to_string(), 100.0);
        indicators.insert(keys::EMA50.to_string(), 99.0);
        indicators.insert(keys::MACD_HIST.to_string(), 0.4);
        indicators.insert(keys::STOCH_K.to_string(), 60.0);
        indicators.insert(keys::STOCH_D.to_string(), 50.0);
        Bar {
            timestamp: ts(minute),
            open: 101.5,
            high: 102.5,
            low: 101.0,
            close: 102.0,
            volume: 5000.0,
            volume_class: Some(VolumeClass::Elevated),
            ribbon_state: Some(RibbonState::Bullish),
            indicators,
        }
    }

    fn window_of(bar: Bar) -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..MIN_HISTORY as u32 - 1).map(bullish_bar).collect();
        let mut last = bar;
        last.timestamp = ts(MIN_HISTORY as u32 - 1);
        bars.push(last);
        bars
    }

    fn detector() -> EntryDetector {
        EntryDetector::new(EntryConfig::default()).unwrap()
    }

    #[test]
    fn rejects_inverted_rsi_band() {
        let config = EntryConfig {
            rsi_min: 70.0,
            rsi_max: 40.0,
            ..EntryConfig::default()
        };
        assert!(EntryDetector::new(config).is_err());
    }

    #[test]
    fn rejects_empty_volume_allow_list() {
        let config = EntryConfig {
            volume_requirement: vec![],
            ..EntryConfig::default()
        };
        assert!(EntryDetector::new(config).is_err());
    }

    #[test]
    fn short_history_is_a_non_signal() {
        let bars: Vec<Bar> = (0..5).map(bullish_bar).collect();
        let detection = detector().detect(&bars);
        assert!(!detection.is_signal());
    }

    #[test]
    fn clean_long_setup_signals() {
        let bars = window_of(bullish_bar(0));
        let detection = detector().detect(&bars);
        let signal = detection.signal().unwrap_or_else(|| panic!("{detection:?}"));
        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.quality_score >= 60.0);
        assert!(signal.filters_passed.contains(&"ema_alignment"));
    }

    #[test]
    fn gap_floor_short_circuits() {
        let mut bar = bullish_bar(0);
        bar.indicators.insert(keys::SHORT_SCORE.to_string(), 70.0);
        let detection = detector().detect(&window_of(bar));
        match detection {
            Detection::NoSignal { reason } => assert!(reason.starts_with("confluence_gap")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn volume_class_gate() {
        let mut bar = bullish_bar(0);
        bar.volume_class = Some(VolumeClass::Low);
        assert!(!detector().detect(&window_of(bar)).is_signal());

        let mut bar = bullish_bar(0);
        bar.volume_class = None;
        assert!(!detector().detect(&window_of(bar)).is_signal());
    }

    #[test]
    fn rsi_band_mirrors_for_shorts() {
        // Bearish setup with RSI 45: inside the short band (30-60 mirrored
        // from 40-70).
        let mut bar = bullish_bar(0);
        bar.indicators.insert(keys::LONG_SCORE.to_string(), 35.0);
        bar.indicators.insert(keys::SHORT_SCORE.to_string(), 72.0);
        bar.indicators.insert(keys::RSI.to_string(), 45.0);
        bar.indicators.insert(keys::EMA9.to_string(), 99.0);
        bar.indicators.insert(keys::EMA20.to_string(), 100.0);
        bar.indicators.insert(keys::EMA50.to_string(), 101.0);
        bar.indicators.insert(keys::MACD_HIST.to_string(), -0.4);
        bar.indicators.insert(keys::STOCH_K.to_string(), 40.0);
        bar.indicators.insert(keys::STOCH_D.to_string(), 50.0);
        bar.close = 98.0;
        bar.open = 98.5;
        bar.high = 99.0;
        bar.low = 97.8;
        let detection = detector().detect(&window_of(bar));
        let signal = detection.signal().unwrap_or_else(|| panic!("{detection:?}"));
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn overbought_stochastic_rejects_longs() {
        let mut bar = bullish_bar(0);
        bar.indicators.insert(keys::STOCH_K.to_string(), 85.0);
        bar.indicators.insert(keys::STOCH_D.to_string(), 80.0);
        assert!(!detector().detect(&window_of(bar)).is_signal());
    }

    #[test]
    fn missing_optional_indicator_degrades_quietly() {
        let detector = EntryDetector::new(EntryConfig {
            require_ema_alignment: false,
            ..EntryConfig::default()
        })
        .unwrap();
        let mut bar = bullish_bar(0);
        bar.indicators.remove(keys::EMA9);
        bar.indicators.remove(keys::MACD_HIST);
        bar.volume_class = Some(VolumeClass::Spike);
        // Still a signal as long as the quality floor is met without them.
        let detection = detector.detect(&window_of(bar));
        if let Detection::NoSignal { reason } = &detection {
            assert!(
                reason.starts_with("quality score"),
                "optional filters must not reject: {reason}"
            );
        }
    }

    #[test]
    fn missing_required_ema_rejects() {
        let mut bar = bullish_bar(0);
        bar.indicators.remove(keys::EMA50);
        let detection = detector().detect(&window_of(bar));
        match detection {
            Detection::NoSignal { reason } => assert!(reason.starts_with("ema_alignment")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn quality_floor_filters_weak_candidates() {
        let detector = EntryDetector::new(EntryConfig {
            min_quality_score: 95.0,
            ..EntryConfig::default()
        })
        .unwrap();
        let detection = detector.detect(&window_of(bullish_bar(0)));
        match detection {
            Detection::NoSignal { reason } => assert!(reason.starts_with("quality score")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    fn ranging_window() -> Vec<Bar> {
        // Tight box, persistent squeeze, flip on the final bar.
        (0..MIN_HISTORY as u32)
            .map(|i| {
                let mut bar = bullish_bar(i);
                bar.open = 100.2;
                bar.high = 100.5;
                bar.low = 99.8;
                bar.close = 100.1;
                bar.indicators.insert(keys::EXPANSION_RATE.to_string(), 0.5);
                bar.indicators.insert(keys::COMPRESSION.to_string(), 8.0);
                bar.ribbon_state = Some(if i < MIN_HISTORY as u32 - 1 {
                    RibbonState::Bearish
                } else {
                    RibbonState::Bullish
                });
                // Keep EMAs consistent with the flat tape.
                bar.indicators.insert(keys::EMA9.to_string(), 100.2);
                bar.indicators.insert(keys::EMA20.to_string(), 100.1);
                bar.indicators.insert(keys::EMA50.to_string(), 100.0);
                bar
            })
            .collect()
    }

    #[test]
    fn ranging_market_vetoes_flip_gated_signal() {
        let detector = EntryDetector::new(EntryConfig {
            require_ribbon_flip: true,
            min_quality_score: 0.0,
            ..EntryConfig::default()
        })
        .unwrap();
        let detection = detector.detect(&ranging_window());
        match detection {
            Detection::NoSignal { reason } => assert!(reason.contains("ranging")),
            other => panic!("expected veto, got {other:?}"),
        }
    }

    #[test]
    fn veto_is_scoped_to_flip_gated_configs() {
        let detector = EntryDetector::new(EntryConfig {
            require_ribbon_flip: false,
            min_quality_score: 0.0,
            ..EntryConfig::default()
        })
        .unwrap();
        assert!(detector.detect(&ranging_window()).is_signal());
    }

    #[test]
    fn scan_emits_one_row_per_eligible_bar() {
        let bars: Vec<Bar> = (0..30).map(bullish_bar).collect();
        let rows = detector().scan(&bars);
        assert_eq!(rows.len(), 30 - MIN_HISTORY + 1);
        assert_eq!(rows[0].timestamp, bars[MIN_HISTORY - 1].timestamp);
        assert!(rows.iter().all(|row| row.detection.is_signal()));
    }

    #[test]
    fn latest_flip_tracks_the_newest_change() {
        let mut bars: Vec<Bar> = (0..6).map(bullish_bar).collect();
        bars[2].ribbon_state = Some(RibbonState::Bearish);
        // 0-1 bullish, 2 bearish, 3.. bullish again: last flip is bullish.
        assert_eq!(latest_ribbon_flip(&bars), Some(RibbonState::Bullish));
        bars[5].ribbon_state = Some(RibbonState::Bearish);
        assert_eq!(latest_ribbon_flip(&bars), Some(RibbonState::Bearish));
    }
}

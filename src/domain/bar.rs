//! Enriched bar representation.
//!
//! A bar is an immutable OHLCV snapshot plus whatever named indicator values
//! the upstream enrichment step attached to it. Which indicators are present
//! can vary bar to bar; every lookup goes through [`Bar::indicator`] so that
//! absence is an `Option`, never a panic.

use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Well-known indicator keys produced by the enrichment step.
pub mod keys {
    pub const LONG_SCORE: &str = "long_score";
    pub const SHORT_SCORE: &str = "short_score";
    pub const RSI: &str = "rsi";
    pub const STOCH_K: &str = "stoch_k";
    pub const STOCH_D: &str = "stoch_d";
    pub const BB_UPPER: &str = "bb_upper";
    pub const BB_MIDDLE: &str = "bb_middle";
    pub const BB_LOWER: &str = "bb_lower";
    pub const VWAP: &str = "vwap";
    pub const COMPRESSION: &str = "compression";
    pub const EXPANSION_RATE: &str = "expansion_rate";
    pub const MACD_HIST: &str = "macd_hist";
    pub const RIBBON_ALIGNMENT: &str = "ribbon_alignment";
    pub const EMA9: &str = "ema9";
    pub const EMA20: &str = "ema20";
    pub const EMA50: &str = "ema50";
}

/// Relative volume classification attached by the enrichment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeClass {
    Spike,
    Elevated,
    Normal,
    Low,
}

impl VolumeClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "spike" => Some(VolumeClass::Spike),
            "elevated" => Some(VolumeClass::Elevated),
            "normal" => Some(VolumeClass::Normal),
            "low" => Some(VolumeClass::Low),
            _ => None,
        }
    }
}

/// Majority direction of the EMA ribbon on this bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RibbonState {
    Bullish,
    Bearish,
    Mixed,
}

impl RibbonState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bullish" => Some(RibbonState::Bullish),
            "bearish" => Some(RibbonState::Bearish),
            "mixed" => Some(RibbonState::Mixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub volume_class: Option<VolumeClass>,
    pub ribbon_state: Option<RibbonState>,
    pub indicators: HashMap<String, f64>,
}

impl Bar {
    /// Looks up a named indicator, filtering out non-finite values so that a
    /// NaN written by a broken enrichment column reads as "absent".
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied().filter(|v| v.is_finite())
    }

    pub fn has_indicator(&self, name: &str) -> bool {
        self.indicator(name).is_some()
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

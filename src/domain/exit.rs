//! Per-bar exit evaluation.
//!
//! [`ExitManager`] owns the exit side of the strategy: it computes the initial
//! stop and take-profit levels when a trade opens, and is then asked once per
//! bar, per open trade, whether anything should fill. Rules are evaluated in a
//! fixed priority order and the first rule that fires wins the bar; the engine
//! applies at most one fill per trade per bar.

use super::bar::{keys, Bar};
use super::error::TradesimError;
use super::signal::Direction;
use super::trade::{ExitLevels, ExitTier, ProfitTarget, Trade, SIZE_EPSILON};

/// Compression level above which a squeeze is considered extreme.
pub const COMPRESSION_EXIT_MIN: f64 = 7.0;
/// Expansion rate at or below which the ribbon is collapsing hard.
pub const EXPANSION_RATE_EXIT_MAX: f64 = -2.0;
/// EMA whose break signals the trend structure has failed.
pub const KEY_EMA: &str = keys::EMA20;
/// Close must breach the key EMA by this much (percent) before the break
/// exit fires, so ordinary pullbacks that kiss the EMA do not flush trades.
pub const EMA_BREAK_BUFFER_PCT: f64 = 0.5;

/// Stochastic zone edges for the reversal exit.
const STOCH_OVERBOUGHT: f64 = 80.0;
const STOCH_OVERSOLD: f64 = 20.0;

/// Exit-side strategy parameters, immutable for the life of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitConfig {
    /// Take-profit distances from entry, percent, ascending.
    pub take_profit_levels: Vec<f64>,
    /// Fraction of the ORIGINAL position each tier closes, percent.
    /// Same length as `take_profit_levels`; sums to at most 100.
    pub take_profit_sizes: Vec<f64>,
    /// Fixed stop distance from entry, percent.
    pub stop_loss_pct: f64,
    /// Indicator key of an EMA used as an alternative stop level. The stop
    /// is placed at whichever of the two is tighter at entry.
    pub stop_ema: Option<String>,
    pub trailing_stop_enabled: bool,
    /// Indicator key of the EMA that trails the position once tier 2 fires.
    pub trailing_stop_ema: String,
    pub use_time_based_exit: bool,
    pub max_hold_candles: usize,
    pub use_stochastic_exit: bool,
    /// Minimum open profit (percent) before the stochastic exit may fire.
    pub stochastic_exit_min_profit: f64,
    pub use_bollinger_exit: bool,
    pub bollinger_exit_min_profit: f64,
    pub use_vwap_exit: bool,
    pub vwap_exit_min_profit: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        ExitConfig {
            take_profit_levels: vec![1.0, 2.0, 3.0],
            take_profit_sizes: vec![50.0, 30.0, 20.0],
            stop_loss_pct: 2.0,
            stop_ema: Some(keys::EMA20.to_string()),
            trailing_stop_enabled: true,
            trailing_stop_ema: keys::EMA9.to_string(),
            use_time_based_exit: true,
            max_hold_candles: 48,
            use_stochastic_exit: true,
            stochastic_exit_min_profit: 0.5,
            use_bollinger_exit: true,
            bollinger_exit_min_profit: 0.5,
            use_vwap_exit: false,
            vwap_exit_min_profit: 0.3,
        }
    }
}

/// Outcome of one [`ExitManager::check_exit`] call. "Nothing fired" is a
/// value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitDecision {
    Exit {
        tier: ExitTier,
        /// Fill price before slippage.
        price: f64,
        /// Percent of the ORIGINAL position to close.
        size_pct: f64,
        /// Gross percent return of this fill relative to entry.
        pnl_pct: f64,
        reason: String,
    },
    Hold {
        reason: String,
    },
}

impl ExitDecision {
    pub fn is_exit(&self) -> bool {
        matches!(self, ExitDecision::Exit { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ExitManager {
    config: ExitConfig,
}

impl ExitManager {
    /// Validates the parameter set once; a bad exit configuration must never
    /// survive into the replay loop.
    pub fn new(config: ExitConfig) -> Result<Self, TradesimError> {
        if config.take_profit_levels.len() != config.take_profit_sizes.len() {
            return Err(TradesimError::ConfigInvalid {
                section: "exit".to_string(),
                key: "take_profit_sizes".to_string(),
                reason: format!(
                    "{} sizes for {} levels",
                    config.take_profit_sizes.len(),
                    config.take_profit_levels.len()
                ),
            });
        }
        let size_sum: f64 = config.take_profit_sizes.iter().sum();
        if size_sum > 100.0 + SIZE_EPSILON {
            return Err(TradesimError::ConfigInvalid {
                section: "exit".to_string(),
                key: "take_profit_sizes".to_string(),
                reason: format!("sizes sum to {size_sum}, must be at most 100"),
            });
        }
        if config
            .take_profit_sizes
            .iter()
            .chain(config.take_profit_levels.iter())
            .any(|v| *v <= 0.0 || !v.is_finite())
        {
            return Err(TradesimError::ConfigInvalid {
                section: "exit".to_string(),
                key: "take_profit_levels".to_string(),
                reason: "levels and sizes must be positive".to_string(),
            });
        }
        if !config.stop_loss_pct.is_finite() || config.stop_loss_pct <= 0.0 {
            return Err(TradesimError::ConfigInvalid {
                section: "exit".to_string(),
                key: "stop_loss_pct".to_string(),
                reason: format!("{} is not a positive percentage", config.stop_loss_pct),
            });
        }
        if config.use_time_based_exit && config.max_hold_candles == 0 {
            return Err(TradesimError::ConfigInvalid {
                section: "exit".to_string(),
                key: "max_hold_candles".to_string(),
                reason: "must be at least 1 when the time exit is enabled".to_string(),
            });
        }
        Ok(ExitManager { config })
    }

    /// Computes the stop and take-profit levels for a trade entered at
    /// `entry_price` on `entry_bar`. The stop is the tighter of the fixed
    /// percentage stop and the configured EMA level when that EMA is present
    /// on the entry bar.
    pub fn exit_levels(&self, entry_price: f64, direction: Direction, entry_bar: &Bar) -> ExitLevels {
        let pct = self.config.stop_loss_pct / 100.0;
        let fixed_stop = match direction {
            Direction::Long => entry_price * (1.0 - pct),
            Direction::Short => entry_price * (1.0 + pct),
        };
        let stop_loss = match self
            .config
            .stop_ema
            .as_deref()
            .and_then(|key| entry_bar.indicator(key))
        {
            Some(ema) => match direction {
                Direction::Long => fixed_stop.min(ema),
                Direction::Short => fixed_stop.max(ema),
            },
            None => fixed_stop,
        };

        let targets = self
            .config
            .take_profit_levels
            .iter()
            .zip(self.config.take_profit_sizes.iter())
            .map(|(level, size)| {
                let price = match direction {
                    Direction::Long => entry_price * (1.0 + level / 100.0),
                    Direction::Short => entry_price * (1.0 - level / 100.0),
                };
                ProfitTarget {
                    price,
                    size_pct: *size,
                }
            })
            .collect();

        ExitLevels { stop_loss, targets }
    }

    /// Evaluates every exit rule against the current bar, in priority order,
    /// and returns the first fill or a structured hold. `prev` is the bar
    /// before `bar`, used by crossover rules; `bars_held` counts bars since
    /// entry.
    pub fn check_exit(
        &self,
        trade: &Trade,
        bar: &Bar,
        prev: Option<&Bar>,
        bars_held: usize,
    ) -> ExitDecision {
        if let Some(decision) = self.check_stop_loss(trade, bar) {
            return decision;
        }
        // Highest reachable tier wins the bar; a gap through several levels
        // fills only the top one and the rest stay armed for later bars.
        for tier_index in (0..trade.exit_levels.targets.len()).rev() {
            if let Some(decision) = self.check_take_profit(trade, bar, tier_index) {
                return decision;
            }
        }
        if let Some(decision) = self.check_trailing_stop(trade, bar) {
            return decision;
        }
        if let Some(decision) = self.check_compression_spike(trade, bar) {
            return decision;
        }
        if let Some(decision) = self.check_ema_break(trade, bar) {
            return decision;
        }
        if let Some(decision) = self.check_stochastic_reversal(trade, bar, prev) {
            return decision;
        }
        if let Some(decision) = self.check_bollinger_reversal(trade, bar) {
            return decision;
        }
        if let Some(decision) = self.check_vwap_cross(trade, bar) {
            return decision;
        }
        if let Some(decision) = self.check_time_limit(trade, bar, bars_held) {
            return decision;
        }
        ExitDecision::Hold {
            reason: "no exit rule fired".to_string(),
        }
    }

    fn full_exit(&self, trade: &Trade, tier: ExitTier, price: f64, reason: String) -> ExitDecision {
        ExitDecision::Exit {
            tier,
            price,
            size_pct: trade.remaining_size_pct,
            pnl_pct: trade.direction.pnl_pct(trade.entry_price, price),
            reason,
        }
    }

    fn open_profit_pct(&self, trade: &Trade, bar: &Bar) -> f64 {
        trade.direction.pnl_pct(trade.entry_price, bar.close)
    }

    fn check_stop_loss(&self, trade: &Trade, bar: &Bar) -> Option<ExitDecision> {
        let stop = trade.exit_levels.stop_loss;
        let touched = match trade.direction {
            Direction::Long => bar.low <= stop,
            Direction::Short => bar.high >= stop,
        };
        if !touched {
            return None;
        }
        Some(self.full_exit(
            trade,
            ExitTier::StopLoss,
            stop,
            format!("stop-loss touched at {stop:.4}"),
        ))
    }

    fn check_take_profit(&self, trade: &Trade, bar: &Bar, tier_index: usize) -> Option<ExitDecision> {
        let tier = match tier_index {
            0 => ExitTier::TakeProfit1,
            1 => ExitTier::TakeProfit2,
            _ => ExitTier::TakeProfit3,
        };
        if trade.has_taken(tier) {
            return None;
        }
        let target = &trade.exit_levels.targets[tier_index];
        let reached = match trade.direction {
            Direction::Long => bar.high >= target.price,
            Direction::Short => bar.low <= target.price,
        };
        if !reached {
            return None;
        }
        // A late tier can find less position left than it was allotted.
        let size_pct = target.size_pct.min(trade.remaining_size_pct);
        Some(ExitDecision::Exit {
            tier,
            price: target.price,
            size_pct,
            pnl_pct: trade.direction.pnl_pct(trade.entry_price, target.price),
            reason: format!("{} target {:.4} reached", tier.tag(), target.price),
        })
    }

    fn check_trailing_stop(&self, trade: &Trade, bar: &Bar) -> Option<ExitDecision> {
        if !self.config.trailing_stop_enabled || !trade.has_taken(ExitTier::TakeProfit2) {
            return None;
        }
        let level = bar.indicator(&self.config.trailing_stop_ema)?;
        let touched = match trade.direction {
            Direction::Long => bar.low <= level,
            Direction::Short => bar.high >= level,
        };
        if !touched {
            return None;
        }
        Some(self.full_exit(
            trade,
            ExitTier::TrailingStop,
            level,
            format!("trailing {} at {level:.4} touched", self.config.trailing_stop_ema),
        ))
    }

    /// Extreme squeeze plus a hard-negative expansion rate while the trade is
    /// in profit reads as the move exhausting.
    fn check_compression_spike(&self, trade: &Trade, bar: &Bar) -> Option<ExitDecision> {
        if self.open_profit_pct(trade, bar) <= 0.0 {
            return None;
        }
        let compression = bar.indicator(keys::COMPRESSION)?;
        let expansion_rate = bar.indicator(keys::EXPANSION_RATE)?;
        if compression < COMPRESSION_EXIT_MIN || expansion_rate > EXPANSION_RATE_EXIT_MAX {
            return None;
        }
        Some(self.full_exit(
            trade,
            ExitTier::CompressionSpike,
            bar.close,
            format!("compression {compression:.1} with expansion rate {expansion_rate:.1}"),
        ))
    }

    fn check_ema_break(&self, trade: &Trade, bar: &Bar) -> Option<ExitDecision> {
        let ema = bar.indicator(KEY_EMA)?;
        let buffer = EMA_BREAK_BUFFER_PCT / 100.0;
        let broken = match trade.direction {
            Direction::Long => bar.close < ema * (1.0 - buffer),
            Direction::Short => bar.close > ema * (1.0 + buffer),
        };
        if !broken {
            return None;
        }
        Some(self.full_exit(
            trade,
            ExitTier::EmaBreak,
            bar.close,
            format!("close broke {KEY_EMA} {ema:.4} beyond the buffer"),
        ))
    }

    fn check_stochastic_reversal(
        &self,
        trade: &Trade,
        bar: &Bar,
        prev: Option<&Bar>,
    ) -> Option<ExitDecision> {
        if !self.config.use_stochastic_exit
            || self.open_profit_pct(trade, bar) < self.config.stochastic_exit_min_profit
        {
            return None;
        }
        let prev = prev?;
        let k = bar.indicator(keys::STOCH_K)?;
        let d = bar.indicator(keys::STOCH_D)?;
        let prev_k = prev.indicator(keys::STOCH_K)?;
        let prev_d = prev.indicator(keys::STOCH_D)?;
        let reversal = match trade.direction {
            Direction::Long => k >= STOCH_OVERBOUGHT && prev_k >= prev_d && k < d,
            Direction::Short => k <= STOCH_OVERSOLD && prev_k <= prev_d && k > d,
        };
        if !reversal {
            return None;
        }
        Some(self.full_exit(
            trade,
            ExitTier::StochasticReversal,
            bar.close,
            format!("stochastic reversal with %K {k:.1}"),
        ))
    }

    fn check_bollinger_reversal(&self, trade: &Trade, bar: &Bar) -> Option<ExitDecision> {
        if !self.config.use_bollinger_exit
            || self.open_profit_pct(trade, bar) < self.config.bollinger_exit_min_profit
        {
            return None;
        }
        let touched = match trade.direction {
            Direction::Long => bar.close >= bar.indicator(keys::BB_UPPER)?,
            Direction::Short => bar.close <= bar.indicator(keys::BB_LOWER)?,
        };
        if !touched {
            return None;
        }
        Some(self.full_exit(
            trade,
            ExitTier::BollingerReversal,
            bar.close,
            "close at the opposite Bollinger band".to_string(),
        ))
    }

    fn check_vwap_cross(&self, trade: &Trade, bar: &Bar) -> Option<ExitDecision> {
        if !self.config.use_vwap_exit
            || self.open_profit_pct(trade, bar) < self.config.vwap_exit_min_profit
        {
            return None;
        }
        let vwap = bar.indicator(keys::VWAP)?;
        let crossed = match trade.direction {
            Direction::Long => bar.close < vwap,
            Direction::Short => bar.close > vwap,
        };
        if !crossed {
            return None;
        }
        Some(self.full_exit(
            trade,
            ExitTier::VwapCross,
            bar.close,
            format!("close crossed VWAP {vwap:.4}"),
        ))
    }

    fn check_time_limit(&self, trade: &Trade, bar: &Bar, bars_held: usize) -> Option<ExitDecision> {
        if !self.config.use_time_based_exit || bars_held < self.config.max_hold_candles {
            return None;
        }
        Some(self.full_exit(
            trade,
            ExitTier::TimeLimit,
            bar.close,
            format!("held {bars_held} bars, limit {}", self.config.max_hold_candles),
        ))
    }
}

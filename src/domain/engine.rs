//! Bar-by-bar replay engine.
//!
//! [`BacktestEngine`] owns the capital ledger, the open-trade set, and the
//! equity curve. It replays an enriched bar series single-threaded and in
//! order: for every bar it first resolves exits on existing positions, then
//! considers admitting one new entry, then records exactly one equity point.
//! Capital and the open-trade list are never touched outside this loop.

use chrono::{NaiveDate, NaiveDateTime};

use super::bar::Bar;
use super::entry::{EntryConfig, EntryDetector};
use super::error::TradesimError;
use super::exit::{ExitConfig, ExitDecision, ExitManager};
use super::signal::{Direction, EntrySignal};
use super::trade::{ExitTier, PartialExit, Trade};

/// Capital and fill-simulation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Per-trade notional as a fraction of INITIAL capital. Sizing never
    /// compounds off the running balance.
    pub position_size: f64,
    /// Commission per side, percent of notional.
    pub commission_pct: f64,
    /// Fill slippage, percent, always applied against the trader.
    pub slippage_pct: f64,
    pub max_concurrent_trades: usize,
    /// Daily circuit breaker: realized loss as a percent of initial capital.
    pub max_daily_loss_pct: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            initial_capital: 10_000.0,
            position_size: 0.1,
            commission_pct: 0.1,
            slippage_pct: 0.05,
            max_concurrent_trades: 3,
            max_daily_loss_pct: 3.0,
        }
    }
}

/// The full immutable parameter bundle for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationConfig {
    pub engine: EngineConfig,
    pub entry: EntryConfig,
    pub exit: ExitConfig,
}

/// One equity-curve sample; exactly one is recorded per processed bar.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    /// Cash ledger: locked notional is excluded until the position exits.
    pub capital: f64,
    pub open_trades: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    /// Closed-trade ledger in close order.
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_capital: f64,
}

/// Mutable replay state, local to one [`BacktestEngine::run`] call.
struct Ledger {
    capital: f64,
    open: Vec<Trade>,
    closed: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    current_day: Option<NaiveDate>,
    /// Net realized P&L accumulated since the last calendar-date change.
    daily_realized: f64,
}

pub struct BacktestEngine {
    config: EngineConfig,
    detector: EntryDetector,
    exits: ExitManager,
}

// The entry detector holds trait objects, so Debug cannot be derived.
impl std::fmt::Debug for BacktestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktestEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BacktestEngine {
    pub fn new(config: SimulationConfig) -> Result<Self, TradesimError> {
        Self::validate(&config.engine)?;
        let detector = EntryDetector::new(config.entry)?;
        let exits = ExitManager::new(config.exit)?;
        Ok(BacktestEngine {
            config: config.engine,
            detector,
            exits,
        })
    }

    /// Swaps in a fresh parameter bundle between runs; the same validation
    /// applies as at construction.
    pub fn reconfigure(&mut self, config: SimulationConfig) -> Result<(), TradesimError> {
        *self = Self::new(config)?;
        Ok(())
    }

    fn validate(config: &EngineConfig) -> Result<(), TradesimError> {
        let invalid = |key: &str, reason: String| TradesimError::ConfigInvalid {
            section: "backtest".to_string(),
            key: key.to_string(),
            reason,
        };
        if !config.initial_capital.is_finite() || config.initial_capital <= 0.0 {
            return Err(invalid(
                "initial_capital",
                format!("{} must be positive", config.initial_capital),
            ));
        }
        if !(config.position_size > 0.0 && config.position_size <= 1.0) {
            return Err(invalid(
                "position_size",
                format!("{} must lie in (0, 1]", config.position_size),
            ));
        }
        if config.commission_pct < 0.0 || config.slippage_pct < 0.0 {
            return Err(invalid(
                "commission_pct",
                "commission and slippage must not be negative".to_string(),
            ));
        }
        if config.max_concurrent_trades == 0 {
            return Err(invalid(
                "max_concurrent_trades",
                "at least one concurrent trade must be allowed".to_string(),
            ));
        }
        if !config.max_daily_loss_pct.is_finite() || config.max_daily_loss_pct <= 0.0 {
            return Err(invalid(
                "max_daily_loss_pct",
                format!("{} must be positive", config.max_daily_loss_pct),
            ));
        }
        Ok(())
    }

    /// Replays the series and returns the closed-trade ledger, the equity
    /// curve, and the final cash balance. Bars must be non-empty and in
    /// strictly increasing timestamp order.
    pub fn run(&self, bars: &[Bar]) -> Result<BacktestResult, TradesimError> {
        if bars.is_empty() {
            return Err(TradesimError::EmptyData);
        }
        for (index, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(TradesimError::UnorderedBars { index: index + 1 });
            }
        }

        let mut ledger = Ledger {
            capital: self.config.initial_capital,
            open: Vec::new(),
            closed: Vec::new(),
            equity_curve: Vec::with_capacity(bars.len()),
            current_day: None,
            daily_realized: 0.0,
        };

        for (index, bar) in bars.iter().enumerate() {
            let day = bar.timestamp.date();
            if ledger.current_day != Some(day) {
                ledger.current_day = Some(day);
                ledger.daily_realized = 0.0;
            }

            let prev = index.checked_sub(1).map(|i| &bars[i]);
            self.resolve_exits(&mut ledger, bar, prev, index);

            if self.can_enter_trade(&ledger) {
                if let Some(signal) = self
                    .detector
                    .detect(&bars[..=index])
                    .signal()
                    .cloned()
                {
                    self.enter_trade(&mut ledger, &signal, bar, index);
                }
            }

            ledger.equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                capital: ledger.capital,
                open_trades: ledger.open.len(),
            });
        }

        if let Some(last) = bars.last() {
            self.force_close_remaining(&mut ledger, last);
        }

        Ok(BacktestResult {
            trades: ledger.closed,
            equity_curve: ledger.equity_curve,
            final_capital: ledger.capital,
        })
    }

    /// Admission control: concurrency cap, the daily-loss circuit breaker,
    /// and a positive cash balance.
    fn can_enter_trade(&self, ledger: &Ledger) -> bool {
        let loss_limit = self.config.initial_capital * self.config.max_daily_loss_pct / 100.0;
        ledger.open.len() < self.config.max_concurrent_trades
            && ledger.daily_realized > -loss_limit
            && ledger.capital > 0.0
    }

    fn enter_trade(&self, ledger: &mut Ledger, signal: &EntrySignal, bar: &Bar, index: usize) {
        let slip = self.config.slippage_pct / 100.0;
        // Buys fill above the close, sells below it.
        let fill = match signal.direction {
            Direction::Long => bar.close * (1.0 + slip),
            Direction::Short => bar.close * (1.0 - slip),
        };
        let notional = self.config.initial_capital * self.config.position_size;
        let units = notional / fill;
        let commission = notional * self.config.commission_pct / 100.0;
        let levels = self.exits.exit_levels(fill, signal.direction, bar);

        // Notional and commission leave the ledger now; the notional stays
        // locked until the position exits.
        ledger.capital -= notional + commission;
        ledger.open.push(Trade::open(
            signal.direction,
            bar.timestamp,
            index,
            fill,
            units,
            notional,
            commission,
            levels,
        ));
    }

    fn resolve_exits(&self, ledger: &mut Ledger, bar: &Bar, prev: Option<&Bar>, index: usize) {
        for trade in &mut ledger.open {
            trade.update_excursions(bar);
            let bars_held = index - trade.entry_index;
            let decision = self.exits.check_exit(trade, bar, prev, bars_held);
            if let ExitDecision::Exit {
                tier,
                price,
                size_pct,
                ..
            } = decision
            {
                let (credit, realized) = self.apply_fill(trade, bar, tier, price, size_pct, false);
                ledger.capital += credit;
                ledger.daily_realized += realized;
            }
        }
        let mut slot = 0;
        while slot < ledger.open.len() {
            if ledger.open[slot].is_open() {
                slot += 1;
            } else {
                let trade = ledger.open.remove(slot);
                ledger.closed.push(trade);
            }
        }
    }

    /// Books one exit fill on the trade and returns `(credit, realized)`:
    /// the cash to credit (entry-basis notional fraction plus net P&L) and
    /// the net P&L alone, which the caller adds to the daily-loss tally.
    fn apply_fill(
        &self,
        trade: &mut Trade,
        bar: &Bar,
        tier: ExitTier,
        price: f64,
        size_pct: f64,
        forced: bool,
    ) -> (f64, f64) {
        let slip = self.config.slippage_pct / 100.0;
        // Exit fills slip the opposite way from entry; a forced settlement
        // at data end takes the close as-is.
        let fill = if forced {
            price
        } else {
            match trade.direction {
                Direction::Long => price * (1.0 - slip),
                Direction::Short => price * (1.0 + slip),
            }
        };
        let units = trade.position_size * size_pct / 100.0;
        let pnl_usd = match trade.direction {
            Direction::Long => (fill - trade.entry_price) * units,
            Direction::Short => (trade.entry_price - fill) * units,
        };
        let commission = fill * units * self.config.commission_pct / 100.0;

        trade.record_exit(
            PartialExit {
                exit_time: bar.timestamp,
                exit_type: tier,
                exit_price: fill,
                exit_size_pct: size_pct,
                pnl_usd,
                pnl_pct: trade.direction.pnl_pct(trade.entry_price, fill),
                commission,
            },
            forced,
        );
        let realized = pnl_usd - commission;

        (
            trade.position_size_usd * size_pct / 100.0 + realized,
            realized,
        )
    }

    /// Settles whatever is still open at the final close.
    fn force_close_remaining(&self, ledger: &mut Ledger, last: &Bar) {
        let mut remaining = std::mem::take(&mut ledger.open);
        for trade in &mut remaining {
            let size_pct = trade.remaining_size_pct;
            let (credit, realized) =
                self.apply_fill(trade, last, ExitTier::EndOfData, last.close, size_pct, true);
            ledger.capital += credit;
            ledger.daily_realized += realized;
        }
        ledger.closed.append(&mut remaining);
    }
}

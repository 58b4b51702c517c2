//! Trade lifecycle records.
//!
//! A trade is created by the engine when a signal passes admission control and
//! is then mutated once per bar (excursion update, possible partial exit)
//! until nothing of it remains or the data ends.

use chrono::NaiveDateTime;

use super::bar::Bar;
use super::signal::Direction;

/// Size tolerance for "the position is fully closed".
pub const SIZE_EPSILON: f64 = 1e-6;

/// One take-profit level: price target plus the fraction of the ORIGINAL
/// position it closes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitTarget {
    pub price: f64,
    pub size_pct: f64,
}

/// Exit levels computed once at entry and memoized on the trade.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitLevels {
    pub stop_loss: f64,
    /// Ordered tier 1..=3; checked highest-first each bar.
    pub targets: Vec<ProfitTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Closed,
    /// Still open when the data ended; settled at the final close.
    ForcedClosed,
}

/// Tag identifying which exit rule fired. Each tag is consumable at most once
/// per trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTier {
    StopLoss,
    TakeProfit1,
    TakeProfit2,
    TakeProfit3,
    TrailingStop,
    CompressionSpike,
    EmaBreak,
    StochasticReversal,
    BollingerReversal,
    VwapCross,
    TimeLimit,
    EndOfData,
}

impl ExitTier {
    pub fn tag(&self) -> &'static str {
        match self {
            ExitTier::StopLoss => "stop_loss",
            ExitTier::TakeProfit1 => "tp1",
            ExitTier::TakeProfit2 => "tp2",
            ExitTier::TakeProfit3 => "tp3",
            ExitTier::TrailingStop => "trailing_stop",
            ExitTier::CompressionSpike => "compression_spike",
            ExitTier::EmaBreak => "ema_break",
            ExitTier::StochasticReversal => "stochastic_reversal",
            ExitTier::BollingerReversal => "bollinger_reversal",
            ExitTier::VwapCross => "vwap_cross",
            ExitTier::TimeLimit => "time_limit",
            ExitTier::EndOfData => "end_of_data",
        }
    }

    /// Take-profit tiers close a fixed fraction of the original position;
    /// everything else consumes whatever remains.
    pub fn is_take_profit(&self) -> bool {
        matches!(
            self,
            ExitTier::TakeProfit1 | ExitTier::TakeProfit2 | ExitTier::TakeProfit3
        )
    }
}

/// One realized exit fill.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialExit {
    pub exit_time: NaiveDateTime,
    pub exit_type: ExitTier,
    pub exit_price: f64,
    /// Percent of the ORIGINAL position closed by this fill.
    pub exit_size_pct: f64,
    /// Gross price P&L in dollars for the exited fraction.
    pub pnl_usd: f64,
    pub pnl_pct: f64,
    pub commission: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    /// Index of the entry bar within the replayed series; bars-held counts
    /// from here.
    pub entry_index: usize,
    pub entry_price: f64,
    /// Position size in units.
    pub position_size: f64,
    /// Entry notional in dollars.
    pub position_size_usd: f64,
    pub entry_commission: f64,
    /// 0-100; decremented by each partial exit.
    pub remaining_size_pct: f64,
    pub exit_levels: ExitLevels,
    pub exits_taken: Vec<ExitTier>,
    pub partial_exits: Vec<PartialExit>,
    /// Maximum favorable excursion, percent, from intrabar extremes. >= 0.
    pub mfe: f64,
    /// Maximum adverse excursion, percent, from intrabar extremes. <= 0.
    pub mae: f64,
    pub status: TradeStatus,
}

impl Trade {
    pub fn open(
        direction: Direction,
        entry_time: NaiveDateTime,
        entry_index: usize,
        entry_price: f64,
        position_size: f64,
        position_size_usd: f64,
        entry_commission: f64,
        exit_levels: ExitLevels,
    ) -> Self {
        Trade {
            direction,
            entry_time,
            entry_index,
            entry_price,
            position_size,
            position_size_usd,
            entry_commission,
            remaining_size_pct: 100.0,
            exit_levels,
            exits_taken: Vec::new(),
            partial_exits: Vec::new(),
            mfe: 0.0,
            mae: 0.0,
            status: TradeStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, TradeStatus::Open)
    }

    pub fn has_taken(&self, tier: ExitTier) -> bool {
        self.exits_taken.contains(&tier)
    }

    /// Updates MFE/MAE from the bar's intrabar extremes.
    pub fn update_excursions(&mut self, bar: &Bar) {
        let (favorable, adverse) = match self.direction {
            Direction::Long => (bar.high, bar.low),
            Direction::Short => (bar.low, bar.high),
        };
        let fav_pct = self.direction.pnl_pct(self.entry_price, favorable);
        let adv_pct = self.direction.pnl_pct(self.entry_price, adverse);
        if fav_pct > self.mfe {
            self.mfe = fav_pct;
        }
        if adv_pct < self.mae {
            self.mae = adv_pct;
        }
    }

    /// Records a fill, consumes its tier tag, and closes the trade when
    /// nothing remains.
    pub fn record_exit(&mut self, exit: PartialExit, forced: bool) {
        self.remaining_size_pct = (self.remaining_size_pct - exit.exit_size_pct).max(0.0);
        self.exits_taken.push(exit.exit_type);
        self.partial_exits.push(exit);
        if self.remaining_size_pct <= SIZE_EPSILON {
            self.remaining_size_pct = 0.0;
            self.status = if forced {
                TradeStatus::ForcedClosed
            } else {
                TradeStatus::Closed
            };
        }
    }

    /// Timestamp of the final fill, if the trade has closed.
    pub fn exit_time(&self) -> Option<NaiveDateTime> {
        if self.is_open() {
            None
        } else {
            self.partial_exits.last().map(|e| e.exit_time)
        }
    }

    /// Net realized P&L in dollars: gross fills minus all commissions.
    pub fn net_pnl_usd(&self) -> f64 {
        let gross: f64 = self.partial_exits.iter().map(|e| e.pnl_usd).sum();
        let exit_fees: f64 = self.partial_exits.iter().map(|e| e.commission).sum();
        gross - exit_fees - self.entry_commission
    }

    /// Realized percent return on the full original position: each fill's
    /// percent weighted by the fraction it closed.
    pub fn realized_pnl_pct(&self) -> f64 {
        self.partial_exits
            .iter()
            .map(|e| e.pnl_pct * e.exit_size_pct / 100.0)
            .sum()
    }
}

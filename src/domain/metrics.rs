//! Performance metrics over closed-trade ledgers.
//!
//! Everything here is a pure function of the ledger: aggregate statistics,
//! side-by-side gap analysis of two strategy variants, and entry/exit
//! quality diagnostics. Degenerate inputs (no trades, no losers) produce
//! sentinels, never errors.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;

use super::trade::Trade;

/// Aggregate statistics for one trade population.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeStats {
    pub count: usize,
    /// Net of all commissions.
    pub total_pnl_usd: f64,
    pub avg_pnl_usd: f64,
    /// Percent of trades with positive net P&L.
    pub win_rate: f64,
    /// Gross profit over gross loss; +inf when nothing lost and something
    /// won, 0.0 when nothing won.
    pub profit_factor: f64,
    pub avg_holding_minutes: f64,
    pub max_win_usd: f64,
    pub max_loss_usd: f64,
    pub avg_mfe: f64,
    pub avg_mae: f64,
}

impl TradeStats {
    pub fn compute(trades: &[Trade]) -> Self {
        if trades.is_empty() {
            return TradeStats {
                count: 0,
                total_pnl_usd: 0.0,
                avg_pnl_usd: 0.0,
                win_rate: 0.0,
                profit_factor: 0.0,
                avg_holding_minutes: 0.0,
                max_win_usd: 0.0,
                max_loss_usd: 0.0,
                avg_mfe: 0.0,
                avg_mae: 0.0,
            };
        }

        let count = trades.len();
        let pnls: Vec<f64> = trades.iter().map(Trade::net_pnl_usd).collect();
        let total_pnl_usd: f64 = pnls.iter().sum();
        let wins = pnls.iter().filter(|p| **p > 0.0).count();
        let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
        let gross_loss: f64 = -pnls.iter().filter(|p| **p < 0.0).sum::<f64>();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let holds: Vec<f64> = trades
            .iter()
            .filter_map(|t| t.exit_time().map(|exit| (exit - t.entry_time).num_minutes() as f64))
            .collect();
        let avg_holding_minutes = if holds.is_empty() {
            0.0
        } else {
            holds.iter().sum::<f64>() / holds.len() as f64
        };

        TradeStats {
            count,
            total_pnl_usd,
            avg_pnl_usd: total_pnl_usd / count as f64,
            win_rate: wins as f64 / count as f64 * 100.0,
            profit_factor,
            avg_holding_minutes,
            max_win_usd: pnls.iter().copied().fold(0.0, f64::max),
            max_loss_usd: pnls.iter().copied().fold(0.0, f64::min),
            avg_mfe: trades.iter().map(|t| t.mfe).sum::<f64>() / count as f64,
            avg_mae: trades.iter().map(|t| t.mae).sum::<f64>() / count as f64,
        }
    }
}

/// Bucketed reading of a gap report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapInterpretation {
    /// The worse variant trades far more often for less.
    OverTrading,
    /// The worse variant passes on most of what the better one takes.
    UnderTrading,
    /// Similar activity but most of the P&L goes uncaptured.
    LowCapture,
    GoodAlignment,
}

impl fmt::Display for GapInterpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GapInterpretation::OverTrading => {
                "over-trading: far more trades without matching profit"
            }
            GapInterpretation::UnderTrading => {
                "under-trading: most opportunities are being passed up"
            }
            GapInterpretation::LowCapture => {
                "low capture: similar activity but most of the profit is left behind"
            }
            GapInterpretation::GoodAlignment => "good alignment between the two variants",
        };
        f.write_str(text)
    }
}

/// How much of the better variant's performance the worse one realizes.
#[derive(Debug, Clone, PartialEq)]
pub struct GapReport {
    pub trade_count_gap: i64,
    pub pnl_gap_usd: f64,
    pub win_rate_gap: f64,
    /// `worse.total / better.total * 100`; 0 when the better side made
    /// nothing to capture.
    pub capture_rate: f64,
    /// Per-trade efficiency: `worse.avg / better.avg * 100`.
    pub efficiency: f64,
    pub interpretation: GapInterpretation,
}

pub fn calculate_gap(better: &TradeStats, worse: &TradeStats) -> GapReport {
    let capture_rate = if better.total_pnl_usd > 0.0 {
        worse.total_pnl_usd / better.total_pnl_usd * 100.0
    } else {
        0.0
    };
    let efficiency = if better.avg_pnl_usd.abs() > f64::EPSILON {
        worse.avg_pnl_usd / better.avg_pnl_usd * 100.0
    } else {
        0.0
    };

    let interpretation = if worse.count as f64 > better.count as f64 * 1.5 {
        GapInterpretation::OverTrading
    } else if (worse.count as f64) < better.count as f64 / 2.0 {
        GapInterpretation::UnderTrading
    } else if capture_rate < 50.0 {
        GapInterpretation::LowCapture
    } else {
        GapInterpretation::GoodAlignment
    };

    GapReport {
        trade_count_gap: worse.count as i64 - better.count as i64,
        pnl_gap_usd: worse.total_pnl_usd - better.total_pnl_usd,
        win_rate_gap: worse.win_rate - better.win_rate,
        capture_rate,
        efficiency,
        interpretation,
    }
}

/// Exact entry-timestamp overlap between two populations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryTimingReport {
    /// Entries taken by both variants at the same bar.
    pub matched: Vec<NaiveDateTime>,
    /// Entries only the better variant took.
    pub missed: Vec<NaiveDateTime>,
    /// Entries only the worse variant took.
    pub false_positives: Vec<NaiveDateTime>,
}

pub fn compare_entry_timing(better: &[Trade], worse: &[Trade]) -> EntryTimingReport {
    let better_times: BTreeSet<NaiveDateTime> = better.iter().map(|t| t.entry_time).collect();
    let worse_times: BTreeSet<NaiveDateTime> = worse.iter().map(|t| t.entry_time).collect();
    EntryTimingReport {
        matched: better_times.intersection(&worse_times).copied().collect(),
        missed: better_times.difference(&worse_times).copied().collect(),
        false_positives: worse_times.difference(&better_times).copied().collect(),
    }
}

/// Capture ratio at which an exit counts as premature.
pub const EARLY_EXIT_RATIO: f64 = 0.8;
/// Capture ratio at which an exit counts as near-perfect.
pub const NEAR_PERFECT_RATIO: f64 = 0.95;

/// Distribution of realized P&L against the best the trade ever offered.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitQualityReport {
    /// realized % / MFE %, one per trade with a positive MFE.
    pub capture_ratios: Vec<f64>,
    pub avg_capture: f64,
    pub early_exits: usize,
    pub near_perfect: usize,
}

pub fn compare_exit_quality(trades: &[Trade]) -> ExitQualityReport {
    let capture_ratios: Vec<f64> = trades
        .iter()
        .filter(|t| t.mfe > 0.0)
        .map(|t| t.realized_pnl_pct() / t.mfe)
        .collect();
    let avg_capture = if capture_ratios.is_empty() {
        0.0
    } else {
        capture_ratios.iter().sum::<f64>() / capture_ratios.len() as f64
    };
    ExitQualityReport {
        early_exits: capture_ratios.iter().filter(|r| **r < EARLY_EXIT_RATIO).count(),
        near_perfect: capture_ratios
            .iter()
            .filter(|r| **r >= NEAR_PERFECT_RATIO)
            .count(),
        capture_ratios,
        avg_capture,
    }
}

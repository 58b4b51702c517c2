//! Plain-text report adapter.
//!
//! Renders a completed run into a human-readable text file: the aggregate
//! statistics first, then one line per closed trade with its partial fills.

use std::fmt::Write as _;
use std::fs;

use crate::domain::engine::BacktestResult;
use crate::domain::error::TradesimError;
use crate::domain::metrics::TradeStats;
use crate::domain::trade::Trade;
use crate::ports::report_port::ReportPort;

#[derive(Default)]
pub struct TextReportAdapter;

impl TextReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Builds the report body; separated from the file write so it can be
/// inspected directly.
pub fn render(result: &BacktestResult, stats: &TradeStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "backtest report");
    let _ = writeln!(out, "===============");
    let _ = writeln!(out, "trades:            {}", stats.count);
    let _ = writeln!(out, "final capital:     {:.2}", result.final_capital);
    let _ = writeln!(out, "total p&l:         {:.2}", stats.total_pnl_usd);
    let _ = writeln!(out, "average p&l:       {:.2}", stats.avg_pnl_usd);
    let _ = writeln!(out, "win rate:          {:.1}%", stats.win_rate);
    if stats.profit_factor.is_infinite() {
        let _ = writeln!(out, "profit factor:     inf");
    } else {
        let _ = writeln!(out, "profit factor:     {:.2}", stats.profit_factor);
    }
    let _ = writeln!(out, "avg holding:       {:.0} min", stats.avg_holding_minutes);
    let _ = writeln!(out, "max win / loss:    {:.2} / {:.2}", stats.max_win_usd, stats.max_loss_usd);
    let _ = writeln!(out, "avg mfe / mae:     {:.2}% / {:.2}%", stats.avg_mfe, stats.avg_mae);
    let _ = writeln!(out);
    let _ = writeln!(out, "trade ledger");
    let _ = writeln!(out, "------------");
    for (index, trade) in result.trades.iter().enumerate() {
        let _ = writeln!(out, "{}", render_trade(index + 1, trade));
    }
    out
}

fn render_trade(number: usize, trade: &Trade) -> String {
    let mut line = format!(
        "#{number} {:?} {} @ {:.4} net {:+.2}",
        trade.direction,
        trade.entry_time,
        trade.entry_price,
        trade.net_pnl_usd(),
    );
    for exit in &trade.partial_exits {
        let _ = write!(
            line,
            " | {} {:.0}% @ {:.4}",
            exit.exit_type.tag(),
            exit.exit_size_pct,
            exit.exit_price
        );
    }
    line
}

impl ReportPort for TextReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        stats: &TradeStats,
        output_path: &str,
    ) -> Result<(), TradesimError> {
        fs::write(output_path, render(result, stats))?;
        Ok(())
    }
}

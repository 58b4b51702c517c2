//! Report generation port trait.

use crate::domain::engine::BacktestResult;
use crate::domain::error::TradesimError;
use crate::domain::metrics::TradeStats;

/// Port for writing a completed run's report.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        stats: &TradeStats,
        output_path: &str,
    ) -> Result<(), TradesimError>;
}

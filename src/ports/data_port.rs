//! Bar data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::TradesimError;

/// Source of enriched bar series. `source` names whatever the adapter reads
/// from, typically a file path.
pub trait DataPort {
    fn fetch_bars(&self, source: &str) -> Result<Vec<Bar>, TradesimError>;
}

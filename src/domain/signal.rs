//! Entry signal types.
//!
//! "No signal" is the common case in a replay, so it is modeled as a value
//! with a reason, not an error.

/// Side of a prospective trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn is_long(&self) -> bool {
        matches!(self, Direction::Long)
    }

    /// Signed P&L percent for a move from `entry` to `price` on this side.
    pub fn pnl_pct(&self, entry: f64, price: f64) -> f64 {
        let raw = (price - entry) / entry * 100.0;
        match self {
            Direction::Long => raw,
            Direction::Short => -raw,
        }
    }
}

/// An accepted entry signal.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub direction: Direction,
    pub confidence: f64,
    /// 0-100 composite quality score; the admission threshold applies to this.
    pub quality_score: f64,
    pub filters_passed: Vec<&'static str>,
    pub reason: String,
}

/// Outcome of running the entry detector on one bar window.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Signal(EntrySignal),
    NoSignal { reason: String },
}

impl Detection {
    pub fn none(reason: impl Into<String>) -> Self {
        Detection::NoSignal {
            reason: reason.into(),
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, Detection::Signal(_))
    }

    pub fn signal(&self) -> Option<&EntrySignal> {
        match self {
            Detection::Signal(s) => Some(s),
            Detection::NoSignal { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pnl_pct_long() {
        assert!((Direction::Long.pnl_pct(100.0, 103.0) - 3.0).abs() < 1e-9);
        assert!((Direction::Long.pnl_pct(100.0, 98.0) - (-2.0)).abs() < 1e-9);
    }

    #[test]
    fn pnl_pct_short() {
        assert!((Direction::Short.pnl_pct(100.0, 98.0) - 2.0).abs() < 1e-9);
        assert!((Direction::Short.pnl_pct(100.0, 103.0) - (-3.0)).abs() < 1e-9);
    }

    #[test]
    fn detection_accessors() {
        let none = Detection::none("not enough history");
        assert!(!none.is_signal());
        assert!(none.signal().is_none());

        let sig = Detection::Signal(EntrySignal {
            direction: Direction::Long,
            confidence: 0.7,
            quality_score: 80.0,
            filters_passed: vec!["gap_floor"],
            reason: "long confluence".into(),
        });
        assert!(sig.is_signal());
        assert_eq!(sig.signal().unwrap().direction, Direction::Long);
    }
}

//! Domain error types.
//!
//! Only true failures live here: malformed configuration and broken input
//! data, both raised before or at the start of a replay. "No signal" and
//! "no exit" are ordinary values ([`crate::domain::signal::Detection`],
//! [`crate::domain::exit::ExitDecision`]), never errors.

/// Top-level error type for tradesim.
#[derive(Debug, thiserror::Error)]
pub enum TradesimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("bar series is empty: a replay requires at least one bar")]
    EmptyData,

    #[error("missing required bar field: {field}")]
    MissingField { field: String },

    #[error("malformed bar row {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("bars out of order at index {index}: timestamps must be strictly increasing")]
    UnorderedBars { index: usize },

    #[error("insufficient history: have {bars} bars, need {minimum}")]
    InsufficientHistory { bars: usize, minimum: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TradesimError> for std::process::ExitCode {
    fn from(err: &TradesimError) -> Self {
        let code: u8 = match err {
            TradesimError::Io(_) => 1,
            TradesimError::ConfigParse { .. }
            | TradesimError::ConfigMissing { .. }
            | TradesimError::ConfigInvalid { .. } => 2,
            TradesimError::EmptyData
            | TradesimError::MissingField { .. }
            | TradesimError::MalformedRow { .. }
            | TradesimError::UnorderedBars { .. }
            | TradesimError::InsufficientHistory { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_names_the_field() {
        let err = TradesimError::ConfigInvalid {
            section: "exit".into(),
            key: "take_profit_sizes".into(),
            reason: "must match take_profit_levels in length".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("[exit] take_profit_sizes"));
        assert!(msg.contains("length"));
    }

    #[test]
    fn unordered_bars_names_the_index() {
        let err = TradesimError::UnorderedBars { index: 17 };
        assert!(err.to_string().contains("index 17"));
    }

    #[test]
    fn exit_code_classes_exist() {
        use std::process::ExitCode;
        let config = TradesimError::ConfigMissing {
            section: "backtest".into(),
            key: "initial_capital".into(),
        };
        let data = TradesimError::EmptyData;
        let _: ExitCode = (&config).into();
        let _: ExitCode = (&data).into();
    }
}

//! Builds a [`SimulationConfig`] from a [`ConfigPort`].
//!
//! Loading is lenient about absent keys (the compiled-in defaults apply) and
//! strict about malformed ones: a value that is present but unparseable is a
//! hard error naming the exact section and key. Range validation happens in
//! the constructors downstream.

use crate::domain::bar::VolumeClass;
use crate::domain::engine::{EngineConfig, SimulationConfig};
use crate::domain::entry::EntryConfig;
use crate::domain::error::TradesimError;
use crate::domain::exit::ExitConfig;
use crate::ports::config_port::ConfigPort;

pub fn load_simulation_config(config: &dyn ConfigPort) -> Result<SimulationConfig, TradesimError> {
    Ok(SimulationConfig {
        engine: load_engine_config(config)?,
        entry: load_entry_config(config)?,
        exit: load_exit_config(config)?,
    })
}

/// The bar series the run replays; the one key without a default.
pub fn data_file(config: &dyn ConfigPort) -> Result<String, TradesimError> {
    config
        .get_string("backtest", "data_file")
        .ok_or_else(|| TradesimError::ConfigMissing {
            section: "backtest".to_string(),
            key: "data_file".to_string(),
        })
}

pub fn load_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, TradesimError> {
    let defaults = EngineConfig::default();
    Ok(EngineConfig {
        initial_capital: config.get_double("backtest", "initial_capital", defaults.initial_capital),
        position_size: config.get_double("backtest", "position_size", defaults.position_size),
        commission_pct: config.get_double("backtest", "commission_pct", defaults.commission_pct),
        slippage_pct: config.get_double("backtest", "slippage_pct", defaults.slippage_pct),
        max_concurrent_trades: get_count(
            config,
            "backtest",
            "max_concurrent_trades",
            defaults.max_concurrent_trades,
        )?,
        max_daily_loss_pct: config.get_double(
            "backtest",
            "max_daily_loss_pct",
            defaults.max_daily_loss_pct,
        ),
    })
}

pub fn load_entry_config(config: &dyn ConfigPort) -> Result<EntryConfig, TradesimError> {
    let defaults = EntryConfig::default();
    let volume_requirement = match config.get_string("entry", "volume_requirement") {
        Some(raw) => parse_volume_classes("entry", "volume_requirement", &raw)?,
        None => defaults.volume_requirement,
    };
    Ok(EntryConfig {
        confluence_gap_min: config.get_double(
            "entry",
            "confluence_gap_min",
            defaults.confluence_gap_min,
        ),
        confluence_score_min: config.get_double(
            "entry",
            "confluence_score_min",
            defaults.confluence_score_min,
        ),
        rsi_min: config.get_double("entry", "rsi_min", defaults.rsi_min),
        rsi_max: config.get_double("entry", "rsi_max", defaults.rsi_max),
        volume_requirement,
        require_ema_alignment: config.get_bool(
            "entry",
            "require_ema_alignment",
            defaults.require_ema_alignment,
        ),
        require_macd_confirmation: config.get_bool(
            "entry",
            "require_macd_confirmation",
            defaults.require_macd_confirmation,
        ),
        min_price_above_ema20: config.get_double(
            "entry",
            "min_price_above_ema20",
            defaults.min_price_above_ema20,
        ),
        min_compression: get_optional_double(config, "entry", "min_compression")?,
        use_stochastic: config.get_bool("entry", "use_stochastic", defaults.use_stochastic),
        use_bollinger: config.get_bool("entry", "use_bollinger", defaults.use_bollinger),
        use_vwap: config.get_bool("entry", "use_vwap", defaults.use_vwap),
        require_ribbon_flip: config.get_bool(
            "entry",
            "require_ribbon_flip",
            defaults.require_ribbon_flip,
        ),
        min_ribbon_alignment: get_optional_double(config, "entry", "min_ribbon_alignment")?,
        min_quality_score: config.get_double(
            "entry",
            "min_quality_score",
            defaults.min_quality_score,
        ),
    })
}

pub fn load_exit_config(config: &dyn ConfigPort) -> Result<ExitConfig, TradesimError> {
    let defaults = ExitConfig::default();
    let take_profit_levels = match config.get_string("exit", "take_profit_levels") {
        Some(raw) => parse_f64_list("exit", "take_profit_levels", &raw)?,
        None => defaults.take_profit_levels,
    };
    let take_profit_sizes = match config.get_string("exit", "take_profit_sizes") {
        Some(raw) => parse_f64_list("exit", "take_profit_sizes", &raw)?,
        None => defaults.take_profit_sizes,
    };
    // "none" switches the EMA stop off; an absent key keeps the default.
    let stop_ema = match config.get_string("exit", "stop_ema") {
        Some(raw) if raw.eq_ignore_ascii_case("none") => None,
        Some(raw) => Some(raw),
        None => defaults.stop_ema,
    };
    Ok(ExitConfig {
        take_profit_levels,
        take_profit_sizes,
        stop_loss_pct: config.get_double("exit", "stop_loss_pct", defaults.stop_loss_pct),
        stop_ema,
        trailing_stop_enabled: config.get_bool(
            "exit",
            "trailing_stop_enabled",
            defaults.trailing_stop_enabled,
        ),
        trailing_stop_ema: config
            .get_string("exit", "trailing_stop_ema")
            .unwrap_or(defaults.trailing_stop_ema),
        use_time_based_exit: config.get_bool(
            "exit",
            "use_time_based_exit",
            defaults.use_time_based_exit,
        ),
        max_hold_candles: get_count(config, "exit", "max_hold_candles", defaults.max_hold_candles)?,
        use_stochastic_exit: config.get_bool(
            "exit",
            "use_stochastic_exit",
            defaults.use_stochastic_exit,
        ),
        stochastic_exit_min_profit: config.get_double(
            "exit",
            "stochastic_exit_min_profit",
            defaults.stochastic_exit_min_profit,
        ),
        use_bollinger_exit: config.get_bool(
            "exit",
            "use_bollinger_exit",
            defaults.use_bollinger_exit,
        ),
        bollinger_exit_min_profit: config.get_double(
            "exit",
            "bollinger_exit_min_profit",
            defaults.bollinger_exit_min_profit,
        ),
        use_vwap_exit: config.get_bool("exit", "use_vwap_exit", defaults.use_vwap_exit),
        vwap_exit_min_profit: config.get_double(
            "exit",
            "vwap_exit_min_profit",
            defaults.vwap_exit_min_profit,
        ),
    })
}

fn invalid(section: &str, key: &str, reason: String) -> TradesimError {
    TradesimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

/// Non-negative integer with a default; negative values are rejected rather
/// than wrapped.
fn get_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TradesimError> {
    let raw = config.get_int(section, key, default as i64);
    usize::try_from(raw).map_err(|_| invalid(section, key, format!("{raw} must not be negative")))
}

fn get_optional_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, TradesimError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("{raw} is not a number"))),
    }
}

fn parse_f64_list(section: &str, key: &str, raw: &str) -> Result<Vec<f64>, TradesimError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>()
                .map_err(|_| invalid(section, key, format!("{part} is not a number")))
        })
        .collect()
}

fn parse_volume_classes(
    section: &str,
    key: &str,
    raw: &str,
) -> Result<Vec<VolumeClass>, TradesimError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            VolumeClass::parse(part)
                .ok_or_else(|| invalid(section, key, format!("unknown volume class {part}")))
        })
        .collect()
}

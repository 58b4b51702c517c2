//! End-to-end tests across the adapters and the replay engine.
//!
//! Covers:
//! - CSV file to report pipeline with a tiered take-profit round trip
//! - short stop-out through the mock data port
//! - detector scan over a bar file
//! - configuration errors surfacing before any replay
//! - ledger conservation and excursion-bound invariants under random walks

mod common;

use common::*;
use tradesim::adapters::csv_adapter::CsvDataAdapter;
use tradesim::adapters::file_config_adapter::FileConfigAdapter;
use tradesim::adapters::text_report_adapter::render;
use tradesim::domain::config_load::{load_entry_config, load_simulation_config};
use tradesim::domain::engine::BacktestEngine;
use tradesim::domain::entry::EntryDetector;
use tradesim::domain::error::TradesimError;
use tradesim::domain::exit::ExitConfig;
use tradesim::domain::metrics::TradeStats;
use tradesim::domain::signal::Direction;
use tradesim::domain::trade::{ExitTier, TradeStatus};
use tradesim::ports::data_port::DataPort;

use std::io::Write;
use tempfile::NamedTempFile;

const FRICTIONLESS_INI: &str = r#"
[backtest]
initial_capital = 10000
position_size = 0.1
commission_pct = 0
slippage_pct = 0
max_concurrent_trades = 1
max_daily_loss_pct = 3

[entry]
rsi_min = 1
rsi_max = 99
volume_requirement = spike, elevated, normal, low
require_ema_alignment = false
use_stochastic = false
use_bollinger = false
min_quality_score = 0

[exit]
take_profit_levels = 1,2,3
take_profit_sizes = 50,30,20
stop_loss_pct = 2
stop_ema = none
trailing_stop_enabled = false
use_time_based_exit = false
use_stochastic_exit = false
use_bollinger_exit = false
use_vwap_exit = false
"#;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{content}").unwrap();
    file
}

mod full_pipeline {
    use super::*;

    #[test]
    fn csv_to_report_with_tiered_exits() {
        // Entry at 100, then bars tagging the three profit targets.
        let mut bars = warmup(4);
        bars.push(signal_bar(4, 20, 100.0, Direction::Long));
        for (minute, close) in [(21, 101.0), (22, 102.0), (23, 103.0)] {
            bars.push(quiet_bar(4, minute, close));
        }
        let data_file = write_temp(&bars_to_csv(&bars));

        let config = FileConfigAdapter::from_string(FRICTIONLESS_INI).unwrap();
        let sim = load_simulation_config(&config).unwrap();
        let engine = BacktestEngine::new(sim).unwrap();

        let loaded = CsvDataAdapter::new()
            .fetch_bars(&data_file.path().display().to_string())
            .unwrap();
        assert_eq!(loaded.len(), bars.len());

        let result = engine.run(&loaded).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.partial_exits.len(), 3);
        assert_eq!(trade.partial_exits[0].exit_type, ExitTier::TakeProfit1);
        assert_eq!(trade.partial_exits[1].exit_type, ExitTier::TakeProfit2);
        assert_eq!(trade.partial_exits[2].exit_type, ExitTier::TakeProfit3);
        approx::assert_relative_eq!(trade.realized_pnl_pct(), 1.7, max_relative = 1e-9);
        approx::assert_relative_eq!(result.final_capital, 10_017.0, max_relative = 1e-9);
        assert_eq!(result.equity_curve.len(), loaded.len());

        let report = render(&result, &TradeStats::compute(&result.trades));
        assert!(report.contains("trades:            1"));
        assert!(report.contains("tp3"));
    }

    #[test]
    fn short_stop_out_through_mock_port() {
        let mut bars = warmup(4);
        bars.push(signal_bar(4, 20, 100.0, Direction::Short));
        let mut spike = quiet_bar(4, 21, 102.2);
        spike.high = 102.5;
        spike.low = 101.5;
        bars.push(spike);
        let port = MockDataPort::new().with_bars("bars.csv", bars);

        let engine = BacktestEngine::new(frictionless_sim(1)).unwrap();
        let loaded = port.fetch_bars("bars.csv").unwrap();
        let result = engine.run(&loaded).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.direction, Direction::Short);
        assert_eq!(trade.partial_exits[0].exit_type, ExitTier::StopLoss);
        approx::assert_relative_eq!(trade.realized_pnl_pct(), -2.0, max_relative = 1e-9);
        approx::assert_relative_eq!(result.final_capital, 9_980.0, max_relative = 1e-9);
    }

    #[test]
    fn mock_port_misses_are_errors() {
        let port = MockDataPort::new();
        assert!(matches!(
            port.fetch_bars("unknown.csv"),
            Err(TradesimError::EmptyData)
        ));
    }
}

mod scan_pipeline {
    use super::*;

    #[test]
    fn scan_lists_signal_bars_from_a_file() {
        let mut bars = warmup(4);
        bars.push(signal_bar(4, 20, 100.0, Direction::Long));
        bars.push(quiet_bar(4, 21, 100.1));
        bars.push(signal_bar(4, 22, 100.2, Direction::Long));
        let data_file = write_temp(&bars_to_csv(&bars));

        let config = FileConfigAdapter::from_string(FRICTIONLESS_INI).unwrap();
        let detector = EntryDetector::new(load_entry_config(&config).unwrap()).unwrap();

        let loaded = CsvDataAdapter::new()
            .fetch_bars(&data_file.path().display().to_string())
            .unwrap();
        let rows = detector.scan(&loaded);
        // One row per bar once history is sufficient: bars 19..22.
        assert_eq!(rows.len(), 4);
        let signals: Vec<_> = rows.iter().filter(|r| r.detection.is_signal()).collect();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].timestamp, ts(4, 20));
        assert_eq!(signals[1].timestamp, ts(4, 22));
    }
}

mod config_failures {
    use super::*;

    #[test]
    fn mismatched_tier_lists_fail_before_replay() {
        let ini = FRICTIONLESS_INI.replace(
            "take_profit_sizes = 50,30,20",
            "take_profit_sizes = 50,50",
        );
        let config = FileConfigAdapter::from_string(&ini).unwrap();
        let sim = load_simulation_config(&config).unwrap();
        match BacktestEngine::new(sim) {
            Err(TradesimError::ConfigInvalid { section, key, .. }) => {
                assert_eq!(section, "exit");
                assert_eq!(key, "take_profit_sizes");
            }
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn unknown_volume_class_fails_at_load() {
        let ini = FRICTIONLESS_INI.replace(
            "volume_requirement = spike, elevated, normal, low",
            "volume_requirement = spike, gigantic",
        );
        let config = FileConfigAdapter::from_string(&ini).unwrap();
        assert!(matches!(
            load_simulation_config(&config),
            Err(TradesimError::ConfigInvalid { .. })
        ));
    }
}

mod invariants {
    use super::*;
    use proptest::prelude::*;
    use tradesim::domain::engine::SimulationConfig;

    fn run_walk(steps: &[i32], exit: ExitConfig) -> tradesim::domain::engine::BacktestResult {
        let mut close = 100.0;
        let mut bars = Vec::new();
        for (minute, step) in steps.iter().enumerate() {
            close = (close * (1.0 + *step as f64 / 1000.0)).max(1.0);
            let mut bar = signal_bar(4, minute as u32, close, Direction::Long);
            bar.high = close * 1.002;
            bar.low = close * 0.998;
            bars.push(bar);
        }
        let engine = BacktestEngine::new(SimulationConfig {
            exit,
            ..frictionless_sim(2)
        })
        .unwrap();
        engine.run(&bars).unwrap()
    }

    proptest! {
        #[test]
        fn ledger_conserves_capital(steps in proptest::collection::vec(-30i32..30, 30..80)) {
            let result = run_walk(&steps, tiered_exit());
            let net: f64 = result.trades.iter().map(|t| t.net_pnl_usd()).sum();
            prop_assert!((result.final_capital - (10_000.0 + net)).abs() < 1e-6);
        }

        #[test]
        fn every_trade_settles_fully(steps in proptest::collection::vec(-30i32..30, 30..80)) {
            let result = run_walk(&steps, tiered_exit());
            prop_assert_eq!(result.equity_curve.len(), steps.len());
            for trade in &result.trades {
                prop_assert!(trade.status != TradeStatus::Open);
                prop_assert!((trade.remaining_size_pct - 0.0).abs() < 1e-6);
                let exited: f64 = trade.partial_exits.iter().map(|e| e.exit_size_pct).sum();
                prop_assert!(exited <= 100.0 + 1e-6);
            }
        }

        #[test]
        fn excursions_bound_realized_fills(steps in proptest::collection::vec(-30i32..30, 30..80)) {
            let result = run_walk(&steps, tiered_exit());
            for trade in &result.trades {
                prop_assert!(trade.mfe >= 0.0);
                prop_assert!(trade.mae <= 0.0);
                for exit in &trade.partial_exits {
                    prop_assert!(exit.pnl_pct <= trade.mfe + 1e-9);
                    prop_assert!(exit.pnl_pct >= trade.mae - 1e-9);
                }
            }
        }
    }
}

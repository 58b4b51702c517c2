#![allow(dead_code)]

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

use tradesim::domain::bar::{keys, Bar, VolumeClass};
use tradesim::domain::engine::{EngineConfig, SimulationConfig};
use tradesim::domain::entry::EntryConfig;
use tradesim::domain::error::TradesimError;
use tradesim::domain::exit::ExitConfig;
use tradesim::domain::signal::Direction;
use tradesim::ports::data_port::DataPort;

pub fn ts(day: u32, minute: u32) -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
        + Duration::minutes(minute as i64)
}

/// A bar that never signals: no confluence scores attached.
pub fn quiet_bar(day: u32, minute: u32, close: f64) -> Bar {
    let mut indicators = HashMap::new();
    indicators.insert(keys::RSI.to_string(), 50.0);
    Bar {
        timestamp: ts(day, minute),
        open: close,
        high: close + 0.2,
        low: close - 0.2,
        close,
        volume: 1000.0,
        volume_class: Some(VolumeClass::Normal),
        ribbon_state: None,
        indicators,
    }
}

/// A bar carrying a clean confluence signal in `direction`.
pub fn signal_bar(day: u32, minute: u32, close: f64, direction: Direction) -> Bar {
    let mut bar = quiet_bar(day, minute, close);
    let (long, short) = match direction {
        Direction::Long => (75.0, 40.0),
        Direction::Short => (40.0, 75.0),
    };
    bar.indicators.insert(keys::LONG_SCORE.to_string(), long);
    bar.indicators.insert(keys::SHORT_SCORE.to_string(), short);
    bar
}

/// Twenty quiet bars, enough history for the detector.
pub fn warmup(day: u32) -> Vec<Bar> {
    (0..20).map(|m| quiet_bar(day, m, 100.0)).collect()
}

/// Entry chain reduced to the confluence gates so synthetic bars trade.
pub fn permissive_entry() -> EntryConfig {
    EntryConfig {
        require_ema_alignment: false,
        use_stochastic: false,
        use_bollinger: false,
        min_quality_score: 0.0,
        rsi_min: 1.0,
        rsi_max: 99.0,
        volume_requirement: vec![
            VolumeClass::Spike,
            VolumeClass::Elevated,
            VolumeClass::Normal,
            VolumeClass::Low,
        ],
        ..EntryConfig::default()
    }
}

/// Tiered 1/2/3 percent exits with everything indicator-driven disabled.
pub fn tiered_exit() -> ExitConfig {
    ExitConfig {
        stop_ema: None,
        trailing_stop_enabled: false,
        use_time_based_exit: false,
        use_stochastic_exit: false,
        use_bollinger_exit: false,
        use_vwap_exit: false,
        ..ExitConfig::default()
    }
}

pub fn frictionless_sim(max_concurrent: usize) -> SimulationConfig {
    SimulationConfig {
        engine: EngineConfig {
            commission_pct: 0.0,
            slippage_pct: 0.0,
            max_concurrent_trades: max_concurrent,
            ..EngineConfig::default()
        },
        entry: permissive_entry(),
        exit: tiered_exit(),
    }
}

pub struct MockDataPort {
    pub bars: HashMap<String, Vec<Bar>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, source: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(source.to_string(), bars);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, source: &str) -> Result<Vec<Bar>, TradesimError> {
        self.bars
            .get(source)
            .cloned()
            .ok_or(TradesimError::EmptyData)
    }
}

/// Renders bars into the CSV schema the file adapter reads.
pub fn bars_to_csv(bars: &[Bar]) -> String {
    let mut out = String::from(
        "timestamp,open,high,low,close,volume,volume_class,long_score,short_score,rsi\n",
    );
    for bar in bars {
        let class = match bar.volume_class {
            Some(VolumeClass::Spike) => "spike",
            Some(VolumeClass::Elevated) => "elevated",
            Some(VolumeClass::Normal) => "normal",
            Some(VolumeClass::Low) => "low",
            None => "",
        };
        let opt = |key: &str| {
            bar.indicator(key)
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            bar.timestamp.format("%Y-%m-%d %H:%M:%S"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            class,
            opt(keys::LONG_SCORE),
            opt(keys::SHORT_SCORE),
            opt(keys::RSI),
        ));
    }
    out
}

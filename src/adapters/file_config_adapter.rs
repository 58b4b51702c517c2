//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[backtest]
data_file = bars.csv
initial_capital = 25000.0
max_concurrent_trades = 2

[entry]
require_ema_alignment = yes
min_quality_score = 70

[exit]
take_profit_levels = 1,2,3
trailing_stop_enabled = false
"#;

    #[test]
    fn from_string_reads_all_sections() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "data_file"),
            Some("bars.csv".to_string())
        );
        assert_eq!(adapter.get_double("backtest", "initial_capital", 0.0), 25000.0);
        assert_eq!(adapter.get_int("backtest", "max_concurrent_trades", 0), 2);
        assert!(adapter.get_bool("entry", "require_ema_alignment", false));
        assert!(!adapter.get_bool("exit", "trailing_stop_enabled", true));
        assert_eq!(
            adapter.get_string("exit", "take_profit_levels"),
            Some("1,2,3".to_string())
        );
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let adapter = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "data_file"), None);
        assert_eq!(adapter.get_int("backtest", "max_concurrent_trades", 3), 3);
        assert_eq!(adapter.get_double("backtest", "slippage_pct", 0.05), 0.05);
        assert!(adapter.get_bool("entry", "use_stochastic", true));
    }

    #[test]
    fn non_numeric_values_fall_back_to_defaults() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = lots\n").unwrap();
        assert_eq!(adapter.get_double("backtest", "initial_capital", 9.0), 9.0);
        assert_eq!(adapter.get_int("backtest", "initial_capital", 7), 7);
    }

    #[test]
    fn from_file_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_double("entry", "min_quality_score", 0.0), 70.0);
    }

    #[test]
    fn from_file_fails_for_missing_path() {
        assert!(FileConfigAdapter::from_file("/nonexistent/tradesim.ini").is_err());
    }
}

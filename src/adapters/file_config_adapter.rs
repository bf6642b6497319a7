//! INI file configuration adapter.

use crate::domain::error::CandlebotError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CandlebotError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| CandlebotError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, CandlebotError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| CandlebotError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }
}

/// Drop a trailing `; comment` or `# comment`.
fn strip_inline_comment(value: &str) -> &str {
    let cut = [" ;", "\t;", " #", "\t#"]
        .iter()
        .filter_map(|marker| value.find(marker))
        .min()
        .unwrap_or(value.len());
    value[..cut].trim()
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| strip_inline_comment(&v).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_sections() {
        let content = r#"
[backtest]
trading_budget = 10000
risk_ratio = 2:1

[strategy]
name = macd_ema
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "risk_ratio"),
            Some("2:1".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("macd_ema".to_string())
        );
        assert_eq!(adapter.get_f64("backtest", "trading_budget").unwrap(), Some(10000.0));
    }

    #[test]
    fn missing_key_is_none() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nleverage = 2\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
        assert_eq!(adapter.get_u32("backtest", "missing").unwrap(), None);
    }

    #[test]
    fn inline_comments_are_stripped() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nleverage = 3 ; integer >= 1\n")
                .unwrap();
        assert_eq!(adapter.get_u32("backtest", "leverage").unwrap(), Some(3));
    }

    #[test]
    fn malformed_number_is_invalid() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nleverage = two\n").unwrap();
        let err = adapter.get_u32("backtest", "leverage").unwrap_err();
        assert!(matches!(err, CandlebotError::ConfigInvalid { key, .. } if key == "leverage"));
    }

    #[test]
    fn bool_values() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\na = true\nb = yes\nc = 0\nd = maybe\n",
        )
        .unwrap();
        assert_eq!(adapter.get_bool("backtest", "a").unwrap(), Some(true));
        assert_eq!(adapter.get_bool("backtest", "b").unwrap(), Some(true));
        assert_eq!(adapter.get_bool("backtest", "c").unwrap(), Some(false));
        assert!(adapter.get_bool("backtest", "d").is_err());
        assert_eq!(adapter.get_bool("backtest", "e").unwrap(), None);
    }

    #[test]
    fn require_string_reports_missing_key() {
        let adapter = FileConfigAdapter::from_string("[strategy]\nname =\n").unwrap();
        let err = adapter.require_string("strategy", "name").unwrap_err();
        assert!(matches!(err, CandlebotError::ConfigMissing { key, .. } if key == "name"));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[data]\ncandles = /tmp/candles.csv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("data", "candles"),
            Some("/tmp/candles.csv".to_string())
        );
    }

    #[test]
    fn from_file_missing_is_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(CandlebotError::ConfigParse { .. })));
    }
}

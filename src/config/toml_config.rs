use crate::core::acquisition::AcquisitionSettings;
use crate::core::decoder::{LineEnding, DEFAULT_MAX_LINE_LENGTH};
use crate::domain::decimal::Decimal;
use crate::domain::model::{LineSettings, Parity, TimestampZone, Unit};
use crate::domain::rules::{Rule, RuleSet, DEFAULT_PRECISION};
use crate::utils::error::{ConfigError, LsmError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_one_of, validate_path, validate_positive_number,
    validate_range, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "lsm-logger.toml";

/// Nominal size used for the tolerance-band preset when no rules are configured.
pub const DEFAULT_STANDARD: Decimal = Decimal::new(110, 3);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub protocol: ProtocolConfig,
    pub classification: ClassificationConfig,
    pub reconnect: ReconnectConfig,
    pub logging: LoggingConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: Option<String>,
    pub force_port: bool,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: String,
    pub stop_bits: u8,
    pub read_timeout_ms: u64,
    /// Regexes replacing the platform's default port-name patterns.
    pub port_patterns: Vec<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            force_port: false,
            baud_rate: 9600,
            data_bits: 8,
            parity: "none".to_string(),
            stop_bits: 1,
            read_timeout_ms: 1000,
            port_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    #[default]
    FirstNumber,
    Prefixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    #[serde(rename = "type")]
    pub kind: ProtocolKind,
    pub line_ending: LineEnding,
    pub max_line_length: usize,
    pub prefix: Option<String>,
    pub unit: Option<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            kind: ProtocolKind::FirstNumber,
            line_ending: LineEnding::Crlf,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            prefix: None,
            unit: None,
        }
    }
}

impl ProtocolConfig {
    /// 設定檔指定的單位 (frame 本身沒有帶單位時使用)
    pub fn unit(&self) -> std::result::Result<Option<Unit>, ConfigError> {
        match self.unit.as_deref() {
            None => Ok(None),
            Some(token) => Unit::from_token(token.trim())
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "protocol.unit".to_string(),
                    value: token.to_string(),
                    reason: "Valid units: mm, in, inch".to_string(),
                }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub precision: u32,
    /// Nominal size for the tolerance-band preset. Mutually exclusive with `rules`.
    pub standard: Option<Decimal>,
    pub rules: Vec<Rule>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            standard: None,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_min_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub csv_path: String,
    pub timestamp_tz: TimestampZone,
    pub max_consecutive_failures: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            csv_path: "logs/readings.csv".to_string(),
            timestamp_tz: TimestampZone::Local,
            max_consecutive_failures: 3,
        }
    }
}

/// Demo device used by `--simulate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub standard: Decimal,
    /// Readings are drawn uniformly from `standard ± spread`.
    pub spread: Decimal,
    pub interval_ms: u64,
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            standard: DEFAULT_STANDARD,
            spread: Decimal::new(12, 3),
            interval_ms: 500,
            seed: None,
        }
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(LsmError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| {
            ConfigError::Parse {
                message: format!("TOML parsing error: {}", e),
            }
            .into()
        })
    }

    /// Explicit path (must exist), else `lsm-logger.toml` in the working directory, else
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::InvalidValue {
                        field: "--config".to_string(),
                        value: path.display().to_string(),
                        reason: "Configuration file not found".to_string(),
                    }
                    .into());
                }
                tracing::info!("📁 Loading configuration from {}", path.display());
                Self::from_file(path)
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    tracing::info!("📁 Loading configuration from {}", DEFAULT_CONFIG_FILE);
                    Self::from_file(default_path)
                } else {
                    tracing::debug!("No configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// 替換環境變數 (例如 ${LSM_PORT})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        let re = match Regex::new(r"\$\{([^}]+)\}") {
            Ok(re) => re,
            Err(_) => return content.to_string(),
        };

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> std::result::Result<(), ConfigError> {
        let serial = &self.serial;
        if let Some(port) = &serial.port {
            validate_non_empty_string("serial.port", port)?;
        }
        validate_positive_number("serial.baud_rate", serial.baud_rate.into(), 1)?;
        validate_one_of("serial.data_bits", serial.data_bits, &[5, 6, 7, 8])?;
        validate_one_of("serial.stop_bits", serial.stop_bits, &[1, 2])?;
        validate_positive_number("serial.read_timeout_ms", serial.read_timeout_ms, 1)?;
        self.parity()?;
        for pattern in &serial.port_patterns {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                field: "serial.port_patterns".to_string(),
                value: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        validate_positive_number(
            "protocol.max_line_length",
            self.protocol.max_line_length as u64,
            1,
        )?;
        self.protocol.unit()?;
        if self.protocol.kind == ProtocolKind::Prefixed {
            let prefix = self.protocol.prefix.as_deref().ok_or_else(|| ConfigError::Missing {
                field: "protocol.prefix".to_string(),
            })?;
            validate_non_empty_string("protocol.prefix", prefix)?;
        }

        validate_range(
            "classification.precision",
            self.classification.precision,
            0,
            crate::domain::decimal::MAX_SCALE,
        )?;
        self.build_rule_set()?;

        let reconnect = &self.reconnect;
        validate_positive_number("reconnect.backoff_min_ms", reconnect.backoff_min_ms, 1)?;
        validate_positive_number(
            "reconnect.backoff_max_ms",
            reconnect.backoff_max_ms,
            reconnect.backoff_min_ms,
        )?;

        validate_path("logging.csv_path", &self.logging.csv_path)?;
        validate_positive_number(
            "logging.max_consecutive_failures",
            self.logging.max_consecutive_failures.into(),
            1,
        )?;

        validate_positive_number("simulator.interval_ms", self.simulator.interval_ms, 1)?;
        if self.simulator.spread.is_negative() {
            return Err(ConfigError::InvalidValue {
                field: "simulator.spread".to_string(),
                value: self.simulator.spread.to_string(),
                reason: "Spread cannot be negative".to_string(),
            });
        }

        Ok(())
    }

    pub fn parity(&self) -> std::result::Result<Parity, ConfigError> {
        Parity::from_name(&self.serial.parity).ok_or_else(|| ConfigError::InvalidValue {
            field: "serial.parity".to_string(),
            value: self.serial.parity.clone(),
            reason: "Valid values: none, odd, even (or N, O, E)".to_string(),
        })
    }

    pub fn line_settings(&self) -> std::result::Result<LineSettings, ConfigError> {
        Ok(LineSettings {
            baud_rate: self.serial.baud_rate,
            data_bits: self.serial.data_bits,
            parity: self.parity()?,
            stop_bits: self.serial.stop_bits,
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
        })
    }

    /// Explicit rules, or the tolerance bands around `standard` (0.110 when neither is set).
    pub fn build_rule_set(&self) -> std::result::Result<RuleSet, ConfigError> {
        let classification = &self.classification;
        match (&classification.standard, classification.rules.is_empty()) {
            (Some(_), false) => Err(ConfigError::InvalidValue {
                field: "classification".to_string(),
                value: "standard + rules".to_string(),
                reason: "Set either a standard or explicit rules, not both".to_string(),
            }),
            (Some(standard), true) => RuleSet::tolerance_bands(*standard),
            (None, false) => RuleSet::new(classification.rules.clone(), classification.precision),
            (None, true) => RuleSet::tolerance_bands(DEFAULT_STANDARD),
        }
    }

    pub fn port_patterns(&self) -> Vec<String> {
        if self.serial.port_patterns.is_empty() {
            crate::core::port_resolver::default_port_patterns()
        } else {
            self.serial.port_patterns.clone()
        }
    }

    pub fn acquisition_settings(&self) -> std::result::Result<AcquisitionSettings, ConfigError> {
        Ok(AcquisitionSettings {
            port_hint: self.serial.port.clone(),
            line: self.line_settings()?,
            backoff_min: Duration::from_millis(self.reconnect.backoff_min_ms),
            backoff_max: Duration::from_millis(self.reconnect.backoff_max_ms),
            max_sink_failures: self.logging.max_consecutive_failures,
            ..AcquisitionSettings::default()
        })
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config().map_err(LsmError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::RuleOutcome;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn d(s: &str) -> Decimal {
        Decimal::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
baud_rate = 4800
data_bits = 7
parity = "E"
stop_bits = 2
read_timeout_ms = 250

[protocol]
type = "prefixed"
line_ending = "cr"
prefix = "01A"
unit = "in"

[classification]
precision = 2

[[classification.rules]]
label = "OK"
lower = 0.0
upper = 2.0

[[classification.rules]]
label = "HIGH"
lower = "2.01"
status = "fail"

[reconnect]
backoff_min_ms = 100
backoff_max_ms = 1000

[logging]
csv_path = "out/log.csv"
timestamp_tz = "utc"
max_consecutive_failures = 5
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        config.validate().unwrap();

        let line = config.line_settings().unwrap();
        assert_eq!(line.to_string(), "4800 baud 7E2");
        assert_eq!(line.read_timeout, Duration::from_millis(250));
        assert_eq!(config.protocol.kind, ProtocolKind::Prefixed);
        assert_eq!(config.protocol.line_ending, LineEnding::Cr);
        assert_eq!(config.protocol.unit().unwrap(), Some(Unit::Inch));
        assert_eq!(config.logging.timestamp_tz, TimestampZone::Utc);

        let rules = config.build_rule_set().unwrap();
        assert_eq!(rules.precision(), 2);
        assert_eq!(rules.rules()[0].status, RuleOutcome::Pass);
        assert_eq!(rules.rules()[0].upper, Some(d("2")));
        assert_eq!(rules.rules()[1].status, RuleOutcome::Fail);
        assert_eq!(rules.rules()[1].upper, None);

        let settings = config.acquisition_settings().unwrap();
        assert_eq!(settings.port_hint.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(settings.max_sink_failures, 5);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.logging.csv_path, "logs/readings.csv");

        let rules = config.build_rule_set().unwrap();
        assert_eq!(rules.rules().len(), 6);
        assert_eq!(rules.rules()[2].label, "nominal");
        assert_eq!(rules.rules()[2].lower, Some(d("0.108")));
    }

    #[test]
    fn test_standard_and_rules_are_exclusive() {
        let config = AppConfig::from_toml_str(
            r#"
[classification]
standard = 0.250
[[classification.rules]]
label = "OK"
lower = 0
upper = 1
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_rule_is_rejected() {
        let config = AppConfig::from_toml_str(
            r#"
[[classification.rules]]
label = "BACKWARDS"
lower = 2.0
upper = 1.0
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate_config(),
            Err(ConfigError::MalformedRule { .. })
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for content in [
            "[serial]\nparity = \"mark\"",
            "[serial]\ndata_bits = 9",
            "[serial]\nbaud_rate = 0",
            "[serial]\nport_patterns = [\"(\"]",
            "[protocol]\ntype = \"prefixed\"",
            "[protocol]\nunit = \"furlong\"",
            "[reconnect]\nbackoff_min_ms = 500\nbackoff_max_ms = 100",
            "[logging]\ncsv_path = \"\"",
            "[logging]\nmax_consecutive_failures = 0",
        ] {
            let config = AppConfig::from_toml_str(content).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", content);
        }
    }

    #[test]
    fn test_unknown_protocol_is_parse_error() {
        let err = AppConfig::from_toml_str("[protocol]\ntype = \"binary\"").unwrap_err();
        assert!(matches!(err, LsmError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_environment_variable_substitution() {
        std::env::set_var("LSM_TEST_PORT", "/dev/ttyACM7");
        let config = AppConfig::from_toml_str("[serial]\nport = \"${LSM_TEST_PORT}\"").unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM7"));
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[serial]\nbaud_rate = 19200").unwrap();

        let config = AppConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.serial.baud_rate, 19200);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/lsm-logger.toml"))).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}

//! Daemon configuration
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | STATSD_CONFIG | - | Path to a TOML config file |
//! | STATSD_ADDRESS | 0.0.0.0:8125 | UDP address for metric packets |
//! | STATSD_MANAGEMENT_ADDRESS | 0.0.0.0:8126 | TCP address for the management interface |
//! | STATSD_FLUSH_INTERVAL | - | Seconds between periodic flushes (unset or 0 = off) |
//! | STATSD_QUEUE_CAPACITY | 1000 | Pending mutations before submitters wait |
//! | STATSD_MAX_TIMER_SAMPLES | - | Per-key timer sample cap per flush window |
//! | STATSD_MAX_PACKET_SIZE | 512 | Datagram read size in bytes |
//! | STATSD_DEBUG | false | Debug level logging |
//! | STATSD_JSON_LOGS | false | JSON formatted logs |

use crate::collection::DEFAULT_MAX_PACKET_SIZE;
use crate::metrics::{StoreConfig, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "STATSD_CONFIG";

#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io { path: PathBuf, source: std::io::Error },
    /// Config file is not valid TOML for [`Config`]
    Parse(toml::de::Error),
    /// An environment override could not be parsed
    InvalidEnv { var: &'static str, value: String },
    /// A setting is out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "invalid config file: {}", e),
            ConfigError::InvalidEnv { var, value } => {
                write!(f, "invalid value for {}: {:?}", var, value)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP bind address for metric packets
    pub address: String,
    /// TCP bind address for the management interface
    pub management_address: String,
    /// Seconds between periodic flushes; None or 0 disables the flusher
    pub flush_interval_secs: Option<u64>,
    pub queue_capacity: usize,
    pub max_timer_samples: Option<usize>,
    pub max_packet_size: usize,
    pub debug: bool,
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            address: "0.0.0.0:8125".to_string(),
            management_address: "0.0.0.0:8126".to_string(),
            flush_interval_secs: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_timer_samples: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            debug: false,
            json_logs: false,
        }
    }
}

impl Config {
    /// Load from `STATSD_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Config::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `STATSD_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("STATSD_ADDRESS") {
            self.address = address;
        }
        if let Some(address) = lookup("STATSD_MANAGEMENT_ADDRESS") {
            self.management_address = address;
        }
        if let Some(value) = lookup("STATSD_FLUSH_INTERVAL") {
            self.flush_interval_secs = Some(parse_env("STATSD_FLUSH_INTERVAL", value)?);
        }
        if let Some(value) = lookup("STATSD_QUEUE_CAPACITY") {
            self.queue_capacity = parse_env("STATSD_QUEUE_CAPACITY", value)?;
        }
        if let Some(value) = lookup("STATSD_MAX_TIMER_SAMPLES") {
            self.max_timer_samples = Some(parse_env("STATSD_MAX_TIMER_SAMPLES", value)?);
        }
        if let Some(value) = lookup("STATSD_MAX_PACKET_SIZE") {
            self.max_packet_size = parse_env("STATSD_MAX_PACKET_SIZE", value)?;
        }
        if let Some(value) = lookup("STATSD_DEBUG") {
            self.debug = parse_flag("STATSD_DEBUG", value)?;
        }
        if let Some(value) = lookup("STATSD_JSON_LOGS") {
            self.json_logs = parse_flag("STATSD_JSON_LOGS", value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0".to_string()));
        }
        if self.max_packet_size == 0 {
            return Err(ConfigError::Invalid("max_packet_size must be > 0".to_string()));
        }
        if self.max_timer_samples == Some(0) {
            return Err(ConfigError::Invalid("max_timer_samples must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            queue_capacity: self.queue_capacity,
            max_timer_samples: self.max_timer_samples,
        }
    }

    /// Periodic flush interval, if enabled
    pub fn flush_interval(&self) -> Option<Duration> {
        self.flush_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

fn parse_flag(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.address, "0.0.0.0:8125");
        assert_eq!(config.management_address, "0.0.0.0:8126");
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.max_packet_size, 512);
        assert!(config.flush_interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            address = "127.0.0.1:9125"
            flush_interval_secs = 10
            max_timer_samples = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.address, "127.0.0.1:9125");
        assert_eq!(config.flush_interval(), Some(Duration::from_secs(10)));
        assert_eq!(config.store_config().max_timer_samples, Some(500));
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_bad_toml() {
        let err = Config::from_toml_str("queue_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "management_address = \"127.0.0.1:0\"").unwrap();
        writeln!(file, "debug = true").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.management_address, "127.0.0.1:0");
        assert!(config.debug);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/statsd.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("STATSD_ADDRESS", "127.0.0.1:1"),
                ("STATSD_FLUSH_INTERVAL", "0"),
                ("STATSD_QUEUE_CAPACITY", " 64 "),
                ("STATSD_DEBUG", "TRUE"),
            ]))
            .unwrap();
        assert_eq!(config.address, "127.0.0.1:1");
        assert_eq!(config.flush_interval_secs, Some(0));
        assert!(config.flush_interval().is_none());
        assert_eq!(config.queue_capacity, 64);
        assert!(config.debug);
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup_from(&[("STATSD_MAX_PACKET_SIZE", "big")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: "STATSD_MAX_PACKET_SIZE", .. }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = Config {
            queue_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_timer_samples: Some(0),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}

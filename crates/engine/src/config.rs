//! Engine configuration
//!
//! ```toml
//! [engine]
//! query_timeout_ms = 30000
//! default_timezone = "UTC"
//! filter_values_lookback_days = 90
//!
//! [store]
//! backend = "local"
//! path = "data/channels"
//!
//! [log]
//! level = "info"
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use kpi_store::StoreConfig;
use serde::Deserialize;

use crate::error::{QueryError, Result};
use crate::timerange::parse_timezone;

/// Default query group timeout
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;

/// Default timezone for queries without one
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Default window for filter value listings, in days
pub const DEFAULT_FILTER_VALUES_LOOKBACK_DAYS: u32 = 90;

/// Complete configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Query execution settings
    pub engine: EngineConfig,

    /// Document store backend
    pub store: StoreConfig,

    /// Logging
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(s).map_err(|e| QueryError::Config(e.to_string()))?;
        config.engine.validate()?;
        Ok(config)
    }
}

impl FromStr for Config {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Query execution settings (`[engine]` section)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for a whole query group, in milliseconds
    pub query_timeout_ms: u64,

    /// IANA timezone used when a query has none
    pub default_timezone: String,

    /// Days of documents scanned when listing filter values
    pub filter_values_lookback_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            filter_values_lookback_days: DEFAULT_FILTER_VALUES_LOOKBACK_DAYS,
        }
    }
}

impl EngineConfig {
    /// Query group timeout
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Check settings
    pub fn validate(&self) -> Result<()> {
        if self.query_timeout_ms == 0 {
            return Err(QueryError::Config(
                "query_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.filter_values_lookback_days == 0 {
            return Err(QueryError::Config(
                "filter_values_lookback_days must be greater than zero".to_string(),
            ));
        }
        parse_timezone(&self.default_timezone)
            .map_err(|_| QueryError::Config(format!(
                "unknown default_timezone: {}",
                self.default_timezone
            )))?;
        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging settings (`[log]` section)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level
    pub level: LogLevel,
}

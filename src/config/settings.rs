//! Application settings loaded from `ledger.toml`.
//!
//! Every section and field has a default, so an empty (or missing) file yields a
//! usable configuration. `DATABASE_URL` in the environment still wins over the
//! configured database URL, see [`super::database::get_database_url`].

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{path::Path, time::Duration};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "ledger.toml";

/// Configuration structure representing the entire `ledger.toml` file
#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub settlement: SettlementConfig,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; `None` falls back to the built-in default
    pub url: Option<String>,
}

/// Settings for the recurring expense scheduler loop
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether the daemon runs the scheduler at all
    pub enabled: bool,
    /// Seconds between two scheduler ticks (one day by default)
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 24 * 60 * 60,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Retry policy for settlements hitting transient store errors
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SettlementConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base backoff between attempts; attempt `n` waits `n * retry_backoff_ms`
    pub retry_backoff_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 25,
        }
    }
}

impl SettlementConfig {
    #[must_use]
    pub const fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}

impl AppConfig {
    fn validate(self) -> Result<Self> {
        if self.scheduler.interval_secs == 0 {
            return Err(Error::Config {
                message: "scheduler.interval_secs must be greater than zero".to_string(),
            });
        }
        if self.settlement.max_attempts == 0 {
            return Err(Error::Config {
                message: "settlement.max_attempts must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}

/// Parses settings from a TOML string.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str::<AppConfig>(contents)
        .map_err(|e| Error::Config {
            message: format!("Failed to parse ledger config: {e}"),
        })?
        .validate()
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML syntax is invalid, or a
/// value is out of range.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    tracing::debug!("Loading configuration from {:?}", path);
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;
    parse_config(&contents)
}

/// Loads settings from `LEDGER_CONFIG` or `./ledger.toml`, using defaults when
/// the file does not exist.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var("LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        tracing::info!("No config file at {}, using defaults", path);
        Ok(AppConfig::default())
    }
}

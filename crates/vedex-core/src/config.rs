//! Ledger configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (prefixed with `VEDEX_`)
//! - JSON files (see `vedex --config`)
//! - Programmatic defaults
//!
//! # Example
//!
//! ```rust
//! use vedex_core::config::LedgerConfig;
//!
//! let config = LedgerConfig::builder()
//!     .max_lock_time_secs(52 * 7 * 86_400)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.epoch_length_secs, 604_800);
//! ```

use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// One week, the epoch length of both ledgers.
pub const WEEK: u64 = 7 * 86_400;

/// Default maximum lock duration (182 days).
pub const DEFAULT_MAX_LOCK_TIME: u64 = 182 * 86_400;

/// Default cap on total locked supply. Keeps every bias/slope product inside `i128`.
pub const DEFAULT_MAX_TOTAL_SUPPLY: u128 = 1 << 100;

/// Complete ledger configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Epoch length in seconds; lock ends and reward epochs are aligned to it.
    pub epoch_length_secs: u64,

    /// Maximum lock duration in seconds (`MAX_LOCK_TIME`).
    pub max_lock_time_secs: u64,

    /// Upper bound on `supply` (sum of locked underlying tokens).
    pub max_total_supply: u128,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            epoch_length_secs: WEEK,
            max_lock_time_secs: DEFAULT_MAX_LOCK_TIME,
            max_total_supply: DEFAULT_MAX_TOTAL_SUPPLY,
            logging: LoggingConfig::default(),
        }
    }
}

impl LedgerConfig {
    pub fn builder() -> LedgerConfigBuilder {
        LedgerConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Looks for variables prefixed with `VEDEX_`:
    /// - `VEDEX_EPOCH_LENGTH_SECS` - Epoch length in seconds
    /// - `VEDEX_MAX_LOCK_TIME_SECS` - Maximum lock duration in seconds
    /// - `VEDEX_MAX_TOTAL_SUPPLY` - Cap on total locked supply
    /// - `VEDEX_LOG_LEVEL` - Logging level (trace, debug, info, warn, error)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("VEDEX_EPOCH_LENGTH_SECS") {
            config.epoch_length_secs = v.parse().map_err(|e| {
                LedgerError::Config(format!("Invalid VEDEX_EPOCH_LENGTH_SECS: {}", e))
            })?;
        }

        if let Ok(v) = std::env::var("VEDEX_MAX_LOCK_TIME_SECS") {
            config.max_lock_time_secs = v.parse().map_err(|e| {
                LedgerError::Config(format!("Invalid VEDEX_MAX_LOCK_TIME_SECS: {}", e))
            })?;
        }

        if let Ok(v) = std::env::var("VEDEX_MAX_TOTAL_SUPPLY") {
            config.max_total_supply = v.parse().map_err(|e| {
                LedgerError::Config(format!("Invalid VEDEX_MAX_TOTAL_SUPPLY: {}", e))
            })?;
        }

        if let Ok(level) = std::env::var("VEDEX_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.epoch_length_secs == 0 {
            return Err(LedgerError::Config(
                "epoch_length_secs must be greater than 0".into(),
            ));
        }

        if self.max_lock_time_secs < self.epoch_length_secs
            || self.max_lock_time_secs % self.epoch_length_secs != 0
        {
            return Err(LedgerError::Config(
                "max_lock_time_secs must be a positive multiple of epoch_length_secs".into(),
            ));
        }

        if self.max_total_supply == 0 || self.max_total_supply > DEFAULT_MAX_TOTAL_SUPPLY {
            return Err(LedgerError::Config(format!(
                "max_total_supply must be in 1..={}",
                DEFAULT_MAX_TOTAL_SUPPLY
            )));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(LedgerError::Config(format!("unknown log level: {other}"))),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// JSON output format.
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_output: false,
        }
    }
}

/// Builder for LedgerConfig.
#[derive(Default)]
pub struct LedgerConfigBuilder {
    config: LedgerConfig,
}

impl LedgerConfigBuilder {
    pub fn epoch_length_secs(mut self, secs: u64) -> Self {
        self.config.epoch_length_secs = secs;
        self
    }

    pub fn max_lock_time_secs(mut self, secs: u64) -> Self {
        self.config.max_lock_time_secs = secs;
        self
    }

    pub fn max_total_supply(mut self, cap: u128) -> Self {
        self.config.max_total_supply = cap;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<LedgerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_lock_time_secs, 26 * WEEK);
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = LedgerConfig::builder()
            .max_lock_time_secs(4 * WEEK)
            .max_total_supply(1_000_000)
            .log_level("debug")
            .build()
            .unwrap();

        assert_eq!(config.max_lock_time_secs, 4 * WEEK);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unaligned_max_lock_time_is_rejected() {
        let result = LedgerConfig::builder().max_lock_time_secs(WEEK + 1).build();
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn zero_epoch_is_rejected() {
        let result = LedgerConfig::builder().epoch_length_secs(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn oversized_supply_cap_is_rejected() {
        let result = LedgerConfig::builder()
            .max_total_supply(DEFAULT_MAX_TOTAL_SUPPLY + 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{"max_lock_time_secs": 1209600}"#).unwrap();
        assert_eq!(config.max_lock_time_secs, 2 * WEEK);
        assert_eq!(config.epoch_length_secs, WEEK);
        assert!(config.validate().is_ok());
    }
}

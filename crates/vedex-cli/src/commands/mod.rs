//! CLI Command Implementations

pub mod config;
pub mod fuzz;
pub mod replay;

use anyhow::{Context, Result};
use std::path::Path;
use vedex_core::LedgerConfig;

/// Load the ledger configuration.
///
/// A config file, when given, is the whole configuration; otherwise defaults are overlaid with
/// `VEDEX_*` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<LedgerConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: LedgerConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            config.validate().context("Invalid config file")?;
            Ok(config)
        }
        None => LedgerConfig::from_env().context("Invalid VEDEX_* environment configuration"),
    }
}

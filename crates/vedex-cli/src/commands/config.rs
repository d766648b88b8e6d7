//! Effective configuration output.

use anyhow::Result;
use vedex_core::config::WEEK;
use vedex_core::LedgerConfig;

pub fn run(config: &LedgerConfig, format: String) -> Result<()> {
    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        "human" => {
            println!("Ledger configuration");
            println!();
            println!(
                "  epoch_length_secs  = {} ({} weeks)",
                config.epoch_length_secs,
                config.epoch_length_secs as f64 / WEEK as f64
            );
            println!(
                "  max_lock_time_secs = {} ({} epochs)",
                config.max_lock_time_secs,
                config.max_lock_time_secs / config.epoch_length_secs
            );
            println!("  max_total_supply   = {}", config.max_total_supply);
            println!("  log_level          = {}", config.logging.level);
        }
        _ => anyhow::bail!("unknown format: {format} (expected 'human' or 'json')"),
    }

    Ok(())
}

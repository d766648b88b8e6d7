//! vedex CLI - vote-escrow and epoch reward ledger tooling
//!
//! Replays action traces through the in-process ledgers, fuzzes them with random traces, and
//! prints the effective configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// vedex: checkpointed vote-escrow and epoch virtual rewarder
///
/// Drives the ledgers locally. Every trace is checked against the ledger invariants after each
/// action.
#[derive(Parser)]
#[command(name = "vedex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (JSON `LedgerConfig`)
    #[arg(short, long, global = true, env = "VEDEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON trace and report outcomes and balances
    Replay {
        /// Trace file (JSON: `{ "roles": ..., "actions": [...] }`)
        #[arg(short, long)]
        trace: PathBuf,

        /// Output format (json, human)
        #[arg(short, long, default_value = "human")]
        format: String,
    },

    /// Search random traces for invariant counterexamples
    Fuzz {
        /// RNG seed
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Actions per trace
        #[arg(long, default_value_t = 200)]
        steps: u32,

        /// Number of traces
        #[arg(long, default_value_t = 50)]
        iters: u32,

        /// Number of funded user accounts
        #[arg(long, default_value_t = 4)]
        accounts: u32,
    },

    /// Print the effective configuration
    Config {
        /// Output format (json, human)
        #[arg(short, long, default_value = "human")]
        format: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref())?;

    // Initialize logging
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    if config.logging.json_output {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Commands::Replay { trace, format } => commands::replay::run(&config, trace, format),
        Commands::Fuzz {
            seed,
            steps,
            iters,
            accounts,
        } => commands::fuzz::run(&config, seed, steps, iters, accounts),
        Commands::Config { format } => commands::config::run(&config, format),
    }
}

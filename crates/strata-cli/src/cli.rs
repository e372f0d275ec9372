//! CLI argument parsing for strata

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deterministic EVM block transition driver
#[derive(Parser, Debug, Clone)]
#[command(name = "strata")]
#[command(about = "Execute EVM blocks with optimistic parallel scheduling")]
#[command(version)]
pub struct Cli {
    /// Engine configuration file (TOML); built-in defaults when absent
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Log line format
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable
    Text,
    /// One JSON object per line
    Json,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Execute a block fixture and report receipts and the state root
    Run {
        /// Block fixture (JSON)
        fixture: PathBuf,

        /// Execute strictly in block order, without speculation
        #[arg(long)]
        sequential: bool,

        /// Also execute sequentially and fail unless both runs agree
        #[arg(long, conflicts_with = "sequential")]
        verify: bool,
    },
    /// Print the effective engine configuration as TOML
    Config,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

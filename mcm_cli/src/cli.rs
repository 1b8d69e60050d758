//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "mcm", version, about = "Three-axis stage controller CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/mcm_config.toml")]
    pub config: PathBuf,

    /// Extra stage models CSV (strict header: name,um_per_count,limit_um)
    #[arg(long = "stages-csv", value_name = "FILE")]
    pub stages_csv: Option<PathBuf>,

    /// Serial port name; overrides [port].name from the config
    #[arg(long, value_name = "NAME")]
    pub port: Option<String>,

    /// Print results and errors as JSON, log as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); defaults to [logging].level, then warn
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a channel's position in micrometers
    Position {
        #[arg(long, value_name = "N")]
        channel: u8,
    },
    /// Read a channel's raw encoder counts
    Counts {
        #[arg(long, value_name = "N")]
        channel: u8,
    },
    /// Show a channel's travel limits
    Limits {
        #[arg(long, value_name = "N")]
        channel: u8,
    },
    /// Move a channel
    Move {
        #[arg(long, value_name = "N")]
        channel: u8,
        /// Target in micrometers (absolute unless --relative)
        #[arg(long, allow_hyphen_values = true)]
        um: f64,
        /// Treat --um as a delta from the current position
        #[arg(long, action = ArgAction::SetTrue)]
        relative: bool,
        /// Wait at most this long for arrival (overrides motion.move_timeout_ms)
        #[arg(long, value_name = "MS", conflicts_with = "no_wait")]
        timeout_ms: Option<u64>,
        /// Return as soon as the move is sent
        #[arg(long, action = ArgAction::SetTrue)]
        no_wait: bool,
    },
    /// Redefine the channel's current position as zero
    Zero {
        #[arg(long, value_name = "N")]
        channel: u8,
        /// Confirm the new origin
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// List the known stage models
    Stages,
    /// Connect, read every configured channel, report
    SelfCheck,
}

impl Commands {
    /// Whether the command talks to the device at all.
    pub fn needs_device(&self) -> bool {
        !matches!(self, Commands::Stages)
    }
}

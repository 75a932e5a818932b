//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// logship - reliable log shipping from producers to collectors
#[derive(Parser, Debug)]
#[command(
    name = "logship",
    author,
    version,
    about = "Reliable client-to-collector log shipping",
    long_about = "Ships batches of log messages to a pool of collectors.\n\n\
                  The client retries across servers and keeps undeliverable batches \n\
                  for replay; the collector routes accepted messages to named sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LOGSHIP_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true, env = "LOGSHIP_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a collector until Ctrl+C / SIGTERM
    Collect(CollectArgs),

    /// Send lines from a file or stdin to the configured collectors
    Send(SendArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `collect` command
#[derive(Parser, Debug, Clone)]
pub struct CollectArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "logship.toml", env = "LOGSHIP_CONFIG")]
    pub config: PathBuf,

    /// Override the RPC listener address
    #[arg(long, env = "LOGSHIP_RPC_ADDR")]
    pub rpc_addr: Option<String>,

    /// Override the status HTTP listener address
    #[arg(long, env = "LOGSHIP_STATUS_ADDR")]
    pub status_addr: Option<String>,

    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "LOGSHIP_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LOGSHIP_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `send` command
#[derive(Parser, Debug, Clone)]
pub struct SendArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "logship.toml", env = "LOGSHIP_CONFIG")]
    pub config: PathBuf,

    /// Read lines from this file instead of stdin
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Override the application name
    #[arg(long)]
    pub app: Option<String>,

    /// Override the server list (repeatable)
    #[arg(long = "server")]
    pub servers: Vec<String>,

    /// Lines per batch
    #[arg(long, default_value = "100")]
    pub batch_size: usize,

    /// Output the final counters as JSON
    #[arg(long)]
    pub json: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LOGSHIP_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "logship.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "logship.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink parameters
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

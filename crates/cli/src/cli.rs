//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Telemetry Bridge - broadcast and ingest brace-framed parameter telemetry
#[derive(Parser, Debug)]
#[command(
    name = "telemetry-bridge",
    author,
    version,
    about = "Broadcast and ingest brace-framed parameter telemetry",
    long_about = "A telemetry bridge for controller parameters.\n\n\
                  `serve` runs a pseudo-controller and broadcasts every value change to \n\
                  all connected clients; `receive` connects to a source, decodes the \n\
                  stream and dispatches each record to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TELEMETRY_BRIDGE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TELEMETRY_BRIDGE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the broadcast server fed by the pseudo-controller
    Serve(ServeArgs),

    /// Connect to a telemetry source and dispatch records to sinks
    Receive(ReceiveArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `serve` command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "TELEMETRY_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override listen host from configuration
    #[arg(long, env = "TELEMETRY_BRIDGE_HOST")]
    pub host: Option<String>,

    /// Override listen port from configuration
    #[arg(long, env = "TELEMETRY_BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Override the controller refresh period (milliseconds)
    #[arg(long, env = "TELEMETRY_BRIDGE_PERIOD_MS")]
    pub period_ms: Option<u64>,

    /// Seed for the pseudo-controller (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "TELEMETRY_BRIDGE_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TELEMETRY_BRIDGE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `receive` command
#[derive(Parser, Debug, Clone)]
pub struct ReceiveArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "TELEMETRY_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override source host from configuration
    #[arg(long, env = "TELEMETRY_BRIDGE_HOST")]
    pub host: Option<String>,

    /// Override source port from configuration
    #[arg(long, env = "TELEMETRY_BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Stop after this many seconds (0 = run until the source closes or interrupted)
    #[arg(long, default_value = "0", env = "TELEMETRY_BRIDGE_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TELEMETRY_BRIDGE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "telemetry.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "telemetry.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the controller parameter table
    #[arg(long)]
    pub parameters: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "glyco", version, about = "Closed-loop insulin decision engine")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults apply when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and errors as JSON, and log as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one decision cycle on a glucose history and print the advice
    Advise {
        /// Smoothed glucose history CSV (timestamp_ms,mmol)
        #[arg(long, value_name = "FILE")]
        history: PathBuf,
        /// Current insulin-on-board in units
        #[arg(long, value_name = "U")]
        iob: f64,
        /// Decision time (Unix ms); defaults to the last history sample
        #[arg(long, value_name = "MS")]
        now_ms: Option<i64>,
        /// Force night mode instead of deriving it from the profile hours
        #[arg(long, action = ArgAction::SetTrue)]
        night: bool,
    },
    /// Replay a glucose/IOB trace cycle by cycle against a simulated pump
    Replay {
        /// Trace CSV (timestamp_ms,mmol,iob_u), one row per control cycle
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        /// Audit JSONL output; overrides audit.file from the config
        #[arg(long, value_name = "FILE")]
        audit: Option<PathBuf>,
    },
    /// Load and validate the configuration
    SelfCheck,
}

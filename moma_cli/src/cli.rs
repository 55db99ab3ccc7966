//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "moma", version, about = "Force-guided mobile manipulation")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a session against the simulated robot
    Run {
        /// Length of the force-guided phase (overrides runner.duration_ms)
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
        /// Start straight from the configured direction
        #[arg(long, action = ArgAction::SetTrue)]
        skip_calibration: bool,
        /// Align the end-effector z axis before calibrating
        #[arg(long, action = ArgAction::SetTrue)]
        align: bool,
        /// Write the end-effector trajectory to this CSV file
        #[arg(long, value_name = "FILE")]
        trajectory: Option<PathBuf>,
    },
    /// Validate the config and the velocity profile
    Check,
    /// Print the velocity profile as JSON lines
    Profile {
        /// Last sample time (s)
        #[arg(long, value_name = "SECS", default_value_t = 10.0)]
        until: f64,
        /// Sampling step (s)
        #[arg(long, value_name = "SECS", default_value_t = 0.1)]
        step: f64,
    },
}

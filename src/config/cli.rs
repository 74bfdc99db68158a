//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Controller (default) - load a board, drive the engine, relay keys
    Controller,
    /// Engine service - own the board and run the turn loop
    Engine,
    /// Worker service - register with the engine and compute bands
    Worker,
    /// Engine, in-process workers and controller in one process
    Local,
}

/// golnet - Distributed Game of Life
#[derive(Parser, Debug)]
#[command(name = "golnet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: controller, engine, worker, or local
    #[arg(long, value_enum, default_value = "controller")]
    pub mode: ExecutionMode,

    /// TOML configuration file (CLI options take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Board ===
    /// Board width
    #[arg(short = 'w', long)]
    pub width: Option<usize>,

    /// Board height
    #[arg(short = 'H', long)]
    pub height: Option<usize>,

    /// Number of turns to process
    #[arg(long)]
    pub turns: Option<u64>,

    /// Start from a random board with this live-cell density (0.0-1.0)
    #[arg(long)]
    pub random: Option<f64>,

    /// Seed for --random
    #[arg(long)]
    pub seed: Option<u64>,

    // === Network ===
    /// Port this component listens on (engine, worker, or controller event port)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Engine address (host:port)
    #[arg(long, env = "GOLNET_ENGINE")]
    pub engine_address: Option<String>,

    /// Host other components should use to reach this one
    #[arg(long)]
    pub advertise: Option<String>,

    /// Delay between close and exit (e.g., 2s, 500ms)
    #[arg(long)]
    pub close_grace: Option<String>,

    // === Worker ===
    /// Compute threads per worker
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// In-process workers (local mode only)
    #[arg(long)]
    pub workers: Option<usize>,

    // === Controller ===
    /// Stream cell flips from the engine (high impact on speed)
    #[arg(long)]
    pub visualize: bool,

    /// Reattach to or extend the engine's current run
    #[arg(long = "continue")]
    pub continue_run: bool,

    /// Alive-cell sampling interval (e.g., 2s, 500ms)
    #[arg(long)]
    pub sample_interval: Option<String>,

    /// Do not read keypresses from stdin
    #[arg(long)]
    pub no_keyboard: bool,

    // === Output ===
    /// Directory holding input images
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Directory for output images
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Write a JSON run summary to this file
    #[arg(long)]
    pub json_summary: Option<PathBuf>,

    /// Print every visualization event
    #[arg(long)]
    pub print_events: bool,

    // === Runtime ===
    /// Log filter (e.g., info, debug, golnet=trace); RUST_LOG takes precedence
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

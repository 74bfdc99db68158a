//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Board and run length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_size")]
    pub width: usize,
    #[serde(default = "default_size")]
    pub height: usize,
    /// Turns to run
    #[serde(default = "default_turns")]
    pub turns: u64,
    /// Generate a random board with this live-cell density instead of
    /// loading an image
    pub random_density: Option<f64>,
    /// Seed for the random board
    pub seed: Option<u64>,
}

fn default_size() -> usize {
    512
}

fn default_turns() -> u64 {
    10_000_000_000
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: default_size(),
            height: default_size(),
            turns: default_turns(),
            random_density: None,
            seed: None,
        }
    }
}

/// Engine service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Address controllers and workers dial (host:port)
    #[serde(default = "default_engine_address")]
    pub address: String,
    /// Port the engine service listens on
    #[serde(default = "default_engine_port")]
    pub port: u16,
    /// Delay between close and exit (milliseconds)
    #[serde(default = "default_engine_grace_ms")]
    pub close_grace_ms: u64,
}

fn default_engine_address() -> String {
    "127.0.0.1:8040".to_string()
}

fn default_engine_port() -> u16 {
    8040
}

fn default_engine_grace_ms() -> u64 {
    2000
}

impl EngineConfig {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: default_engine_address(),
            port: default_engine_port(),
            close_grace_ms: default_engine_grace_ms(),
        }
    }
}

/// Worker service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Port the worker service listens on (0 = any free port)
    #[serde(default = "default_worker_port")]
    pub port: u16,
    /// Compute threads per band
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Host the engine should dial back; hostname when unset
    pub advertise: Option<String>,
    /// Delay between shutdown and exit (milliseconds)
    #[serde(default = "default_worker_grace_ms")]
    pub close_grace_ms: u64,
    /// In-process workers in local mode
    #[serde(default = "default_local_workers")]
    pub local_workers: usize,
}

fn default_worker_port() -> u16 {
    8050
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_worker_grace_ms() -> u64 {
    4000
}

fn default_local_workers() -> usize {
    4
}

impl WorkerConfig {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            port: default_worker_port(),
            threads: default_threads(),
            advertise: None,
            close_grace_ms: default_worker_grace_ms(),
            local_workers: default_local_workers(),
        }
    }
}

/// Session controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Port of the event listener used when visualizing
    #[serde(default = "default_controller_port")]
    pub port: u16,
    /// Host the engine should dial for events; hostname when unset
    pub advertise: Option<String>,
    /// Stream per-turn cell flips from the engine
    #[serde(default)]
    pub visualize: bool,
    /// Reattach to (or extend) the engine's current run instead of starting
    #[serde(default)]
    pub continue_run: bool,
    /// Alive-cell sampling interval (milliseconds)
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Read keypresses from stdin
    #[serde(default = "default_true")]
    pub keyboard: bool,
}

fn default_controller_port() -> u16 {
    8030
}

fn default_sample_interval_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

impl ControllerConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: default_controller_port(),
            advertise: None,
            visualize: false,
            continue_run: false,
            sample_interval_ms: default_sample_interval_ms(),
            keyboard: true,
        }
    }
}

/// Image and summary output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding `<h>x<w>.pgm` input images
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Directory for `<h>x<w>x<turn>.pgm` snapshots
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Write a JSON run summary to this path
    pub json_summary: Option<PathBuf>,
    /// Print every visualization event
    #[serde(default)]
    pub print_events: bool,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            json_summary: None,
            print_events: false,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
    /// Log filter directive (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: default_log_level(),
        }
    }
}

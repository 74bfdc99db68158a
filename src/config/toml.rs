//! TOML configuration file parsing

use super::*;
use crate::config::cli::{Cli, ExecutionMode};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Build the effective configuration: file (if any), then CLI overrides
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, base)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
///
/// `--port`, `--advertise` and `--close-grace` apply to the component
/// selected by `--mode`.
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Board
    if let Some(width) = cli.width {
        config.board.width = width;
    }
    if let Some(height) = cli.height {
        config.board.height = height;
    }
    if let Some(turns) = cli.turns {
        config.board.turns = turns;
    }
    if let Some(density) = cli.random {
        config.board.random_density = Some(density);
    }
    if let Some(seed) = cli.seed {
        config.board.seed = Some(seed);
    }

    // Network, per component
    let grace_ms = cli.close_grace.as_deref().map(parse_duration_ms).transpose()?;
    match cli.mode {
        ExecutionMode::Engine => {
            if let Some(port) = cli.port {
                config.engine.port = port;
            }
            if let Some(ms) = grace_ms {
                config.engine.close_grace_ms = ms;
            }
        }
        ExecutionMode::Worker => {
            if let Some(port) = cli.port {
                config.worker.port = port;
            }
            if let Some(ref host) = cli.advertise {
                config.worker.advertise = Some(host.clone());
            }
            if let Some(ms) = grace_ms {
                config.worker.close_grace_ms = ms;
            }
        }
        ExecutionMode::Controller | ExecutionMode::Local => {
            if let Some(port) = cli.port {
                config.controller.port = port;
            }
            if let Some(ref host) = cli.advertise {
                config.controller.advertise = Some(host.clone());
            }
        }
    }
    if let Some(ref address) = cli.engine_address {
        config.engine.address = address.clone();
    }

    // Workers
    if let Some(threads) = cli.threads {
        config.worker.threads = threads;
    }
    if let Some(workers) = cli.workers {
        config.worker.local_workers = workers;
    }

    // Controller
    if cli.visualize {
        config.controller.visualize = true;
    }
    if cli.continue_run {
        config.controller.continue_run = true;
    }
    if let Some(ref interval) = cli.sample_interval {
        config.controller.sample_interval_ms = parse_duration_ms(interval)?;
    }
    if cli.no_keyboard {
        config.controller.keyboard = false;
    }

    // Output
    if let Some(ref dir) = cli.input_dir {
        config.output.input_dir = dir.clone();
    }
    if let Some(ref dir) = cli.output_dir {
        config.output.output_dir = dir.clone();
    }
    if let Some(ref path) = cli.json_summary {
        config.output.json_summary = Some(path.clone());
    }
    if cli.print_events {
        config.output.print_events = true;
    }

    // Runtime
    if let Some(ref level) = cli.log_level {
        config.runtime.log_level = level.clone();
    }
    if cli.debug {
        config.runtime.debug = true;
    }

    Ok(config)
}

/// Parse duration string to milliseconds (e.g., "500ms", "2s", "1m")
///
/// A bare number is taken as milliseconds.
pub fn parse_duration_ms(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        let unit_start = s.len() - 1;
        (&s[..unit_start], &s[unit_start..])
    } else {
        (s, "ms")
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration: {}", num_str))?;

    let millis = match unit {
        "ms" => num,
        "s" => num * 1000,
        "m" => num * 60_000,
        "h" => num * 3_600_000,
        _ => anyhow::bail!("Invalid duration unit: {}. Use ms, s, m, or h", unit),
    };

    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_parse_duration_ms() {
        assert_eq!(parse_duration_ms("500ms").unwrap(), 500);
        assert_eq!(parse_duration_ms("2s").unwrap(), 2000);
        assert_eq!(parse_duration_ms("1m").unwrap(), 60_000);
        assert_eq!(parse_duration_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration_ms("250").unwrap(), 250);
        assert!(parse_duration_ms("").is_err());
        assert!(parse_duration_ms("5d").is_err());
        assert!(parse_duration_ms("fast").is_err());
    }

    #[test]
    fn test_parse_toml_basic() {
        let toml = r#"
[board]
width = 64
height = 32
turns = 100

[engine]
address = "10.0.0.1:8040"

[controller]
visualize = true
sample_interval_ms = 500
"#;

        let config = parse_toml_string(toml).unwrap();
        assert_eq!(config.board.width, 64);
        assert_eq!(config.board.height, 32);
        assert_eq!(config.board.turns, 100);
        assert_eq!(config.engine.address, "10.0.0.1:8040");
        assert_eq!(config.engine.port, 8040);
        assert!(config.controller.visualize);
        assert_eq!(config.controller.sample_interval_ms, 500);
        assert_eq!(config.output.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_parse_toml_empty_is_default() {
        assert_eq!(parse_toml_string("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_toml_rejects_bad_types() {
        assert!(parse_toml_string("[board]\nwidth = \"wide\"\n").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[board]\nwidth = 64\nheight = 64\nturns = 10\n[worker]\nthreads = 2").unwrap();

        let cli = Cli::try_parse_from([
            "golnet".to_string(),
            "--config".to_string(),
            file.path().display().to_string(),
            "--turns".to_string(),
            "50".to_string(),
            "-t".to_string(),
            "6".to_string(),
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.board.width, 64);
        assert_eq!(config.board.turns, 50);
        assert_eq!(config.worker.threads, 6);
    }

    #[test]
    fn test_port_follows_mode() {
        let cli = Cli::try_parse_from(["golnet", "--mode", "engine", "-p", "9100", "--close-grace", "0s"])
            .unwrap();
        let config = merge_cli_with_config(&cli, Config::default()).unwrap();
        assert_eq!(config.engine.port, 9100);
        assert_eq!(config.engine.close_grace_ms, 0);
        assert_eq!(config.worker.port, 8050);
        assert_eq!(config.controller.port, 8030);

        let cli = Cli::try_parse_from(["golnet", "--mode", "worker", "-p", "9200", "--advertise", "node7"])
            .unwrap();
        let config = merge_cli_with_config(&cli, Config::default()).unwrap();
        assert_eq!(config.worker.port, 9200);
        assert_eq!(config.worker.advertise.as_deref(), Some("node7"));
        assert_eq!(config.engine.port, 8040);
    }
}

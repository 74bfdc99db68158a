//! Configuration validation

use super::*;
use crate::config::cli::ExecutionMode;
use anyhow::{Context, Result};

/// Largest accepted board edge
const MAX_BOARD_EDGE: usize = 65_536;

/// Validate complete configuration for the selected mode
pub fn validate_config(config: &Config, mode: ExecutionMode) -> Result<()> {
    match mode {
        ExecutionMode::Engine => validate_engine(&config.engine)?,
        ExecutionMode::Worker => {
            validate_engine_address(&config.engine.address)?;
            validate_worker(&config.worker)?;
        }
        ExecutionMode::Controller => {
            validate_engine_address(&config.engine.address)?;
            validate_board(&config.board)?;
            validate_controller(&config.controller)?;
        }
        ExecutionMode::Local => {
            validate_board(&config.board)?;
            validate_worker(&config.worker)?;
            validate_controller(&config.controller)?;
            if config.worker.local_workers == 0 {
                anyhow::bail!("local mode needs at least 1 worker");
            }
        }
    }
    validate_runtime(&config.runtime)?;

    Ok(())
}

/// Validate board configuration
pub fn validate_board(board: &BoardConfig) -> Result<()> {
    if board.width == 0 || board.height == 0 {
        anyhow::bail!(
            "board must have at least one cell, got {}x{}",
            board.width,
            board.height
        );
    }
    if board.width > MAX_BOARD_EDGE || board.height > MAX_BOARD_EDGE {
        anyhow::bail!(
            "board edges must be at most {}, got {}x{}",
            MAX_BOARD_EDGE,
            board.width,
            board.height
        );
    }
    if let Some(density) = board.random_density {
        if !(0.0..=1.0).contains(&density) {
            anyhow::bail!("random density must be between 0.0 and 1.0, got {}", density);
        }
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<()> {
    if engine.port == 0 {
        anyhow::bail!("engine port must be set");
    }
    Ok(())
}

/// Engine address must be host:port
pub fn validate_engine_address(address: &str) -> Result<()> {
    let (host, port) = address
        .rsplit_once(':')
        .with_context(|| format!("engine address '{}' must be host:port", address))?;
    if host.is_empty() {
        anyhow::bail!("engine address '{}' has no host", address);
    }
    let port: u16 = port
        .parse()
        .with_context(|| format!("engine address '{}' has an invalid port", address))?;
    if port == 0 {
        anyhow::bail!("engine address '{}' has port 0", address);
    }

    Ok(())
}

fn validate_worker(worker: &WorkerConfig) -> Result<()> {
    if worker.threads == 0 || worker.threads > 1024 {
        anyhow::bail!("threads must be between 1 and 1024, got {}", worker.threads);
    }
    Ok(())
}

fn validate_controller(controller: &ControllerConfig) -> Result<()> {
    if controller.sample_interval_ms == 0 {
        anyhow::bail!("sample interval must be greater than zero");
    }
    if controller.visualize && controller.port == 0 {
        anyhow::bail!("visualization needs a controller port");
    }
    Ok(())
}

fn validate_runtime(runtime: &RuntimeConfig) -> Result<()> {
    tracing_subscriber::EnvFilter::try_new(&runtime.log_level)
        .with_context(|| format!("invalid log level '{}'", runtime.log_level))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid_for_every_mode() {
        let config = Config::default();
        for mode in [
            ExecutionMode::Controller,
            ExecutionMode::Engine,
            ExecutionMode::Worker,
            ExecutionMode::Local,
        ] {
            validate_config(&config, mode).unwrap();
        }
    }

    #[test]
    fn test_empty_board_rejected() {
        let mut config = Config::default();
        config.board.width = 0;
        assert!(validate_config(&config, ExecutionMode::Controller).is_err());
        // Engine mode never sees the board
        assert!(validate_config(&config, ExecutionMode::Engine).is_ok());
    }

    #[test]
    fn test_density_range() {
        let mut board = BoardConfig::default();
        board.random_density = Some(1.5);
        assert!(validate_board(&board).is_err());
        board.random_density = Some(0.25);
        assert!(validate_board(&board).is_ok());
    }

    #[test]
    fn test_engine_address() {
        assert!(validate_engine_address("127.0.0.1:8040").is_ok());
        assert!(validate_engine_address("engine.local:9000").is_ok());
        assert!(validate_engine_address("127.0.0.1").is_err());
        assert!(validate_engine_address(":8040").is_err());
        assert!(validate_engine_address("host:http").is_err());
        assert!(validate_engine_address("host:0").is_err());
    }

    #[test]
    fn test_worker_threads() {
        let mut config = Config::default();
        config.worker.threads = 0;
        assert!(validate_config(&config, ExecutionMode::Worker).is_err());
    }

    #[test]
    fn test_local_needs_workers() {
        let mut config = Config::default();
        config.worker.local_workers = 0;
        assert!(validate_config(&config, ExecutionMode::Local).is_err());
    }

    #[test]
    fn test_bad_log_level() {
        let mut config = Config::default();
        config.runtime.log_level = "golnet=loud".to_string();
        assert!(validate_config(&config, ExecutionMode::Engine).is_err());
    }
}

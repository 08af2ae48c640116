//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Largest accepted per-drain buffer.
const MAX_BUFFER_SIZE: usize = 64 * 1024;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    broker_port = config.network.broker_port,
    market_port = config.network.market_port,
    workers = config.workers.worker_count(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    LOG_LEVELS.contains(&config.router.log_level.to_ascii_lowercase().as_str()),
    "log_level must be one of {:?}, got {}",
    LOG_LEVELS,
    config.router.log_level
  );

  // Network validation
  let network = &config.network;
  anyhow::ensure!(!network.host.is_empty(), "network.host must not be empty");
  anyhow::ensure!(
    network.broker_port == 0 || network.broker_port != network.market_port,
    "broker_port and market_port must differ, both are {}",
    network.broker_port
  );

  // Worker validation
  let workers = &config.workers;
  anyhow::ensure!(
    workers.queue_capacity > 0,
    "workers.queue_capacity must be positive"
  );
  anyhow::ensure!(
    workers.buffer_size > 0 && workers.buffer_size <= MAX_BUFFER_SIZE,
    "workers.buffer_size must be in (0, {}], got {}",
    MAX_BUFFER_SIZE,
    workers.buffer_size
  );

  if config.metrics.enabled {
    anyhow::ensure!(
      !config.metrics.bind_address.is_empty(),
      "metrics.bind_address must not be empty when metrics are enabled"
    );
  }

  Ok(())
}

//! Configuration Module - TOML-based Router Configuration
//!
//! Loads and validates configuration from `config.toml`. Every field
//! has a default, so a minimal file (or an empty one) yields a router
//! listening on the standard broker/market ports.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

/// Default broker listener port.
pub const DEFAULT_BROKER_PORT: u16 = 5000;
/// Default market listener port.
pub const DEFAULT_MARKET_PORT: u16 = 5001;
/// Default per-drain read buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Top-level router configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
  /// Router identity and logging.
  #[serde(default)]
  pub router: RouterConfig,
  /// Listener endpoints and per-connection behaviour.
  #[serde(default)]
  pub network: NetworkConfig,
  /// Worker pool sizing.
  #[serde(default)]
  pub workers: WorkerConfig,
  /// Metrics and health probes.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Router identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
  /// Human-readable router name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  /// Host both listeners bind to.
  #[serde(default = "default_host")]
  pub host: String,
  /// Port accepting broker clients. 0 picks an ephemeral port.
  #[serde(default = "default_broker_port")]
  pub broker_port: u16,
  /// Port accepting market clients. 0 picks an ephemeral port.
  #[serde(default = "default_market_port")]
  pub market_port: u16,
  /// Disable Nagle's algorithm on accepted connections.
  #[serde(default = "default_true")]
  pub nodelay: bool,
  /// Send the assigned routing identifier to the client on connect.
  #[serde(default = "default_true")]
  pub announce_id: bool,
  /// Disconnect clients that stay silent this long (0 = never).
  #[serde(default)]
  pub idle_timeout_seconds: u64,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  /// Number of drain workers (0 = 2 × available parallelism).
  #[serde(default)]
  pub size: usize,
  /// Capacity of the bounded drain queue.
  #[serde(default = "default_queue_capacity")]
  pub queue_capacity: usize,
  /// Maximum bytes read per drain task.
  #[serde(default = "default_buffer_size")]
  pub buffer_size: usize,
  /// How long shutdown waits for in-flight drains (seconds).
  #[serde(default = "default_shutdown_grace")]
  pub shutdown_grace_seconds: u64,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl NetworkConfig {
  /// Idle timeout as a duration, `None` when disabled.
  pub fn idle_timeout(&self) -> Option<Duration> {
    (self.idle_timeout_seconds > 0).then(|| Duration::from_secs(self.idle_timeout_seconds))
  }

  /// Bind address of the broker listener.
  pub fn broker_address(&self) -> String {
    format!("{}:{}", self.host, self.broker_port)
  }

  /// Bind address of the market listener.
  pub fn market_address(&self) -> String {
    format!("{}:{}", self.host, self.market_port)
  }
}

impl WorkerConfig {
  /// Effective worker count, resolving 0 to twice the available parallelism.
  pub fn worker_count(&self) -> usize {
    if self.size > 0 {
      return self.size;
    }
    std::thread::available_parallelism()
      .map(|n| n.get() * 2)
      .unwrap_or(4)
  }

  /// Shutdown grace period as a duration.
  pub const fn shutdown_grace(&self) -> Duration {
    Duration::from_secs(self.shutdown_grace_seconds)
  }
}

impl Default for RouterConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
    }
  }
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      host: default_host(),
      broker_port: DEFAULT_BROKER_PORT,
      market_port: DEFAULT_MARKET_PORT,
      nodelay: true,
      announce_id: true,
      idle_timeout_seconds: 0,
    }
  }
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      size: 0,
      queue_capacity: default_queue_capacity(),
      buffer_size: DEFAULT_BUFFER_SIZE,
      shutdown_grace_seconds: default_shutdown_grace(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "fixme-router".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_host() -> String {
  "127.0.0.1".to_string()
}

const fn default_broker_port() -> u16 {
  DEFAULT_BROKER_PORT
}

const fn default_market_port() -> u16 {
  DEFAULT_MARKET_PORT
}

const fn default_true() -> bool {
  true
}

const fn default_queue_capacity() -> usize {
  1024
}

const fn default_buffer_size() -> usize {
  DEFAULT_BUFFER_SIZE
}

const fn default_shutdown_grace() -> u64 {
  5
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

const fn default_health_port() -> u16 {
  8080
}

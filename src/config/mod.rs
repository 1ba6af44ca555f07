//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! The recent-orders capacity and open-order policy live here so the
//! domain layer stays free of deployment knobs.

pub mod loader;

use serde::Deserialize;

use crate::domain::RECENT_ORDERS_CAPACITY;

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the first event is reconciled.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Reconciliation policy.
  #[serde(default)]
  pub ledger: LedgerConfig,
  /// Snapshot persistence.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Reconciliation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
  /// Capacity of the per-stream recent-orders buffer.
  #[serde(default = "default_recent_capacity")]
  pub recent_capacity: usize,
  /// Keep open orders keyed by id (upsert on `open`, drop on anything else).
  #[serde(default)]
  pub strict_open_set: bool,
  /// Buffer size of the ledger update broadcast channel.
  #[serde(default = "default_update_channel_capacity")]
  pub update_channel_capacity: usize,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Write a snapshot after every reconciled event.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Directory for per-stream JSON snapshots.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Serve `/metrics`, `/live` and `/ready`.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// HTTP bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      recent_capacity: default_recent_capacity(),
      strict_open_set: false,
      update_channel_capacity: default_update_channel_capacity(),
    }
  }
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      data_dir: default_data_dir(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

const fn default_recent_capacity() -> usize {
  RECENT_ORDERS_CAPACITY
}

const fn default_update_channel_capacity() -> usize {
  1024
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

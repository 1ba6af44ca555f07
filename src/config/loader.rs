//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Environment variable naming an alternative config path.
pub const CONFIG_PATH_ENV: &str = "LEDGER_CONFIG";

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
    service = %config.service.name,
    recent_capacity = config.ledger.recent_capacity,
    strict_open_set = config.ledger.strict_open_set,
    persistence = config.persistence.enabled,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Resolve the config path from `LEDGER_CONFIG`, falling back to `config.toml`.
pub fn config_path_from_env() -> String {
  std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string())
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.trim().is_empty(),
    "service.name must not be empty"
  );

  anyhow::ensure!(
    config.ledger.recent_capacity > 0,
    "ledger.recent_capacity must be positive, got {}",
    config.ledger.recent_capacity
  );
  anyhow::ensure!(
    config.ledger.update_channel_capacity > 0,
    "ledger.update_channel_capacity must be positive"
  );

  if config.persistence.enabled {
    anyhow::ensure!(
      !config.persistence.data_dir.is_empty(),
      "persistence.data_dir must not be empty when persistence is enabled"
    );
  }

  if config.metrics.enabled {
    anyhow::ensure!(
      config.metrics.bind_address.parse::<std::net::SocketAddr>().is_ok(),
      "metrics.bind_address is not a socket address: {}",
      config.metrics.bind_address
    );
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = parse_config("[service]\nname = \"watch-worker\"\n").unwrap();
    assert_eq!(config.service.log_level, "info");
    assert_eq!(config.ledger.recent_capacity, 40);
    assert!(!config.ledger.strict_open_set);
    assert!(config.persistence.enabled);
    assert_eq!(config.persistence.data_dir, "data");
    assert_eq!(config.metrics.bind_address, "0.0.0.0:9090");
  }

  #[test]
  fn test_full_config() {
    let toml = r#"
      [service]
      name = "watch-worker"
      log_level = "debug"

      [ledger]
      recent_capacity = 10
      strict_open_set = true
      update_channel_capacity = 16

      [persistence]
      enabled = false
      data_dir = "/tmp/ledgers"

      [metrics]
      enabled = false
      bind_address = "127.0.0.1:9100"
    "#;
    let config = parse_config(toml).unwrap();
    assert_eq!(config.ledger.recent_capacity, 10);
    assert!(config.ledger.strict_open_set);
    assert!(!config.persistence.enabled);
    assert_eq!(config.metrics.bind_address, "127.0.0.1:9100");
  }

  #[test]
  fn test_zero_capacity_rejected() {
    let toml = "[service]\nname = \"w\"\n[ledger]\nrecent_capacity = 0\n";
    let err = parse_config(toml).unwrap_err();
    assert!(err.to_string().contains("recent_capacity"));
  }

  #[test]
  fn test_bad_bind_address_rejected() {
    let toml = "[service]\nname = \"w\"\n[metrics]\nbind_address = \"nope\"\n";
    assert!(parse_config(toml).is_err());
  }
}

//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
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

  let config: AppConfig = toml::from_str(&content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;

  info!(
    node = %config.node.name,
    chain_id = config.ledger.chain_id,
    contract = %config.ledger.contract_address,
    relay = config.overlay.relay_url.is_some(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty endpoint URLs and addresses
/// - Well-formed contract address
/// - Sensible channel and sweep parameters
fn validate_config(config: &AppConfig) -> Result<()> {
  // Ledger validation
  anyhow::ensure!(
    !config.ledger.rpc_url.is_empty(),
    "RPC URL must not be empty"
  );
  anyhow::ensure!(
    config.ledger.chain_id > 0,
    "chain_id must be positive, got {}",
    config.ledger.chain_id
  );
  anyhow::ensure!(
    config.ledger.contract_address.starts_with("0x")
      && config.ledger.contract_address.len() == 42,
    "contract_address must be a 0x-prefixed 20-byte address, got {}",
    config.ledger.contract_address
  );

  // Overlay validation
  if let Some(relay_url) = &config.overlay.relay_url {
    anyhow::ensure!(
      relay_url.starts_with("ws://") || relay_url.starts_with("wss://"),
      "relay_url must be a ws:// or wss:// URL, got {relay_url}"
    );
  }
  anyhow::ensure!(
    config.overlay.channel_capacity > 0,
    "channel_capacity must be positive"
  );

  // Persistence validation
  anyhow::ensure!(
    !config.persistence.data_dir.is_empty(),
    "data_dir must not be empty"
  );
  anyhow::ensure!(
    config.persistence.sweep_interval_seconds > 0,
    "sweep_interval_seconds must be positive"
  );
  anyhow::ensure!(
    config.persistence.intent_ttl_seconds > config.persistence.sweep_interval_seconds,
    "intent_ttl_seconds must exceed sweep_interval_seconds"
  );

  Ok(())
}

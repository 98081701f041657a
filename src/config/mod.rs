//! Configuration Module - TOML-based Node Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Contract addresses, chain parameters, and relay endpoints are
//! externalized here - nothing is hardcoded in the domain layer.
//! The wallet private key is never placed in the file; it is read
//! from the `WALLET_PRIVATE_KEY` environment variable at startup.

pub mod loader;

use serde::Deserialize;

/// Top-level node configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the node begins serving.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Node identity and metadata.
  pub node: NodeConfig,
  /// On-chain ledger connection parameters.
  pub ledger: LedgerConfig,
  /// Overlay mesh and relay parameters.
  pub overlay: OverlayConfig,
  /// HTTP API surface.
  pub api: ApiConfig,
  /// Metrics and monitoring.
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  pub persistence: PersistenceConfig,
}

/// Node identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
  /// Human-readable node name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// On-chain ledger connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
  /// JSON-RPC endpoint URL.
  pub rpc_url: String,
  /// Expected chain id. Startup fails if the endpoint reports another.
  pub chain_id: u64,
  /// Options ledger contract address (0x-prefixed).
  pub contract_address: String,
}

/// Overlay mesh configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
  /// Relay peer WebSocket URL. When absent the node runs standalone
  /// and the mesh store stays process-local.
  pub relay_url: Option<String>,
  /// Broadcast channel capacity for topic and egress channels.
  #[serde(default = "default_channel_capacity")]
  pub channel_capacity: usize,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// API server bind address.
  #[serde(default = "default_api_addr")]
  pub bind_address: String,
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

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for the JSONL intent outbox.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Outbox sweep interval (seconds).
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_seconds: u64,
  /// Age after which an open intent is marked expired (seconds).
  #[serde(default = "default_intent_ttl")]
  pub intent_ttl_seconds: u64,
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_channel_capacity() -> usize {
  256
}

fn default_api_addr() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8081
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_sweep_interval() -> u64 {
  60
}

fn default_intent_ttl() -> u64 {
  900
}

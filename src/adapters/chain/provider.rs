//! RPC Provider - alloy-rs 0.9 Connection Management
//!
//! Manages the connection to the ledger chain via alloy-rs. Validates RPC
//! connectivity and chain id at startup and exposes a shared provider
//! instance for all on-chain operations.
//!
//! In alloy 0.9, `ProviderBuilder::new().on_http()` returns a complex
//! filler type. We store it as a type-erased `dyn Provider` to keep the
//! API clean across the adapter layer.

use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::config::LedgerConfig;

/// Env var holding the submission wallet's private key.
const WALLET_KEY_ENV: &str = "WALLET_PRIVATE_KEY";

/// Shared RPC provider backed by alloy-rs 0.9.
///
/// All chain adapters share a single provider instance. When a wallet key
/// is present in the environment the provider signs and fills outgoing
/// transactions; without one the node runs read-only and every submission
/// fails fast with a wallet-unavailable error.
pub struct RpcProvider {
    /// The alloy HTTP provider (type-erased).
    provider: Arc<dyn Provider<Http<Client>> + Send + Sync>,
    /// Address of the configured signer, if any.
    signer_address: Option<Address>,
    /// RPC endpoint URL (for diagnostics, never logged with secrets).
    #[allow(dead_code)]
    rpc_url: String,
}

impl RpcProvider {
    /// Connect to the configured RPC endpoint and validate the chain id.
    ///
    /// Reads the wallet key from `WALLET_PRIVATE_KEY` when present; a
    /// missing key is not an error here, only at submission time.
    #[instrument(skip_all)]
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        let rpc_url = config.rpc_url.clone();
        let url = rpc_url.parse().context("Invalid RPC URL")?;

        let (provider, signer_address): (Arc<dyn Provider<Http<Client>> + Send + Sync>, Option<Address>) =
            match load_signer()? {
                Some(signer) => {
                    let address = signer.address();
                    let wallet = EthereumWallet::from(signer);
                    let provider = ProviderBuilder::new().wallet(wallet).on_http(url);
                    (Arc::new(provider), Some(address))
                }
                None => {
                    warn!("No {WALLET_KEY_ENV} set — running read-only, submissions will fail");
                    let provider = ProviderBuilder::new().on_http(url);
                    (Arc::new(provider), None)
                }
            };

        let chain_id = provider
            .get_chain_id()
            .await
            .context("Failed to query chain ID")?;

        if chain_id != config.chain_id {
            anyhow::bail!(
                "Expected chain_id={}, got {chain_id} — check config.toml",
                config.chain_id
            );
        }

        info!(chain_id, signer = ?signer_address, "Connected to ledger RPC");

        Ok(Self {
            provider,
            signer_address,
            rpc_url,
        })
    }

    /// Get a shared reference to the alloy provider (type-erased).
    pub fn inner(&self) -> Arc<dyn Provider<Http<Client>> + Send + Sync> {
        Arc::clone(&self.provider)
    }

    /// Address of the configured signer, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer_address
    }

    /// Check if the RPC connection is healthy via a lightweight call.
    pub async fn is_healthy(&self) -> bool {
        self.provider.get_block_number().await.is_ok()
    }
}

/// Load the submission signer from the environment, if configured.
fn load_signer() -> Result<Option<PrivateKeySigner>> {
    match std::env::var(WALLET_KEY_ENV) {
        Ok(key) => {
            let signer: PrivateKeySigner = key
                .trim()
                .parse()
                .context("Invalid WALLET_PRIVATE_KEY — expected 32-byte hex key")?;
            Ok(Some(signer))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).context("Failed to read WALLET_PRIVATE_KEY"),
    }
}

//! Options Ledger Contract - `LedgerClient` Implementation
//!
//! Implements the `LedgerClient` port against the options-trading ledger
//! contract via alloy-rs 0.9. The contract address comes from
//! `config.toml` and is validated on-chain at startup (code existence).
//!
//! The on-chain order struct carries no transaction hash, so the creating
//! hash of each settled order is resolved separately from `OptionCreated`
//! event logs; reconciliation uses those hashes as dedup keys.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::domain::order::{attached_value, LedgerOrder, OptionType, OrderAction};
use crate::ports::ledger::{LedgerClient, OrderRequest, SubmissionReceipt};

use super::provider::RpcProvider;

alloy::sol! {
    /// On-chain order struct as returned by `getOrdersDetails`.
    struct OptionData {
        address trader;
        string optionType;
        string action;
        uint256 lots;
        uint256 strikePrice;
        uint256 premium;
        uint256 expiry;
        bool isActive;
    }

    event OptionCreated(
        uint256 indexed optionId,
        address indexed trader,
        string optionType,
        string action,
        uint256 lots,
        uint256 strikePrice,
        uint256 premium,
        uint256 expiry
    );

    function createOption(
        string _optionType,
        string _action,
        uint256 _lots,
        uint256 _strikePrice,
        uint256 _premium,
        uint256 _expiry
    ) payable returns (uint256);

    function getOrdersByTrader(address trader) view returns (uint256[]);

    function getOrdersDetails(uint256[] ids) view returns (OptionData[]);
}

/// Implements ledger operations against the options contract.
pub struct OptionsLedger {
    /// Shared RPC provider.
    provider: Arc<RpcProvider>,
    /// Deployed contract address from config.
    address: Address,
}

impl OptionsLedger {
    /// Create and validate the ledger binding.
    ///
    /// Validates that the contract address has deployed code on-chain,
    /// so misconfiguration fails at startup instead of at first use.
    #[instrument(skip_all)]
    pub async fn new(provider: Arc<RpcProvider>, address: Address) -> Result<Self> {
        let code = provider
            .inner()
            .get_code_at(address)
            .await
            .context("Failed to query contract code")?;

        if code.is_empty() {
            bail!("Contract at {address} has no deployed code — check config.toml");
        }

        info!(address = %address, "Validated options ledger on-chain");

        Ok(Self { provider, address })
    }

    /// Lowercase hex form of the contract address (domain identifier).
    pub fn contract_address(&self) -> String {
        format!("{:#x}", self.address)
    }

    /// Execute a read-only call and return the raw return bytes.
    async fn call(&self, calldata: Vec<u8>) -> Result<alloy::primitives::Bytes> {
        let tx = TransactionRequest::default()
            .to(self.address)
            .input(calldata.into());

        self.provider
            .inner()
            .call(&tx)
            .await
            .context("Ledger view call failed")
    }
}

#[async_trait]
impl LedgerClient for OptionsLedger {
    #[instrument(skip(self, request), fields(action = %request.action, lots = request.lots))]
    async fn submit_order(&self, request: &OrderRequest) -> Result<SubmissionReceipt> {
        let value = attached_value(request.action, request.premium, request.lots);

        let calldata = createOptionCall {
            _optionType: request.option_type.to_string(),
            _action: request.action.to_string(),
            _lots: U256::from(request.lots),
            _strikePrice: request.strike_price,
            _premium: request.premium,
            _expiry: U256::from(request.expiry),
        }
        .abi_encode();

        let tx = TransactionRequest::default()
            .to(self.address)
            .value(value)
            .input(calldata.into());

        // Suspends until at least one confirmation; no cancellation path
        // exists once dispatched. Timeout policy belongs to the transport.
        let receipt = self
            .provider
            .inner()
            .send_transaction(tx)
            .await
            .context("Ledger submission dispatch failed")?
            .get_receipt()
            .await
            .context("Ledger confirmation wait failed")?;

        if !receipt.status() {
            bail!(
                "createOption reverted in tx {:#x}",
                receipt.transaction_hash
            );
        }

        let option_id = receipt
            .inner
            .logs()
            .iter()
            .filter(|log| log.topic0() == Some(&OptionCreated::SIGNATURE_HASH))
            .find_map(|log| OptionCreated::decode_log(&log.inner, true).ok())
            .map(|ev| ev.data.optionId.to::<u64>());

        if option_id.is_none() {
            warn!(
                tx_hash = %receipt.transaction_hash,
                "OptionCreated event missing from receipt"
            );
        }

        info!(
            tx_hash = %receipt.transaction_hash,
            option_id = ?option_id,
            value = %value,
            "Order settled on ledger"
        );

        Ok(SubmissionReceipt {
            tx_hash: format!("{:#x}", receipt.transaction_hash),
            option_id,
            block_number: receipt.block_number,
        })
    }

    #[instrument(skip(self))]
    async fn orders_by_trader(&self, trader: &str) -> Result<Vec<u64>> {
        let trader: Address = trader.parse().context("Invalid trader address")?;

        let calldata = getOrdersByTraderCall { trader }.abi_encode();
        let bytes = self.call(calldata).await?;

        let ids = getOrdersByTraderCall::abi_decode_returns(&bytes, true)
            .context("Failed to decode getOrdersByTrader return")?
            ._0;

        Ok(ids.into_iter().map(|id| id.to::<u64>()).collect())
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn order_details(&self, ids: &[u64]) -> Result<Vec<LedgerOrder>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let calldata = getOrdersDetailsCall {
            ids: ids.iter().map(|&id| U256::from(id)).collect(),
        }
        .abi_encode();
        let bytes = self.call(calldata).await?;

        let details = getOrdersDetailsCall::abi_decode_returns(&bytes, true)
            .context("Failed to decode getOrdersDetails return")?
            ._0;

        ids.iter()
            .zip(details)
            .map(|(&id, data)| decode_order(id, data))
            .collect()
    }

    #[instrument(skip(self))]
    async fn creation_hashes(&self) -> Result<HashMap<u64, String>> {
        let filter = Filter::new()
            .address(self.address)
            .event_signature(OptionCreated::SIGNATURE_HASH)
            .from_block(0u64);

        let logs = self
            .provider
            .inner()
            .get_logs(&filter)
            .await
            .context("OptionCreated log query failed")?;

        let mut hashes = HashMap::with_capacity(logs.len());
        for log in logs {
            let Some(tx_hash) = log.transaction_hash else {
                continue;
            };
            match OptionCreated::decode_log(&log.inner, true) {
                Ok(ev) => {
                    hashes.insert(ev.data.optionId.to::<u64>(), format!("{tx_hash:#x}"));
                }
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable OptionCreated log");
                }
            }
        }

        Ok(hashes)
    }

    fn signer_address(&self) -> Option<String> {
        self.provider.signer_address().map(|a| format!("{a:#x}"))
    }

    async fn signer_balance(&self) -> Result<U256> {
        let signer = self
            .provider
            .signer_address()
            .context("No signer configured")?;

        self.provider
            .inner()
            .get_balance(signer)
            .await
            .context("Balance query failed")
    }

    async fn is_healthy(&self) -> bool {
        self.provider.is_healthy().await
    }
}

/// Map an on-chain order struct to the domain representation.
///
/// The creating transaction hash is not known at this point; the caller
/// annotates it from `creation_hashes` when dedup requires it.
fn decode_order(option_id: u64, data: OptionData) -> Result<LedgerOrder> {
    let option_type = match data.optionType.as_str() {
        "call" => OptionType::Call,
        "put" => OptionType::Put,
        other => bail!("Unknown option type on ledger: {other:?}"),
    };
    let action = match data.action.as_str() {
        "buy" => OrderAction::Buy,
        "sell" => OrderAction::Sell,
        other => bail!("Unknown order action on ledger: {other:?}"),
    };

    Ok(LedgerOrder {
        option_id,
        trader: format!("{:#x}", data.trader),
        option_type,
        action,
        lots: data.lots.to::<u64>(),
        strike_price: data.strikePrice,
        premium: data.premium,
        expiry: data.expiry.to::<u64>(),
        is_active: data.isActive,
        tx_hash: None,
    })
}

//! Ledger Client Port - Authoritative On-chain Interface
//!
//! Defines the trait for interacting with the options-trading ledger
//! contract: submitting orders and querying settled orders by trader.
//! Uses alloy-rs. Monetary fields cross this boundary as 18-decimal
//! fixed-point integers; decimal rendering happens only at the
//! presentation boundary.

use std::collections::HashMap;

use alloy::primitives::U256;
use async_trait::async_trait;

use crate::domain::order::{LedgerOrder, OptionType, OrderAction};

/// Parameters for a `createOption` submission.
#[derive(Debug, Clone)]
pub struct OrderRequest {
  pub option_type: OptionType,
  pub action: OrderAction,
  /// Number of lots (positive).
  pub lots: u64,
  /// Strike price, 18-decimal fixed point.
  pub strike_price: U256,
  /// Premium per lot, 18-decimal fixed point.
  pub premium: U256,
  /// Expiry as Unix seconds.
  pub expiry: u64,
}

/// Receipt of an included `createOption` transaction.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
  /// Hash of the included transaction.
  pub tx_hash: String,
  /// Ledger-assigned order id from the `OptionCreated` event, when the
  /// event could be decoded from the receipt.
  pub option_id: Option<u64>,
  /// Block number of inclusion.
  pub block_number: Option<u64>,
}

/// Trait for on-chain ledger interactions via alloy-rs.
///
/// Submission suspends the caller until at least one confirmation is
/// observed; there is no cancellation path once dispatched. Every
/// operation is attempt-once — no retries exist at this layer.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
  /// Submit an order, attaching value `premium × lots` for buys and zero
  /// for sells. Awaits inclusion before returning.
  async fn submit_order(&self, request: &OrderRequest) -> anyhow::Result<SubmissionReceipt>;

  /// Ledger-assigned order ids for a trader, in ledger read order.
  async fn orders_by_trader(&self, trader: &str) -> anyhow::Result<Vec<u64>>;

  /// Full order details for a set of ids, in the given order.
  async fn order_details(&self, ids: &[u64]) -> anyhow::Result<Vec<LedgerOrder>>;

  /// Map of order id to creating transaction hash, resolved from
  /// `OptionCreated` event logs. Used by reconciliation for dedup.
  async fn creation_hashes(&self) -> anyhow::Result<HashMap<u64, String>>;

  /// Address of the configured signer, if any. `None` means no wallet is
  /// reachable and any submission must fail immediately.
  fn signer_address(&self) -> Option<String>;

  /// Native balance of the signer wallet (18-decimal fixed point).
  async fn signer_balance(&self) -> anyhow::Result<U256>;

  /// Check if the RPC connection is healthy.
  async fn is_healthy(&self) -> bool;
}

//! Intent Outbox Port - Durable Submission Intents
//!
//! Defines the trait for the durable local outbox that replaces the bare
//! untransacted dual-write: a submission intent is persisted before any
//! overlay or ledger write, marked fulfilled on confirmation, and swept
//! periodically so intents that never reached confirmation are expired
//! instead of lingering silently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::order::{ContractAddress, OptionType, OrderAction, OverlayKey};

/// Lifecycle state of a submission intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
  /// Persisted; ledger submission not yet resolved.
  Open,
  /// Ledger confirmed; paired overlay record was promoted.
  Fulfilled,
  /// Ledger rejected; paired overlay record is a permanent orphan.
  Failed,
  /// Swept after exceeding the configured TTL without resolution.
  Expired,
}

/// A durable record of one submission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionIntent {
  /// Unique intent id.
  pub id: uuid::Uuid,
  /// Ledger instance the order targets.
  pub contract_address: ContractAddress,
  /// Overlay key of the paired speculative record.
  pub overlay_key: OverlayKey,
  pub option_type: OptionType,
  pub action: OrderAction,
  pub lots: u64,
  /// Strike price, 18-decimal fixed point.
  pub strike_price: alloy::primitives::U256,
  /// Premium per lot, 18-decimal fixed point.
  pub premium: alloy::primitives::U256,
  pub expiry: u64,
  /// Account that initiated the submission.
  pub account_address: String,
  pub state: IntentState,
  /// Transaction hash once fulfilled.
  pub tx_hash: Option<String>,
  /// Failure detail for failed intents.
  pub error: Option<String>,
  /// Creation instant (Unix ms).
  pub created_at_ms: u64,
  /// Last state change (Unix ms).
  pub updated_at_ms: u64,
}

/// Trait for durable intent persistence.
///
/// Append-only JSONL semantics: state changes are appended as fresh
/// versions of the intent; readers keep the latest version per id.
#[async_trait]
pub trait IntentOutbox: Send + Sync + 'static {
  /// Persist a new open intent. Must be durable before returning.
  async fn record_intent(&self, intent: &SubmissionIntent) -> anyhow::Result<()>;

  /// Mark an intent fulfilled with its transaction hash.
  async fn mark_fulfilled(&self, id: uuid::Uuid, tx_hash: &str) -> anyhow::Result<()>;

  /// Mark an intent failed with a reason.
  async fn mark_failed(&self, id: uuid::Uuid, error: &str) -> anyhow::Result<()>;

  /// Mark an intent expired (sweep outcome).
  async fn mark_expired(&self, id: uuid::Uuid) -> anyhow::Result<()>;

  /// Latest version of every intent still in [`IntentState::Open`].
  async fn open_intents(&self) -> anyhow::Result<Vec<SubmissionIntent>>;

  /// Check if the outbox is writable.
  async fn is_healthy(&self) -> bool;
}

//! Overlay Store Port - Eventually-Consistent Gossip Interface
//!
//! Defines the trait for the topic-addressed key/value broadcast store
//! used to announce orders before (and regardless of) ledger
//! confirmation. The store is eventually consistent: `put` merges
//! field-by-field with last-writer-wins per field, and subscription
//! delivery is at-least-once and unordered across peers. Nothing is
//! guaranteed during a peer's disconnection window.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::order::{OverlayKey, OverlayRecord};

/// A delivered overlay mutation.
///
/// Carries the merged record after the write was applied. Subscribers
/// must treat each delivery as an independent, stateless trigger.
#[derive(Debug, Clone)]
pub struct OverlayEvent {
  /// Overlay key of the mutated record.
  pub key: OverlayKey,
  /// Topic the mutation was published under.
  pub topic: String,
  /// Merged record value after the write.
  pub record: OverlayRecord,
  /// Wall-clock millis carried by the winning envelope.
  pub written_at_ms: u64,
}

/// Trait for overlay store providers.
///
/// Topics are partitioned per contract address (`orders/{contract}`), so
/// a subscriber only receives events relevant to it.
#[async_trait]
pub trait OverlayStore: Send + Sync + 'static {
  /// Merge a record into the addressed key, field-by-field
  /// last-writer-wins. The explicit `written_at_ms` is the logical
  /// write stamp carried on the wire — never implicit call order.
  async fn put(
    &self,
    key: &str,
    record: &OverlayRecord,
    written_at_ms: u64,
  ) -> anyhow::Result<()>;

  /// Current merged value for a key, if any.
  async fn get(&self, key: &str) -> anyhow::Result<Option<OverlayRecord>>;

  /// All records currently known for one contract's topic.
  async fn snapshot(&self, contract_address: &str) -> anyhow::Result<Vec<OverlayRecord>>;

  /// Subscribe to mutations for one contract's topic.
  ///
  /// Delivery is at-least-once and unordered; a lagged receiver must
  /// fall back to a full [`OverlayStore::snapshot`].
  fn subscribe(&self, contract_address: &str) -> broadcast::Receiver<OverlayEvent>;

  /// Check if the store (and its relay link, when configured) is healthy.
  async fn is_healthy(&self) -> bool;
}

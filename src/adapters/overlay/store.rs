//! Mesh Store - Topic-Addressed LWW Key/Value Broadcast Store
//!
//! In-process implementation of the `OverlayStore` port. Each key holds a
//! JSON object merged field-by-field under last-writer-wins, driven by the
//! explicit `written_at_ms` stamp carried in every put envelope — never by
//! implicit call order. Ties are broken deterministically by value
//! ordering so all peers converge on the same merge result.
//!
//! Mutations are broadcast on per-contract topics (`orders/{contract}`),
//! and every locally-originated envelope is also pushed onto an egress
//! channel the relay link forwards to remote peers. Delivery to
//! subscribers is at-least-once and unordered; a lagged subscriber must
//! fall back to a full snapshot.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::domain::order::{overlay_topic, OverlayRecord};
use crate::ports::overlay::{OverlayEvent, OverlayStore};

/// Wire format for one overlay mutation.
///
/// This is what crosses the relay link: the addressed key, its topic, the
/// explicit write stamp, and the record as announced by the writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutEnvelope {
    pub key: String,
    pub topic: String,
    pub written_at_ms: u64,
    pub record: OverlayRecord,
}

/// One stored node: merged field values plus a per-field write clock.
#[derive(Debug, Clone, Default)]
struct StoredNode {
    topic: String,
    values: BTreeMap<String, serde_json::Value>,
    clocks: BTreeMap<String, u64>,
}

impl StoredNode {
    /// Merge incoming fields under per-field LWW.
    ///
    /// A field is taken when its stamp is newer, or on an equal stamp when
    /// its serialized value orders after the stored one (deterministic
    /// convergence across peers). Returns true when anything changed.
    fn merge(&mut self, fields: &serde_json::Map<String, serde_json::Value>, stamp: u64) -> bool {
        let mut changed = false;
        for (name, incoming) in fields {
            let take = match (self.clocks.get(name), self.values.get(name)) {
                (Some(&existing_stamp), Some(existing)) => {
                    stamp > existing_stamp
                        || (stamp == existing_stamp
                            && incoming.to_string() > existing.to_string())
                }
                _ => true,
            };
            if take && self.values.get(name) != Some(incoming) {
                self.values.insert(name.clone(), incoming.clone());
                self.clocks.insert(name.clone(), stamp);
                changed = true;
            } else if take {
                // Same value, newer stamp: advance the clock silently.
                self.clocks.insert(name.clone(), stamp);
            }
        }
        changed
    }

    fn record(&self) -> Result<OverlayRecord> {
        let object = serde_json::Value::Object(self.values.clone().into_iter().collect());
        serde_json::from_value(object).context("Stored node does not decode to a record")
    }
}

/// In-process eventually-consistent overlay store.
///
/// The topics map uses a std mutex: its critical sections are short and
/// never cross an await point, and `subscribe` must be callable from sync
/// constructors.
pub struct MeshStore {
    nodes: RwLock<HashMap<String, StoredNode>>,
    topics: std::sync::Mutex<HashMap<String, broadcast::Sender<OverlayEvent>>>,
    /// Locally-originated envelopes, consumed by the relay link.
    egress_tx: broadcast::Sender<PutEnvelope>,
    channel_capacity: usize,
}

impl MeshStore {
    pub fn new(channel_capacity: usize) -> Self {
        let (egress_tx, _) = broadcast::channel(channel_capacity);
        Self {
            nodes: RwLock::new(HashMap::new()),
            topics: std::sync::Mutex::new(HashMap::new()),
            egress_tx,
            channel_capacity,
        }
    }

    /// Subscribe to locally-originated envelopes (relay outbound side).
    pub fn egress_subscribe(&self) -> broadcast::Receiver<PutEnvelope> {
        self.egress_tx.subscribe()
    }

    /// Apply an envelope received from a remote peer.
    ///
    /// Identical merge semantics to a local put, but the envelope is not
    /// re-forwarded to the relay (echoes converge to no-ops instead of
    /// looping).
    pub async fn apply_remote(&self, envelope: PutEnvelope) -> Result<()> {
        self.apply(envelope, false).await
    }

    async fn apply(&self, envelope: PutEnvelope, local_origin: bool) -> Result<()> {
        let fields = match serde_json::to_value(&envelope.record)
            .context("Record serialization failed")?
        {
            serde_json::Value::Object(map) => map,
            _ => anyhow::bail!("Record did not serialize to an object"),
        };

        let (changed, merged) = {
            let mut nodes = self.nodes.write().await;
            let node = nodes.entry(envelope.key.clone()).or_insert_with(|| StoredNode {
                topic: envelope.topic.clone(),
                ..StoredNode::default()
            });
            let changed = node.merge(&fields, envelope.written_at_ms);
            (changed, node.record())
        };

        let merged = match merged {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %envelope.key, error = %e, "Merged node undecodable, event suppressed");
                return Ok(());
            }
        };

        if changed {
            let event = OverlayEvent {
                key: envelope.key.clone(),
                topic: envelope.topic.clone(),
                record: merged,
                written_at_ms: envelope.written_at_ms,
            };
            let receivers = {
                let topics = self.topics.lock().expect("topics mutex poisoned");
                topics
                    .get(&envelope.topic)
                    .map_or(0, |tx| tx.send(event).unwrap_or(0))
            };
            debug!(key = %envelope.key, receivers, "Overlay mutation broadcast");
        }

        if local_origin {
            let _ = self.egress_tx.send(envelope);
        }

        Ok(())
    }
}

#[async_trait]
impl OverlayStore for MeshStore {
    async fn put(&self, key: &str, record: &OverlayRecord, written_at_ms: u64) -> Result<()> {
        let envelope = PutEnvelope {
            key: key.to_string(),
            topic: overlay_topic(&record.contract_address),
            written_at_ms,
            record: record.clone(),
        };
        self.apply(envelope, true).await
    }

    async fn get(&self, key: &str) -> Result<Option<OverlayRecord>> {
        let nodes = self.nodes.read().await;
        nodes.get(key).map(StoredNode::record).transpose()
    }

    async fn snapshot(&self, contract_address: &str) -> Result<Vec<OverlayRecord>> {
        let topic = overlay_topic(contract_address);
        let nodes = self.nodes.read().await;

        let mut records = Vec::new();
        for node in nodes.values().filter(|n| n.topic == topic) {
            match node.record() {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping undecodable overlay node"),
            }
        }
        Ok(records)
    }

    fn subscribe(&self, contract_address: &str) -> broadcast::Receiver<OverlayEvent> {
        let topic = overlay_topic(contract_address);

        let mut topics = self.topics.lock().expect("topics mutex poisoned");
        topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe()
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

//! JSONL Intent Outbox - Durable Submission Intents
//!
//! Persists submission intents to `outbox/intents.jsonl`. Each line is a
//! self-contained JSON version of an intent; state changes append fresh
//! versions and readers keep the latest version per id. Append-only
//! writes survive crashes mid-submission: an intent with no later
//! fulfilled/failed version is exactly an unresolved submission.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::ports::outbox::{IntentOutbox, IntentState, SubmissionIntent};

/// Append-only JSONL outbox.
pub struct JsonlOutbox {
    /// Path of the intent log file.
    log_path: PathBuf,
    /// Serializes appends so concurrent state changes interleave whole
    /// lines, never partial ones.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlOutbox {
    /// Create a new outbox under the given data directory.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir).join("outbox");
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create outbox directory")?;

        Ok(Self {
            log_path: dir.join("intents.jsonl"),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn append(&self, intent: &SubmissionIntent) -> Result<()> {
        let mut json =
            serde_json::to_string(intent).context("Failed to serialize intent")?;
        json.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .context("Failed to open intent log")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write intent")?;
        file.flush().await.context("Failed to flush intent log")?;

        Ok(())
    }

    /// Latest version of every intent, keyed by id.
    async fn latest_versions(&self) -> Result<HashMap<Uuid, SubmissionIntent>> {
        let content = match fs::read_to_string(&self.log_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e).context("Failed to read intent log"),
        };

        let mut latest = HashMap::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SubmissionIntent>(line) {
                Ok(intent) => {
                    latest.insert(intent.id, intent);
                }
                Err(e) => {
                    warn!(error = %e, "Skipping malformed intent line");
                }
            }
        }
        Ok(latest)
    }

    async fn transition(
        &self,
        id: Uuid,
        state: IntentState,
        tx_hash: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let latest = self.latest_versions().await?;
        let Some(mut intent) = latest.get(&id).cloned() else {
            anyhow::bail!("Unknown intent id {id}");
        };

        intent.state = state;
        intent.tx_hash = tx_hash.map(str::to_string).or(intent.tx_hash);
        intent.error = error.map(str::to_string).or(intent.error);
        intent.updated_at_ms = Utc::now().timestamp_millis() as u64;

        self.append(&intent).await
    }
}

#[async_trait]
impl IntentOutbox for JsonlOutbox {
    #[instrument(skip(self, intent), fields(intent = %intent.id))]
    async fn record_intent(&self, intent: &SubmissionIntent) -> Result<()> {
        self.append(intent).await?;
        info!(overlay_key = %intent.overlay_key, "Submission intent persisted");
        Ok(())
    }

    async fn mark_fulfilled(&self, id: Uuid, tx_hash: &str) -> Result<()> {
        self.transition(id, IntentState::Fulfilled, Some(tx_hash), None)
            .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        self.transition(id, IntentState::Failed, None, Some(error))
            .await
    }

    async fn mark_expired(&self, id: Uuid) -> Result<()> {
        self.transition(id, IntentState::Expired, None, None).await
    }

    async fn open_intents(&self) -> Result<Vec<SubmissionIntent>> {
        let latest = self.latest_versions().await?;
        let mut open: Vec<SubmissionIntent> = latest
            .into_values()
            .filter(|i| i.state == IntentState::Open)
            .collect();
        open.sort_by_key(|i| i.created_at_ms);
        Ok(open)
    }

    async fn is_healthy(&self) -> bool {
        match self.log_path.parent() {
            Some(dir) => fs::metadata(dir).await.is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OptionType, OrderAction};
    use alloy::primitives::U256;

    fn intent() -> SubmissionIntent {
        SubmissionIntent {
            id: Uuid::new_v4(),
            contract_address: "0xc".into(),
            overlay_key: "0xc_100".into(),
            option_type: OptionType::Call,
            action: OrderAction::Buy,
            lots: 3,
            strike_price: U256::from(1500),
            premium: U256::from(10),
            expiry: 1_800_000_000,
            account_address: "0xme".into(),
            state: IntentState::Open,
            tx_hash: None,
            error: None,
            created_at_ms: 100,
            updated_at_ms: 100,
        }
    }

    #[tokio::test]
    async fn test_record_then_fulfill_leaves_no_open_intent() {
        let dir = std::env::temp_dir().join(format!("outbox-test-{}", Uuid::new_v4()));
        let outbox = JsonlOutbox::new(dir.to_str().unwrap()).await.unwrap();

        let intent = intent();
        outbox.record_intent(&intent).await.unwrap();
        assert_eq!(outbox.open_intents().await.unwrap().len(), 1);

        outbox.mark_fulfilled(intent.id, "0xaaa").await.unwrap();
        assert!(outbox.open_intents().await.unwrap().is_empty());

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_failed_intent_keeps_error_detail() {
        let dir = std::env::temp_dir().join(format!("outbox-test-{}", Uuid::new_v4()));
        let outbox = JsonlOutbox::new(dir.to_str().unwrap()).await.unwrap();

        let intent = intent();
        outbox.record_intent(&intent).await.unwrap();
        outbox.mark_failed(intent.id, "user rejected").await.unwrap();

        let latest = outbox.latest_versions().await.unwrap();
        let stored = &latest[&intent.id];
        assert_eq!(stored.state, IntentState::Failed);
        assert_eq!(stored.error.as_deref(), Some("user rejected"));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_unknown_intent_transition_errors() {
        let dir = std::env::temp_dir().join(format!("outbox-test-{}", Uuid::new_v4()));
        let outbox = JsonlOutbox::new(dir.to_str().unwrap()).await.unwrap();

        let result = outbox.mark_expired(Uuid::new_v4()).await;
        assert!(result.is_err());

        let _ = fs::remove_dir_all(&dir).await;
    }
}

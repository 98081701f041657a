//! Outbox Sweeper - Periodic Expiry of Unresolved Intents
//!
//! Scans the durable intent outbox for submissions that never reached
//! confirmation and expires those older than the configured TTL. The
//! paired speculative overlay records are never deleted, only surfaced:
//! each expiry is logged and counted instead of lingering silently.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, warn};

use crate::ports::outbox::IntentOutbox;

/// Summary of one sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Open intents examined.
    pub examined: usize,
    /// Intents expired this pass.
    pub expired: usize,
    /// Intents still open and within TTL.
    pub still_open: usize,
}

/// Periodically expires stale submission intents.
pub struct OutboxSweeper<B: IntentOutbox> {
    outbox: Arc<B>,
    /// Age after which an open intent is expired.
    intent_ttl: Duration,
    /// Interval between sweep passes.
    sweep_interval: Duration,
    /// Latest sweep report, for observers (metrics export).
    report_tx: watch::Sender<SweepReport>,
}

impl<B: IntentOutbox> OutboxSweeper<B> {
    pub fn new(outbox: Arc<B>, intent_ttl: Duration, sweep_interval: Duration) -> Self {
        let (report_tx, _) = watch::channel(SweepReport::default());
        Self {
            outbox,
            intent_ttl,
            sweep_interval,
            report_tx,
        }
    }

    /// Subscribe to per-pass sweep reports.
    pub fn reports(&self) -> watch::Receiver<SweepReport> {
        self.report_tx.subscribe()
    }

    /// Run sweep passes until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            ttl_secs = self.intent_ttl.as_secs(),
            interval_secs = self.sweep_interval.as_secs(),
            "Outbox sweeper started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Outbox sweeper received shutdown signal");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.sweep_interval) => {
                    match self.sweep_once().await {
                        Ok(report) => {
                            if report.expired > 0 {
                                info!(
                                    examined = report.examined,
                                    expired = report.expired,
                                    "Sweep expired stale submission intents"
                                );
                            }
                            let _ = self.report_tx.send(report);
                        }
                        Err(e) => warn!(error = %e, "Sweep pass failed"),
                    }
                }
            }
        }
    }

    /// One sweep pass over the open intents.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let now_ms = Utc::now().timestamp_millis() as u64;
        let ttl_ms = self.intent_ttl.as_millis() as u64;

        let open = self.outbox.open_intents().await?;
        let mut report = SweepReport {
            examined: open.len(),
            ..SweepReport::default()
        };

        for intent in open {
            let age_ms = now_ms.saturating_sub(intent.created_at_ms);
            if age_ms < ttl_ms {
                report.still_open += 1;
                continue;
            }

            warn!(
                intent = %intent.id,
                overlay_key = %intent.overlay_key,
                age_secs = age_ms / 1000,
                "Expiring unresolved submission intent, overlay orphan remains pending"
            );
            self.outbox.mark_expired(intent.id).await?;
            report.expired += 1;
        }

        Ok(report)
    }
}

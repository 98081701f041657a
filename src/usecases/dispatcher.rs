//! Subscription Dispatcher - Gossip-Driven View Maintenance
//!
//! Registers one subscription per contract topic and keeps the merged
//! ledger/overlay view current. Each delivered mutation is treated as an
//! independent, stateless trigger: the delivered record is applied as a
//! delta to the in-memory view, so a single gossip event no longer costs
//! a full rescan of both sources.
//!
//! Full re-reconciliation (fetch ledger + overlay snapshot, re-merge)
//! remains the startup path and the recovery path: it runs again when a
//! confirmed-status record arrives (a matching ledger row may now exist)
//! and when the broadcast receiver lags.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use crate::domain::order::{LedgerOrder, OrderStatus};
use crate::domain::reconcile::{MergedOrder, MergedView};
use crate::ports::ledger::LedgerClient;
use crate::ports::overlay::{OverlayEvent, OverlayStore};

/// Maintains the merged view for one contract address.
pub struct SubscriptionDispatcher<L: LedgerClient, S: OverlayStore> {
    ledger: Arc<L>,
    overlay: Arc<S>,
    /// Contract whose topic this dispatcher subscribes to.
    contract_address: String,
    /// Trader whose ledger orders are fetched.
    trader_address: String,
    view: MergedView,
    view_tx: watch::Sender<Vec<MergedOrder>>,
}

impl<L: LedgerClient, S: OverlayStore> SubscriptionDispatcher<L, S> {
    pub fn new(
        ledger: Arc<L>,
        overlay: Arc<S>,
        contract_address: impl Into<String>,
        trader_address: impl Into<String>,
    ) -> Self {
        let contract_address = contract_address.into();
        let (view_tx, _) = watch::channel(Vec::new());

        Self {
            ledger,
            overlay,
            view: MergedView::new(contract_address.clone()),
            contract_address,
            trader_address: trader_address.into(),
            view_tx,
        }
    }

    /// Watch receiver for the merged view rows.
    pub fn view(&self) -> watch::Receiver<Vec<MergedOrder>> {
        self.view_tx.subscribe()
    }

    /// Run the dispatch loop until shutdown.
    ///
    /// Subscribes to the contract topic first, then performs the initial
    /// full reconciliation, so mutations arriving during the fetch are
    /// not lost (at-least-once delivery makes duplicates harmless).
    #[instrument(skip(self, shutdown_rx), fields(contract = %self.contract_address))]
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut events = self.overlay.subscribe(&self.contract_address);

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Initial reconciliation failed — starting from empty view");
        }

        info!("Subscription dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Dispatcher received shutdown signal");
                    return Ok(());
                }
                event = events.recv() => {
                    match event {
                        Ok(ev) => self.handle_event(ev).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(dropped = n, "Dispatcher lagged — falling back to full refresh");
                            if let Err(e) = self.refresh().await {
                                warn!(error = %e, "Recovery refresh failed");
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Overlay event channel closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Apply one delivered mutation.
    ///
    /// Pending records are pure deltas. Confirmed records trigger a full
    /// refresh: the matching settled row must be fetched from the ledger
    /// before dedup can collapse the pair.
    async fn handle_event(&mut self, event: OverlayEvent) {
        debug!(key = %event.key, status = ?event.record.status, "Overlay mutation delivered");

        if event.record.status == OrderStatus::Confirmed {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Refresh after confirmation failed — applying delta only");
                self.apply_delta(&event);
            }
            return;
        }

        self.apply_delta(&event);
    }

    fn apply_delta(&mut self, event: &OverlayEvent) {
        if self.view.apply_overlay_event(&event.key, event.record.clone()) {
            self.publish();
        }
    }

    /// Full reconciliation: re-fetch both sources and re-merge.
    pub async fn refresh(&mut self) -> Result<()> {
        let ledger = self.fetch_ledger_orders().await?;
        let overlay = self
            .overlay
            .snapshot(&self.contract_address)
            .await
            .context("Overlay snapshot failed")?;

        self.view.replace(ledger, overlay);
        self.publish();

        debug!(
            ledger = self.view.ledger_len(),
            overlay = self.view.overlay_len(),
            "Full reconciliation complete"
        );
        Ok(())
    }

    /// Fetch settled orders for the tracked trader, annotated with their
    /// creating transaction hashes for dedup.
    async fn fetch_ledger_orders(&self) -> Result<Vec<LedgerOrder>> {
        let ids = self
            .ledger
            .orders_by_trader(&self.trader_address)
            .await
            .context("Ledger order-id query failed")?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut orders = self
            .ledger
            .order_details(&ids)
            .await
            .context("Ledger order-detail query failed")?;

        let hashes = self
            .ledger
            .creation_hashes()
            .await
            .context("Creation-hash resolution failed")?;

        for order in &mut orders {
            order.tx_hash = hashes.get(&order.option_id).cloned();
        }

        Ok(orders)
    }

    fn publish(&self) {
        let _ = self.view_tx.send(self.view.rows());
    }
}

//! Submission Coordinator - Pending→Confirmed Order Lifecycle
//!
//! Drives one order from speculative overlay announcement through ledger
//! settlement to overlay promotion:
//!
//! `Idle → Speculating → Submitting → Confirming → Done`, with
//! `Submitting → Failed` as the only error exit.
//!
//! The overlay write and the ledger submission are not transactional with
//! each other: an overlay failure is logged and submission proceeds; a
//! ledger failure leaves the overlay record pending forever (an orphan).
//! A durable intent is persisted before either write so the sweep can
//! account for orphans. Every operation is attempt-once — no retries.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::order::{
    attached_value, overlay_key, MonotonicMillis, OrderStatus, OverlayRecord, PENDING_TRADER,
};
use crate::ports::ledger::{LedgerClient, OrderRequest, SubmissionReceipt};
use crate::ports::outbox::{IntentOutbox, IntentState, SubmissionIntent};
use crate::ports::overlay::OverlayStore;

/// Errors surfaced to the submission caller.
///
/// Overlay write failures are deliberately absent: the overlay leg is
/// fire-and-forget and only logged.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// No signer reachable; fatal to any submission, surfaced
    /// immediately, never retried.
    #[error("no signer configured — wallet unavailable")]
    WalletUnavailable,

    /// The intent could not be made durable; nothing was written.
    #[error("failed to persist submission intent")]
    OutboxUnavailable(#[source] anyhow::Error),

    /// The ledger declined or the transaction reverted. The paired
    /// overlay record stays pending permanently.
    #[error("ledger rejected the order")]
    LedgerRejected(#[source] anyhow::Error),
}

/// Outcome of a completed submission.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// Key of the overlay record created for this order.
    pub overlay_key: String,
    /// Hash of the included ledger transaction.
    pub tx_hash: String,
    /// Ledger-assigned order id, when decodable from the receipt.
    pub option_id: Option<u64>,
}

/// Coordinates the speculative-write → settle → promote flow.
pub struct SubmissionCoordinator<L: LedgerClient, S: OverlayStore, B: IntentOutbox> {
    ledger: Arc<L>,
    overlay: Arc<S>,
    outbox: Arc<B>,
    contract_address: String,
    clock: MonotonicMillis,
}

impl<L: LedgerClient, S: OverlayStore, B: IntentOutbox> SubmissionCoordinator<L, S, B> {
    pub fn new(
        ledger: Arc<L>,
        overlay: Arc<S>,
        outbox: Arc<B>,
        contract_address: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            overlay,
            outbox,
            contract_address: contract_address.into(),
            clock: MonotonicMillis::new(),
        }
    }

    /// Submit one order through the full lifecycle.
    ///
    /// Suspends until at least one ledger confirmation is observed; there
    /// is no cancellation path once `submit_order` has been dispatched.
    #[instrument(skip(self, request), fields(
        contract = %self.contract_address,
        action = %request.action,
        lots = request.lots,
    ))]
    pub async fn submit(
        &self,
        request: &OrderRequest,
    ) -> Result<SubmissionOutcome, SubmitError> {
        let signer = self
            .ledger
            .signer_address()
            .ok_or(SubmitError::WalletUnavailable)?;

        // Monotonic millis keep the key unique even for same-millisecond
        // submissions from this process; the wire key format is unchanged.
        let timestamp_ms = self.clock.next();
        let key = overlay_key(&self.contract_address, timestamp_ms);

        let intent = new_intent(&self.contract_address, &key, request, &signer, timestamp_ms);
        self.outbox
            .record_intent(&intent)
            .await
            .map_err(SubmitError::OutboxUnavailable)?;

        // ── Speculating: best-effort overlay announcement ──
        let pending = OverlayRecord {
            contract_address: self.contract_address.clone(),
            option_type: request.option_type,
            action: request.action,
            lots: request.lots,
            strike_price: request.strike_price,
            premium: request.premium,
            expiry: request.expiry,
            transaction_hash: String::new(),
            trader: PENDING_TRADER.to_string(),
            status: OrderStatus::Pending,
            timestamp: timestamp_ms,
            account_address: signer.clone(),
        };

        if let Err(e) = self.overlay.put(&key, &pending, timestamp_ms).await {
            // Fire-and-forget: the ledger submission proceeds regardless.
            warn!(key = %key, error = %e, "Overlay write failed, continuing to ledger");
        } else {
            info!(key = %key, "Speculative order announced on overlay");
        }

        // ── Submitting: value = premium × lots for buys, 0 for sells ──
        let value = attached_value(request.action, request.premium, request.lots);
        let receipt = match self.ledger.submit_order(request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(key = %key, error = %e, "Ledger rejected order — overlay orphan remains pending");
                if let Err(mark_err) = self.outbox.mark_failed(intent.id, &e.to_string()).await {
                    warn!(intent = %intent.id, error = %mark_err, "Failed to mark intent failed");
                }
                return Err(SubmitError::LedgerRejected(e));
            }
        };

        info!(
            key = %key,
            tx_hash = %receipt.tx_hash,
            value = %value,
            "Ledger confirmed order"
        );

        // ── Confirming: promote the same overlay key in place ──
        self.confirm(&key, &pending, &receipt, &signer).await;

        if let Err(e) = self.outbox.mark_fulfilled(intent.id, &receipt.tx_hash).await {
            warn!(intent = %intent.id, error = %e, "Failed to mark intent fulfilled");
        }

        Ok(SubmissionOutcome {
            overlay_key: key,
            tx_hash: receipt.tx_hash,
            option_id: receipt.option_id,
        })
    }

    /// Promote the speculative record after ledger inclusion.
    ///
    /// A failed promotion is logged only: reconciliation will still show
    /// the settled row from the ledger side.
    async fn confirm(
        &self,
        key: &str,
        pending: &OverlayRecord,
        receipt: &SubmissionReceipt,
        signer: &str,
    ) {
        let confirmed = pending.promoted(&receipt.tx_hash, signer);
        let written_at_ms = self.clock.next();

        match self.overlay.put(key, &confirmed, written_at_ms).await {
            Ok(()) => info!(key = %key, "Overlay record promoted to confirmed"),
            Err(e) => warn!(
                key = %key,
                error = %e,
                "Overlay promotion failed — ledger row remains authoritative"
            ),
        }
    }
}

fn new_intent(
    contract: &str,
    key: &str,
    request: &OrderRequest,
    account: &str,
    now_ms: u64,
) -> SubmissionIntent {
    SubmissionIntent {
        id: uuid::Uuid::new_v4(),
        contract_address: contract.to_string(),
        overlay_key: key.to_string(),
        option_type: request.option_type,
        action: request.action,
        lots: request.lots,
        strike_price: request.strike_price,
        premium: request.premium,
        expiry: request.expiry,
        account_address: account.to_string(),
        state: IntentState::Open,
        tx_hash: None,
        error: None,
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    }
}

//! Integration Tests - End-to-end Node Component Testing
//!
//! Tests the interaction between usecases, ports, and mock adapters.
//! Uses mockall for trait mocking and tokio::test for async tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use mockall::mock;
use tokio::sync::broadcast;

use options_mesh_sync::adapters::overlay::store::MeshStore;
use options_mesh_sync::domain::order::{
    overlay_key, OptionType, OrderAction, OrderStatus, OverlayRecord, PENDING_TRADER,
};
use options_mesh_sync::domain::reconcile::OrderOrigin;
use options_mesh_sync::ports::ledger::{OrderRequest, SubmissionReceipt};
use options_mesh_sync::ports::outbox::{IntentState, SubmissionIntent};
use options_mesh_sync::ports::overlay::{OverlayEvent, OverlayStore};
use options_mesh_sync::usecases::dispatcher::SubscriptionDispatcher;
use options_mesh_sync::usecases::outbox_sweep::OutboxSweeper;
use options_mesh_sync::usecases::submission::{SubmissionCoordinator, SubmitError};

// ---- Mock Definitions ----

mock! {
    pub Ledger {}

    #[async_trait::async_trait]
    impl options_mesh_sync::ports::ledger::LedgerClient for Ledger {
        async fn submit_order(
            &self,
            request: &OrderRequest,
        ) -> anyhow::Result<SubmissionReceipt>;

        async fn orders_by_trader(&self, trader: &str) -> anyhow::Result<Vec<u64>>;

        async fn order_details(
            &self,
            ids: &[u64],
        ) -> anyhow::Result<Vec<options_mesh_sync::domain::order::LedgerOrder>>;

        async fn creation_hashes(&self) -> anyhow::Result<HashMap<u64, String>>;

        fn signer_address(&self) -> Option<String>;

        async fn signer_balance(&self) -> anyhow::Result<U256>;

        async fn is_healthy(&self) -> bool;
    }
}

mock! {
    pub Overlay {}

    #[async_trait::async_trait]
    impl options_mesh_sync::ports::overlay::OverlayStore for Overlay {
        async fn put(
            &self,
            key: &str,
            record: &OverlayRecord,
            written_at_ms: u64,
        ) -> anyhow::Result<()>;

        async fn get(&self, key: &str) -> anyhow::Result<Option<OverlayRecord>>;

        async fn snapshot(&self, contract_address: &str) -> anyhow::Result<Vec<OverlayRecord>>;

        fn subscribe(&self, contract_address: &str) -> broadcast::Receiver<OverlayEvent>;

        async fn is_healthy(&self) -> bool;
    }
}

mock! {
    pub Outbox {}

    #[async_trait::async_trait]
    impl options_mesh_sync::ports::outbox::IntentOutbox for Outbox {
        async fn record_intent(&self, intent: &SubmissionIntent) -> anyhow::Result<()>;

        async fn mark_fulfilled(&self, id: uuid::Uuid, tx_hash: &str) -> anyhow::Result<()>;

        async fn mark_failed(&self, id: uuid::Uuid, error: &str) -> anyhow::Result<()>;

        async fn mark_expired(&self, id: uuid::Uuid) -> anyhow::Result<()>;

        async fn open_intents(&self) -> anyhow::Result<Vec<SubmissionIntent>>;

        async fn is_healthy(&self) -> bool;
    }
}

// ---- Helpers ----

const CONTRACT: &str = "0xc0ffee254729296a45a3885639ac7e10f9d54979";

fn eth(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

fn buy_request() -> OrderRequest {
    OrderRequest {
        option_type: OptionType::Call,
        action: OrderAction::Buy,
        lots: 3,
        strike_price: eth(1500),
        premium: eth(1) / U256::from(2),
        expiry: 1_800_000_000,
    }
}

fn ledger_order(
    id: u64,
    hash: Option<&str>,
) -> options_mesh_sync::domain::order::LedgerOrder {
    options_mesh_sync::domain::order::LedgerOrder {
        option_id: id,
        trader: "0xsigner".into(),
        option_type: OptionType::Call,
        action: OrderAction::Buy,
        lots: 1,
        strike_price: eth(1500),
        premium: eth(1),
        expiry: 1_800_000_000,
        is_active: true,
        tx_hash: hash.map(str::to_string),
    }
}

// ---- Submission Coordinator ----

#[tokio::test]
async fn test_successful_submission_promotes_overlay_record() {
    let mut ledger = MockLedger::new();
    let mut overlay = MockOverlay::new();
    let mut outbox = MockOutbox::new();

    ledger
        .expect_signer_address()
        .returning(|| Some("0xsigner".to_string()));
    ledger.expect_submit_order().returning(|_| {
        Ok(SubmissionReceipt {
            tx_hash: "0xaaa".to_string(),
            option_id: Some(7),
            block_number: Some(100),
        })
    });

    // First write is the speculative pending record, second the promotion
    overlay
        .expect_put()
        .withf(|_, record, _| {
            record.status == OrderStatus::Pending
                && record.transaction_hash.is_empty()
                && record.trader == PENDING_TRADER
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    overlay
        .expect_put()
        .withf(|_, record, _| {
            record.status == OrderStatus::Confirmed
                && record.transaction_hash == "0xaaa"
                && record.trader == "0xsigner"
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    outbox.expect_record_intent().times(1).returning(|_| Ok(()));
    outbox
        .expect_mark_fulfilled()
        .withf(|_, hash| hash == "0xaaa")
        .times(1)
        .returning(|_, _| Ok(()));

    let coordinator = SubmissionCoordinator::new(
        Arc::new(ledger),
        Arc::new(overlay),
        Arc::new(outbox),
        CONTRACT,
    );

    let outcome = coordinator.submit(&buy_request()).await.unwrap();
    assert_eq!(outcome.tx_hash, "0xaaa");
    assert_eq!(outcome.option_id, Some(7));
    assert!(outcome.overlay_key.starts_with(CONTRACT));
}

#[tokio::test]
async fn test_ledger_rejection_leaves_pending_orphan() {
    let mut ledger = MockLedger::new();
    let mut overlay = MockOverlay::new();
    let mut outbox = MockOutbox::new();

    ledger
        .expect_signer_address()
        .returning(|| Some("0xsigner".to_string()));
    ledger
        .expect_submit_order()
        .returning(|_| Err(anyhow::anyhow!("execution reverted")));

    // Only the speculative write happens; no promotion, no deletion
    overlay
        .expect_put()
        .withf(|_, record, _| record.status == OrderStatus::Pending)
        .times(1)
        .returning(|_, _, _| Ok(()));

    outbox.expect_record_intent().times(1).returning(|_| Ok(()));
    outbox
        .expect_mark_failed()
        .withf(|_, error| error.contains("reverted"))
        .times(1)
        .returning(|_, _| Ok(()));

    let coordinator = SubmissionCoordinator::new(
        Arc::new(ledger),
        Arc::new(overlay),
        Arc::new(outbox),
        CONTRACT,
    );

    let err = coordinator.submit(&buy_request()).await.unwrap_err();
    assert!(matches!(err, SubmitError::LedgerRejected(_)));
}

#[tokio::test]
async fn test_wallet_unavailable_fails_before_any_write() {
    let mut ledger = MockLedger::new();
    let overlay = MockOverlay::new();
    let outbox = MockOutbox::new();

    ledger.expect_signer_address().returning(|| None);

    // No expectations on overlay/outbox: any call would panic the mock
    let coordinator = SubmissionCoordinator::new(
        Arc::new(ledger),
        Arc::new(overlay),
        Arc::new(outbox),
        CONTRACT,
    );

    let err = coordinator.submit(&buy_request()).await.unwrap_err();
    assert!(matches!(err, SubmitError::WalletUnavailable));
}

#[tokio::test]
async fn test_outbox_failure_aborts_submission() {
    let mut ledger = MockLedger::new();
    let overlay = MockOverlay::new();
    let mut outbox = MockOutbox::new();

    ledger
        .expect_signer_address()
        .returning(|| Some("0xsigner".to_string()));
    outbox
        .expect_record_intent()
        .returning(|_| Err(anyhow::anyhow!("disk full")));

    // Nothing may reach the overlay or the ledger after an outbox failure
    let coordinator = SubmissionCoordinator::new(
        Arc::new(ledger),
        Arc::new(overlay),
        Arc::new(outbox),
        CONTRACT,
    );

    let err = coordinator.submit(&buy_request()).await.unwrap_err();
    assert!(matches!(err, SubmitError::OutboxUnavailable(_)));
}

#[tokio::test]
async fn test_overlay_write_failure_does_not_block_submission() {
    let mut ledger = MockLedger::new();
    let mut overlay = MockOverlay::new();
    let mut outbox = MockOutbox::new();

    ledger
        .expect_signer_address()
        .returning(|| Some("0xsigner".to_string()));
    ledger.expect_submit_order().returning(|_| {
        Ok(SubmissionReceipt {
            tx_hash: "0xbbb".to_string(),
            option_id: Some(1),
            block_number: Some(5),
        })
    });

    // Both overlay legs fail; submission still succeeds
    overlay
        .expect_put()
        .times(2)
        .returning(|_, _, _| Err(anyhow::anyhow!("relay gone")));

    outbox.expect_record_intent().returning(|_| Ok(()));
    outbox.expect_mark_fulfilled().returning(|_, _| Ok(()));

    let coordinator = SubmissionCoordinator::new(
        Arc::new(ledger),
        Arc::new(overlay),
        Arc::new(outbox),
        CONTRACT,
    );

    let outcome = coordinator.submit(&buy_request()).await.unwrap();
    assert_eq!(outcome.tx_hash, "0xbbb");
}

#[tokio::test]
async fn test_rapid_submissions_get_distinct_overlay_keys() {
    let mut ledger = MockLedger::new();
    let mut overlay = MockOverlay::new();
    let mut outbox = MockOutbox::new();

    ledger
        .expect_signer_address()
        .returning(|| Some("0xsigner".to_string()));
    ledger.expect_submit_order().returning(|_| {
        Ok(SubmissionReceipt {
            tx_hash: "0xccc".to_string(),
            option_id: None,
            block_number: None,
        })
    });
    overlay.expect_put().returning(|_, _, _| Ok(()));
    outbox.expect_record_intent().returning(|_| Ok(()));
    outbox.expect_mark_fulfilled().returning(|_, _| Ok(()));

    let coordinator = SubmissionCoordinator::new(
        Arc::new(ledger),
        Arc::new(overlay),
        Arc::new(outbox),
        CONTRACT,
    );

    let first = coordinator.submit(&buy_request()).await.unwrap();
    let second = coordinator.submit(&buy_request()).await.unwrap();
    assert_ne!(first.overlay_key, second.overlay_key);
}

// ---- Subscription Dispatcher (real mesh store + mock ledger) ----

fn pending_record(ts: u64) -> OverlayRecord {
    OverlayRecord {
        contract_address: CONTRACT.into(),
        option_type: OptionType::Call,
        action: OrderAction::Buy,
        lots: 1,
        strike_price: eth(1500),
        premium: eth(1),
        expiry: 1_800_000_000,
        transaction_hash: String::new(),
        trader: PENDING_TRADER.into(),
        status: OrderStatus::Pending,
        timestamp: ts,
        account_address: "0xsigner".into(),
    }
}

#[tokio::test]
async fn test_dispatcher_merges_ledger_and_overlay_then_applies_deltas() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_orders_by_trader()
        .returning(|_| Ok(vec![1]));
    ledger
        .expect_order_details()
        .returning(|_| Ok(vec![ledger_order(1, None)]));
    ledger
        .expect_creation_hashes()
        .returning(|| Ok(HashMap::from([(1, "0xaaa".to_string())])));

    let store = Arc::new(MeshStore::new(64));

    // A confirmed overlay duplicate of ledger order 1 plus one pending
    let dup = pending_record(100).promoted("0xaaa", "0xsigner");
    store
        .put(&overlay_key(CONTRACT, 100), &dup, 100)
        .await
        .unwrap();
    store
        .put(&overlay_key(CONTRACT, 200), &pending_record(200), 200)
        .await
        .unwrap();

    let mut dispatcher = SubscriptionDispatcher::new(
        Arc::new(ledger),
        Arc::clone(&store),
        CONTRACT,
        "0xsigner",
    );
    let mut view_rx = dispatcher.view();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let dispatcher_shutdown = shutdown_tx.subscribe();
    let handle = tokio::spawn(async move { dispatcher.run(dispatcher_shutdown).await });

    // Initial full reconciliation: 1 ledger row (dup collapsed) + 1 pending
    tokio::time::timeout(Duration::from_secs(2), view_rx.changed())
        .await
        .expect("no initial view published")
        .unwrap();
    {
        let rows = view_rx.borrow_and_update();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].origin, OrderOrigin::Ledger);
        assert_eq!(rows[1].status, OrderStatus::Pending);
    }

    // A new pending gossip event is applied as a delta
    store
        .put(&overlay_key(CONTRACT, 300), &pending_record(300), 300)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), view_rx.changed())
        .await
        .expect("no delta view published")
        .unwrap();
    assert_eq!(view_rx.borrow_and_update().len(), 3);

    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
}

// ---- Outbox Sweeper ----

fn open_intent(age_ms: u64) -> SubmissionIntent {
    let now = chrono::Utc::now().timestamp_millis() as u64;
    SubmissionIntent {
        id: uuid::Uuid::new_v4(),
        contract_address: CONTRACT.into(),
        overlay_key: overlay_key(CONTRACT, now - age_ms),
        option_type: OptionType::Call,
        action: OrderAction::Buy,
        lots: 1,
        strike_price: eth(1500),
        premium: eth(1),
        expiry: 1_800_000_000,
        account_address: "0xsigner".into(),
        state: IntentState::Open,
        tx_hash: None,
        error: None,
        created_at_ms: now - age_ms,
        updated_at_ms: now - age_ms,
    }
}

#[tokio::test]
async fn test_sweeper_expires_only_stale_intents() {
    let stale = open_intent(120_000);
    let fresh = open_intent(1_000);
    let stale_id = stale.id;

    let mut outbox = MockOutbox::new();
    outbox
        .expect_open_intents()
        .returning(move || Ok(vec![stale.clone(), fresh.clone()]));
    outbox
        .expect_mark_expired()
        .withf(move |id| *id == stale_id)
        .times(1)
        .returning(|_| Ok(()));

    let sweeper = OutboxSweeper::new(
        Arc::new(outbox),
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.expired, 1);
    assert_eq!(report.still_open, 1);
}

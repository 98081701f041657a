//! Options Mesh Sync Node — Entry Point
//!
//! Initializes configuration, logging, the ledger RPC connection, the
//! overlay mesh store, and the reconciliation dispatcher. Runs until
//! SIGINT/SIGTERM.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Connect RPC provider (wallet key from WALLET_PRIVATE_KEY env)
//! 4. Bind options ledger contract (code-existence check)
//! 5. Create mesh store + optional relay link (auto-reconnect WebSocket)
//! 6. Open JSONL intent outbox
//! 7. Wire submission coordinator + subscription dispatcher
//! 8. Spawn outbox sweeper, metrics, health, and API servers
//! 9. Wait for SIGINT → graceful shutdown (signal→drain→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use options_mesh_sync::adapters::api::{ApiServer, ApiState};
use options_mesh_sync::adapters::chain::contracts::OptionsLedger;
use options_mesh_sync::adapters::chain::provider::RpcProvider;
use options_mesh_sync::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use options_mesh_sync::adapters::overlay::relay::RelayLink;
use options_mesh_sync::adapters::overlay::store::MeshStore;
use options_mesh_sync::adapters::persistence::outbox::JsonlOutbox;
use options_mesh_sync::config;
use options_mesh_sync::ports::ledger::LedgerClient;
use options_mesh_sync::usecases::dispatcher::SubscriptionDispatcher;
use options_mesh_sync::usecases::outbox_sweep::OutboxSweeper;
use options_mesh_sync::usecases::submission::SubmissionCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.node.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.node.name,
        version = env!("CARGO_PKG_VERSION"),
        contract = %config.ledger.contract_address,
        relay = config.overlay.relay_url.is_some(),
        "Starting options mesh sync node"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let health = Arc::new(HealthState::new());

    // ── 4. Connect RPC provider + bind ledger contract ──────
    let provider = Arc::new(
        RpcProvider::connect(&config.ledger)
            .await
            .context("Failed to connect to ledger RPC")?,
    );

    let contract_addr: Address = config
        .ledger
        .contract_address
        .parse()
        .context("Invalid contract address in config")?;
    let ledger = Arc::new(
        OptionsLedger::new(Arc::clone(&provider), contract_addr)
            .await
            .context("Failed to bind options ledger contract")?,
    );
    let contract_address = ledger.contract_address();

    // ── 5. Mesh store + optional relay link ─────────────────
    let store = Arc::new(MeshStore::new(config.overlay.channel_capacity));

    let relay = config.overlay.relay_url.as_ref().map(|url| {
        Arc::new(RelayLink::new(Arc::clone(&store), url.clone()))
    });
    let relay_handle = relay.as_ref().map(|relay| {
        let relay = Arc::clone(relay);
        let relay_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = relay.run(relay_shutdown).await {
                error!(error = %e, "Relay link task failed");
            }
        })
    });
    if relay.is_none() {
        warn!("No relay_url configured — overlay runs process-local only");
    }

    // ── 6. Durable intent outbox (JSONL) ────────────────────
    let outbox = Arc::new(
        JsonlOutbox::new(&config.persistence.data_dir)
            .await
            .context("Failed to open intent outbox")?,
    );

    // ── 7. Submission coordinator + subscription dispatcher ─
    let coordinator = Arc::new(SubmissionCoordinator::new(
        Arc::clone(&ledger),
        Arc::clone(&store),
        Arc::clone(&outbox),
        contract_address.clone(),
    ));

    // Read-only nodes track the zero address (no settled orders).
    let trader_address = ledger
        .signer_address()
        .unwrap_or_else(|| format!("{:#x}", Address::ZERO));

    let mut dispatcher = SubscriptionDispatcher::new(
        Arc::clone(&ledger),
        Arc::clone(&store),
        contract_address.clone(),
        trader_address,
    );
    let view_rx = dispatcher.view();

    let dispatcher_shutdown = shutdown_tx.subscribe();
    let dispatcher_handle = tokio::spawn(async move {
        if let Err(e) = dispatcher.run(dispatcher_shutdown).await {
            error!(error = %e, "Subscription dispatcher failed");
        }
    });

    // ── 8. Outbox sweeper ───────────────────────────────────
    let sweeper = OutboxSweeper::new(
        Arc::clone(&outbox),
        Duration::from_secs(config.persistence.intent_ttl_seconds),
        Duration::from_secs(config.persistence.sweep_interval_seconds),
    );
    let sweep_reports = sweeper.reports();
    let sweeper_shutdown = shutdown_tx.subscribe();
    let sweeper_handle = tokio::spawn(async move {
        if let Err(e) = sweeper.run(sweeper_shutdown).await {
            error!(error = %e, "Outbox sweeper failed");
        }
    });

    // ── 9. Metrics, health, and API servers ─────────────────
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);

    let metrics_handle = if config.metrics.enabled {
        let metrics_ref = Arc::clone(&metrics);
        let bind = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = metrics_ref.serve(bind, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let api_state = ApiState {
        coordinator,
        ledger: Arc::clone(&ledger),
        view: view_rx.clone(),
        metrics: Arc::clone(&metrics),
        contract_address: contract_address.clone(),
    };
    let api_server = ApiServer::new(config.api.bind_address.clone());
    let api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_state, api_shutdown).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 10. Observability monitor loop ──────────────────────
    let monitor_handle = tokio::spawn(monitor_loop(
        Arc::clone(&ledger),
        relay.clone(),
        Arc::clone(&metrics),
        Arc::clone(&health),
        view_rx,
        sweep_reports,
        contract_address,
        shutdown_tx.subscribe(),
    ));

    info!("All tasks spawned — node is running");

    // ── 11. Wait for SIGINT ─────────────────────────────────
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }

    // ── Graceful shutdown (signal → drain → exit) ───────────

    // 1. Signal all tasks to stop
    let _ = shutdown_tx.send(());
    info!("Shutdown signal broadcast to all tasks");

    // 2. Readiness probe flips to 503 while tasks drain
    health.view_ready.store(false, Ordering::Relaxed);

    // 3. Wait for the dispatcher to finish (up to 10s)
    let _ = tokio::time::timeout(Duration::from_secs(10), dispatcher_handle).await;

    // 4. Relay closes its WebSocket (up to 5s)
    if let Some(handle) = relay_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    // 5. Remaining tasks drain (up to 5s each)
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), api_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    health_handle.abort();
    monitor_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Export liveness and view metrics on an interval.
///
/// Bridges component state into Prometheus gauges and the readiness
/// probe without the usecases depending on the metrics adapter.
#[allow(clippy::too_many_arguments)]
async fn monitor_loop(
    ledger: Arc<OptionsLedger>,
    relay: Option<Arc<RelayLink>>,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthState>,
    mut view_rx: tokio::sync::watch::Receiver<
        Vec<options_mesh_sync::domain::reconcile::MergedOrder>,
    >,
    mut sweep_reports: tokio::sync::watch::Receiver<
        options_mesh_sync::usecases::outbox_sweep::SweepReport,
    >,
    contract_address: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(15));

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("Monitor loop received shutdown signal");
                return;
            }
            _ = interval.tick() => {
                health
                    .ledger_healthy
                    .store(ledger.is_healthy().await, Ordering::Relaxed);

                let connected = relay.as_ref().is_some_and(|r| r.is_connected());
                health.relay_connected.store(connected, Ordering::Relaxed);
                metrics.relay_connected.set(i64::from(connected));
            }
            changed = view_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let size = view_rx.borrow_and_update().len();
                health.view_ready.store(true, Ordering::Relaxed);
                metrics
                    .views_published_total
                    .with_label_values(&[&contract_address])
                    .inc();
                metrics
                    .merged_view_size
                    .with_label_values(&[&contract_address])
                    .set(size as i64);
            }
            changed = sweep_reports.changed() => {
                if changed.is_err() {
                    return;
                }
                let report = sweep_reports.borrow_and_update().clone();
                metrics.intents_expired_total.inc_by(report.expired as u64);
                metrics.open_intents.set(report.still_open as i64);
            }
        }
    }
}

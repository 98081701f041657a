//! Prometheus Metrics Registry - Sync Node Observability
//!
//! Registers and exposes Prometheus metrics on :9090 for Grafana
//! dashboards. Covers order submission outcomes, overlay traffic,
//! reconciliation activity, and relay health.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Centralized Prometheus metrics for the sync node.
///
/// All metrics follow the naming convention `mesh_sync_*` and include
/// contract labels for multi-contract filtering.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Submission latency histogram (milliseconds, intent to receipt).
    pub submission_latency_ms: HistogramVec,
    /// Total submissions by terminal outcome.
    pub submissions_total: IntCounterVec,
    /// Speculative records promoted to confirmed.
    pub promotions_total: IntCounterVec,
    /// Orphaned speculative records (ledger rejected, overlay kept).
    pub orphans_total: IntCounterVec,
    /// Merged views published to subscribers.
    pub views_published_total: IntCounterVec,
    /// Current merged view size per contract.
    pub merged_view_size: IntGaugeVec,
    /// Open intents awaiting resolution.
    pub open_intents: prometheus::IntGauge,
    /// Intents swept to expired.
    pub intents_expired_total: prometheus::IntCounter,
    /// Relay connection status (1 = connected, 0 = disconnected).
    pub relay_connected: prometheus::IntGauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let submission_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "mesh_sync_submission_latency_ms",
                "Order submission latency in milliseconds (intent to receipt)",
            )
            .buckets(vec![
                50.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 15000.0, 60000.0,
            ]),
            &["contract"],
        )?;

        let submissions_total = IntCounterVec::new(
            Opts::new(
                "mesh_sync_submissions_total",
                "Total order submissions by outcome",
            ),
            &["contract", "outcome"],
        )?;

        let promotions_total = IntCounterVec::new(
            Opts::new(
                "mesh_sync_promotions_total",
                "Speculative records promoted to confirmed",
            ),
            &["contract"],
        )?;

        let orphans_total = IntCounterVec::new(
            Opts::new(
                "mesh_sync_orphans_total",
                "Speculative records orphaned by ledger rejection",
            ),
            &["contract"],
        )?;

        let views_published_total = IntCounterVec::new(
            Opts::new(
                "mesh_sync_views_published_total",
                "Merged views published to subscribers",
            ),
            &["contract"],
        )?;

        let merged_view_size = IntGaugeVec::new(
            Opts::new(
                "mesh_sync_merged_view_size",
                "Rows in the current merged view",
            ),
            &["contract"],
        )?;

        let open_intents = prometheus::IntGauge::new(
            "mesh_sync_open_intents",
            "Intents recorded but not yet fulfilled, failed, or expired",
        )?;

        let intents_expired_total = prometheus::IntCounter::new(
            "mesh_sync_intents_expired_total",
            "Open intents swept to expired after TTL",
        )?;

        let relay_connected = prometheus::IntGauge::new(
            "mesh_sync_relay_connected",
            "Relay link status (1=connected, 0=disconnected)",
        )?;

        // Register all metrics
        registry.register(Box::new(submission_latency_ms.clone()))?;
        registry.register(Box::new(submissions_total.clone()))?;
        registry.register(Box::new(promotions_total.clone()))?;
        registry.register(Box::new(orphans_total.clone()))?;
        registry.register(Box::new(views_published_total.clone()))?;
        registry.register(Box::new(merged_view_size.clone()))?;
        registry.register(Box::new(open_intents.clone()))?;
        registry.register(Box::new(intents_expired_total.clone()))?;
        registry.register(Box::new(relay_connected.clone()))?;

        Ok(Self {
            registry,
            submission_latency_ms,
            submissions_total,
            promotions_total,
            orphans_total,
            views_published_total,
            merged_view_size,
            open_intents,
            intents_expired_total,
            relay_connected,
        })
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let registry = metrics_self.registry.clone();
                async move {
                    let encoder = TextEncoder::new();
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    encoder.encode(&metric_families, &mut buffer).unwrap();
                    String::from_utf8(buffer).unwrap_or_default()
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

//! API Server - Merged Views, Submission, Wallet
//!
//! Endpoints:
//! - `GET  /orders` — current merged ledger/overlay view
//! - `POST /orders` — submit one order through the coordinator
//! - `GET  /wallet` — signer address and native balance
//!
//! Amount fields are decimal strings on the wire (e.g. `"0.5"`), parsed
//! with `rust_decimal` and scaled to 18-decimal fixed point before they
//! reach the domain.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::U256;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::order::{OptionType, OrderAction};
use crate::domain::reconcile::MergedOrder;
use crate::ports::ledger::{LedgerClient, OrderRequest};
use crate::ports::outbox::IntentOutbox;
use crate::ports::overlay::OverlayStore;
use crate::usecases::submission::{SubmissionCoordinator, SubmitError};

const WEI_DECIMALS: u32 = 18;

/// Shared state behind every handler.
pub struct ApiState<L: LedgerClient, S: OverlayStore, B: IntentOutbox> {
    pub coordinator: Arc<SubmissionCoordinator<L, S, B>>,
    pub ledger: Arc<L>,
    pub view: watch::Receiver<Vec<MergedOrder>>,
    pub metrics: Arc<MetricsRegistry>,
    pub contract_address: String,
}

// Manual Clone: a derive would demand L/S/B be Clone themselves.
impl<L: LedgerClient, S: OverlayStore, B: IntentOutbox> Clone for ApiState<L, S, B> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            ledger: Arc::clone(&self.ledger),
            view: self.view.clone(),
            metrics: Arc::clone(&self.metrics),
            contract_address: self.contract_address.clone(),
        }
    }
}

/// One merged order row on the wire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRow {
    origin: String,
    contract_address: String,
    option_type: OptionType,
    action: OrderAction,
    lots: u64,
    strike_price: String,
    premium: String,
    expiry: u64,
    trader: String,
    status: String,
    transaction_hash: String,
    timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_active: Option<bool>,
}

impl From<&MergedOrder> for OrderRow {
    fn from(row: &MergedOrder) -> Self {
        Self {
            origin: format!("{:?}", row.origin).to_lowercase(),
            contract_address: row.contract_address.clone(),
            option_type: row.option_type,
            action: row.action,
            lots: row.lots,
            strike_price: format_fixed(row.strike_price),
            premium: format_fixed(row.premium),
            expiry: row.expiry,
            trader: row.trader.clone(),
            status: format!("{:?}", row.status).to_lowercase(),
            transaction_hash: row.transaction_hash.clone(),
            timestamp: row.timestamp,
            is_active: row.is_active,
        }
    }
}

/// Order submission request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    option_type: OptionType,
    action: OrderAction,
    lots: u64,
    /// Decimal string, e.g. "1500".
    strike_price: String,
    /// Decimal string per lot, e.g. "0.5".
    premium: String,
    /// Unix seconds.
    expiry: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    overlay_key: String,
    transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    option_id: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletResponse {
    address: String,
    balance: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Axum-based API server.
pub struct ApiServer {
    bind_address: String,
}

impl ApiServer {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
        }
    }

    /// Serve the API until shutdown.
    #[instrument(skip(self, state, shutdown_rx), fields(address = %self.bind_address))]
    pub async fn run<L, S, B>(
        self,
        state: ApiState<L, S, B>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        L: LedgerClient,
        S: OverlayStore,
        B: IntentOutbox,
    {
        let app = Router::new()
            .route(
                "/orders",
                get(list_orders::<L, S, B>).post(submit_order::<L, S, B>),
            )
            .route("/wallet", get(wallet_info::<L, S, B>))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(&self.bind_address)
            .await
            .context("Failed to bind API address")?;

        info!("API server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("API server error")?;

        Ok(())
    }
}

/// GET /orders — rows of the current merged view.
async fn list_orders<L, S, B>(State(state): State<ApiState<L, S, B>>) -> impl IntoResponse
where
    L: LedgerClient,
    S: OverlayStore,
    B: IntentOutbox,
{
    let rows: Vec<OrderRow> = state.view.borrow().iter().map(OrderRow::from).collect();
    Json(rows)
}

/// POST /orders — submit one order through the coordinator.
async fn submit_order<L, S, B>(
    State(state): State<ApiState<L, S, B>>,
    Json(body): Json<SubmitRequest>,
) -> impl IntoResponse
where
    L: LedgerClient,
    S: OverlayStore,
    B: IntentOutbox,
{
    let request = match to_order_request(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let contract = state.contract_address.as_str();
    let started = Instant::now();

    match state.coordinator.submit(&request).await {
        Ok(outcome) => {
            state
                .metrics
                .submissions_total
                .with_label_values(&[contract, "confirmed"])
                .inc();
            state
                .metrics
                .promotions_total
                .with_label_values(&[contract])
                .inc();
            state
                .metrics
                .submission_latency_ms
                .with_label_values(&[contract])
                .observe(started.elapsed().as_millis() as f64);

            (
                StatusCode::CREATED,
                Json(SubmitResponse {
                    overlay_key: outcome.overlay_key,
                    transaction_hash: outcome.tx_hash,
                    option_id: outcome.option_id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            let (status, outcome_label) = match &e {
                SubmitError::WalletUnavailable => {
                    (StatusCode::SERVICE_UNAVAILABLE, "wallet_unavailable")
                }
                SubmitError::OutboxUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "outbox_unavailable")
                }
                SubmitError::LedgerRejected(_) => (StatusCode::BAD_GATEWAY, "rejected"),
            };
            state
                .metrics
                .submissions_total
                .with_label_values(&[contract, outcome_label])
                .inc();
            if matches!(e, SubmitError::LedgerRejected(_)) {
                state
                    .metrics
                    .orphans_total
                    .with_label_values(&[contract])
                    .inc();
            }

            warn!(error = %e, "Order submission failed");
            (
                status,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /wallet — signer address and native balance.
async fn wallet_info<L, S, B>(State(state): State<ApiState<L, S, B>>) -> impl IntoResponse
where
    L: LedgerClient,
    S: OverlayStore,
    B: IntentOutbox,
{
    let Some(address) = state.ledger.signer_address() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "no signer configured".to_string(),
            }),
        )
            .into_response();
    };

    match state.ledger.signer_balance().await {
        Ok(balance) => (
            StatusCode::OK,
            Json(WalletResponse {
                address,
                balance: format_fixed(balance),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Balance query failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody {
                    error: "balance query failed".to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn to_order_request(body: &SubmitRequest) -> Result<OrderRequest> {
    anyhow::ensure!(body.lots > 0, "lots must be positive");

    Ok(OrderRequest {
        option_type: body.option_type,
        action: body.action,
        lots: body.lots,
        strike_price: parse_fixed(&body.strike_price)
            .context("Invalid strikePrice")?,
        premium: parse_fixed(&body.premium).context("Invalid premium")?,
        expiry: body.expiry,
    })
}

/// Parse a decimal string into an 18-decimal fixed-point integer.
fn parse_fixed(text: &str) -> Result<U256> {
    let decimal = Decimal::from_str(text.trim()).context("Not a decimal number")?;
    anyhow::ensure!(!decimal.is_sign_negative(), "Amount must not be negative");
    anyhow::ensure!(
        decimal.scale() <= WEI_DECIMALS,
        "At most {WEI_DECIMALS} decimal places supported"
    );

    let mantissa = decimal.mantissa().unsigned_abs();
    let scale_up = U256::from(10u64).pow(U256::from(WEI_DECIMALS - decimal.scale()));
    Ok(U256::from(mantissa) * scale_up)
}

/// Render an 18-decimal fixed-point integer as a decimal string.
fn format_fixed(amount: U256) -> String {
    let base = U256::from(10u64).pow(U256::from(WEI_DECIMALS));
    let whole = amount / base;
    let frac = amount % base;

    if frac.is_zero() {
        return whole.to_string();
    }

    let frac = format!("{frac:0>18}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed_scales_to_wei() {
        assert_eq!(
            parse_fixed("0.5").unwrap(),
            U256::from(500_000_000_000_000_000u64)
        );
        assert_eq!(
            parse_fixed("1500").unwrap(),
            U256::from(1500u64) * U256::from(10u64).pow(U256::from(18u64))
        );
    }

    #[test]
    fn test_parse_fixed_rejects_garbage() {
        assert!(parse_fixed("abc").is_err());
        assert!(parse_fixed("-1").is_err());
        assert!(parse_fixed("0.1234567890123456789").is_err());
    }

    #[test]
    fn test_format_fixed_round_trips() {
        for text in ["0", "0.5", "1500", "1.5", "0.000000000000000001"] {
            let parsed = parse_fixed(text).unwrap();
            assert_eq!(format_fixed(parsed), text);
        }
    }
}

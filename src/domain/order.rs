//! Core order domain types.
//!
//! Two partially-overlapping representations of the same order exist in
//! this system:
//! - `LedgerOrder`: read from the authoritative on-chain ledger, immutable
//!   once read.
//! - `OverlayRecord`: announced through the eventually-consistent overlay
//!   before (and regardless of) ledger confirmation, mutated in place when
//!   the paired transaction is included.
//!
//! Monetary fields are 18-decimal fixed-point integers (`U256`) end to end;
//! conversion to human-readable decimals happens only at the presentation
//! boundary, never inside reconciliation logic.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Lightweight contract identifier used at the ports boundary
/// (lowercase 0x-prefixed hex).
pub type ContractAddress = String;

/// Lightweight overlay key used at the ports boundary.
pub type OverlayKey = String;

/// Placeholder trader value carried by a speculative overlay record until
/// the ledger confirms and the signer address is known.
pub const PENDING_TRADER: &str = "pending";

/// Option contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// Order direction.
///
/// Only buys attach value (`premium × lots`) to the ledger transaction;
/// sells attach zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Lifecycle status of an overlay record.
///
/// `Pending` records have an empty transaction hash and are never treated
/// as settled. Once `Confirmed`, the transaction hash is immutable and
/// becomes the record's dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
}

/// An order as read from the authoritative ledger.
///
/// Produced only by the ledger client; immutable once read. The on-chain
/// struct carries no transaction hash — the client resolves each order's
/// creating hash separately from `OptionCreated` event logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerOrder {
    /// Ledger-assigned order identifier.
    pub option_id: u64,
    /// Address that created the order.
    pub trader: String,
    /// Call or put.
    pub option_type: OptionType,
    /// Buy or sell.
    pub action: OrderAction,
    /// Number of lots (positive).
    pub lots: u64,
    /// Strike price, 18-decimal fixed point.
    pub strike_price: U256,
    /// Premium per lot, 18-decimal fixed point.
    pub premium: U256,
    /// Expiry as Unix seconds.
    pub expiry: u64,
    /// Whether the order is still active on the ledger.
    pub is_active: bool,
    /// Creating transaction hash, resolved from event logs when available.
    pub tx_hash: Option<String>,
}

/// An order as announced through the overlay.
///
/// Created in `Pending` status by the submission coordinator at
/// submission time, promoted in place to `Confirmed` after ledger
/// inclusion, and never deleted (an orphan stays pending forever).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRecord {
    /// Ledger instance this record concerns.
    pub contract_address: ContractAddress,
    pub option_type: OptionType,
    pub action: OrderAction,
    pub lots: u64,
    /// Strike price, 18-decimal fixed point.
    pub strike_price: U256,
    /// Premium per lot, 18-decimal fixed point.
    pub premium: U256,
    /// Expiry as Unix seconds.
    pub expiry: u64,
    /// Empty until ledger confirmation; immutable afterwards.
    pub transaction_hash: String,
    /// `"pending"` until confirmation, then the signer address.
    pub trader: String,
    pub status: OrderStatus,
    /// Creation instant in Unix milliseconds. Doubles as sort key and as
    /// part of the overlay key.
    pub timestamp: u64,
    /// Account that initiated the submission.
    pub account_address: String,
}

impl OverlayRecord {
    /// Whether this record is exempt from dedup (pending, no hash yet).
    pub fn is_speculative(&self) -> bool {
        self.status == OrderStatus::Pending && self.transaction_hash.is_empty()
    }

    /// Promote a pending record after ledger inclusion.
    ///
    /// Sets the immutable transaction hash and replaces the placeholder
    /// trader with the signer address.
    pub fn promoted(&self, tx_hash: &str, signer: &str) -> Self {
        let mut next = self.clone();
        next.status = OrderStatus::Confirmed;
        next.transaction_hash = tx_hash.to_string();
        next.trader = signer.to_string();
        next
    }
}

/// Derive the overlay key for a record: `{contractAddress}_{timestampMillis}`.
///
/// The key space is only as unique as the millis supplied; the coordinator
/// draws them from [`MonotonicMillis`] so rapid same-account submissions
/// still get distinct keys.
pub fn overlay_key(contract_address: &str, timestamp_ms: u64) -> OverlayKey {
    format!("{contract_address}_{timestamp_ms}")
}

/// Overlay topic for one ledger instance.
///
/// Subscriptions are partitioned per contract so a client only receives
/// events relevant to it.
pub fn overlay_topic(contract_address: &str) -> String {
    format!("orders/{contract_address}")
}

/// Value to attach to the ledger transaction for an order.
///
/// Buys escrow the full premium (`premium × lots`); sells attach zero.
pub fn attached_value(action: OrderAction, premium: U256, lots: u64) -> U256 {
    match action {
        OrderAction::Buy => premium * U256::from(lots),
        OrderAction::Sell => U256::ZERO,
    }
}

/// Process-monotonic millisecond clock.
///
/// Returns `max(wall_clock_ms, last + 1)` so no two calls observe the same
/// value even within one wall millisecond. Keeps overlay keys unique per
/// process without changing the wire key format.
#[derive(Debug, Default)]
pub struct MonotonicMillis {
    last: AtomicU64,
}

impl MonotonicMillis {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Next unique millisecond timestamp.
    pub fn next(&self) -> u64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => prev = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18))
    }

    #[test]
    fn test_attached_value_buy_is_premium_times_lots() {
        // premium 0.5, lots 3 => 1.5
        let half = eth(1) / U256::from(2);
        let value = attached_value(OrderAction::Buy, half, 3);
        assert_eq!(value, eth(3) / U256::from(2));
    }

    #[test]
    fn test_attached_value_sell_is_zero() {
        let half = eth(1) / U256::from(2);
        assert_eq!(attached_value(OrderAction::Sell, half, 3), U256::ZERO);
    }

    #[test]
    fn test_overlay_key_format() {
        assert_eq!(overlay_key("0xabc", 1700000000123), "0xabc_1700000000123");
    }

    #[test]
    fn test_monotonic_millis_never_repeats() {
        let clock = MonotonicMillis::new();
        let a = clock.next();
        let b = clock.next();
        let c = clock.next();
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn test_promotion_sets_hash_and_trader() {
        let rec = OverlayRecord {
            contract_address: "0xabc".into(),
            option_type: OptionType::Call,
            action: OrderAction::Buy,
            lots: 2,
            strike_price: eth(1500),
            premium: eth(1),
            expiry: 1_800_000_000,
            transaction_hash: String::new(),
            trader: PENDING_TRADER.into(),
            status: OrderStatus::Pending,
            timestamp: 42,
            account_address: "0xdead".into(),
        };
        assert!(rec.is_speculative());

        let promoted = rec.promoted("0xhash", "0xsigner");
        assert_eq!(promoted.status, OrderStatus::Confirmed);
        assert_eq!(promoted.transaction_hash, "0xhash");
        assert_eq!(promoted.trader, "0xsigner");
        assert!(!promoted.is_speculative());
        // Identity fields are untouched by promotion
        assert_eq!(promoted.timestamp, 42);
        assert_eq!(promoted.lots, 2);
    }

    #[test]
    fn test_overlay_record_wire_field_names() {
        let rec = OverlayRecord {
            contract_address: "0xabc".into(),
            option_type: OptionType::Put,
            action: OrderAction::Sell,
            lots: 1,
            strike_price: U256::from(7),
            premium: U256::from(3),
            expiry: 100,
            transaction_hash: String::new(),
            trader: PENDING_TRADER.into(),
            status: OrderStatus::Pending,
            timestamp: 9,
            account_address: "0xme".into(),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("contractAddress").is_some());
        assert!(json.get("transactionHash").is_some());
        assert!(json.get("accountAddress").is_some());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["optionType"], "put");
        assert_eq!(json["action"], "sell");
    }
}

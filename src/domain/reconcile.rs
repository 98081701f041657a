//! Reconciliation Engine - Ledger/Overlay Merge
//!
//! Merges a ledger query result set and an overlay snapshot into one
//! deduplicated, status-annotated list:
//!
//! `merged = L ++ { o ∈ O : tx(o) ∉ { tx(l) : l ∈ L } }`
//!
//! Dedup keys on `(contract, transaction hash)`; ledger hashes are
//! resolved from `OptionCreated` event logs by the ledger client. Overlay
//! records without a hash (status = pending) are exempt from dedup and
//! always shown. Ledger rows keep ledger read order; overlay-only rows are
//! sorted by timestamp descending and appended after.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::order::{
    ContractAddress, LedgerOrder, OrderAction, OrderStatus, OptionType, OverlayKey,
    OverlayRecord,
};
use alloy::primitives::U256;

/// Which source a merged row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderOrigin {
    Ledger,
    Overlay,
}

/// One row of the merged view.
#[derive(Debug, Clone, Serialize)]
pub struct MergedOrder {
    pub origin: OrderOrigin,
    pub contract_address: ContractAddress,
    pub option_type: OptionType,
    pub action: OrderAction,
    pub lots: u64,
    pub strike_price: U256,
    pub premium: U256,
    pub expiry: u64,
    pub trader: String,
    pub status: OrderStatus,
    /// Empty for pending overlay rows and for ledger rows whose creating
    /// transaction could not be resolved.
    pub transaction_hash: String,
    /// Overlay creation millis; zero for ledger-origin rows.
    pub timestamp: u64,
    /// Only meaningful for ledger-origin rows.
    pub is_active: Option<bool>,
}

impl MergedOrder {
    fn from_ledger(contract: &str, order: &LedgerOrder) -> Self {
        Self {
            origin: OrderOrigin::Ledger,
            contract_address: contract.to_string(),
            option_type: order.option_type,
            action: order.action,
            lots: order.lots,
            strike_price: order.strike_price,
            premium: order.premium,
            expiry: order.expiry,
            trader: order.trader.clone(),
            status: OrderStatus::Confirmed,
            transaction_hash: order.tx_hash.clone().unwrap_or_default(),
            timestamp: 0,
            is_active: Some(order.is_active),
        }
    }

    fn from_overlay(record: &OverlayRecord) -> Self {
        Self {
            origin: OrderOrigin::Overlay,
            contract_address: record.contract_address.clone(),
            option_type: record.option_type,
            action: record.action,
            lots: record.lots,
            strike_price: record.strike_price,
            premium: record.premium,
            expiry: record.expiry,
            trader: record.trader.clone(),
            status: record.status,
            transaction_hash: record.transaction_hash.clone(),
            timestamp: record.timestamp,
            is_active: None,
        }
    }
}

/// Merge a ledger result set with an overlay snapshot for one contract.
///
/// Overlay records whose non-empty transaction hash also appears among the
/// ledger rows are dropped as duplicates; everything else survives.
pub fn merge(
    contract: &str,
    ledger: &[LedgerOrder],
    overlay: &[OverlayRecord],
) -> Vec<MergedOrder> {
    let settled: HashSet<&str> = ledger
        .iter()
        .filter_map(|l| l.tx_hash.as_deref())
        .filter(|h| !h.is_empty())
        .collect();

    let mut rows: Vec<MergedOrder> = ledger
        .iter()
        .map(|l| MergedOrder::from_ledger(contract, l))
        .collect();

    let mut overlay_only: Vec<&OverlayRecord> = overlay
        .iter()
        .filter(|o| {
            o.transaction_hash.is_empty() || !settled.contains(o.transaction_hash.as_str())
        })
        .collect();
    overlay_only.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    rows.extend(overlay_only.into_iter().map(MergedOrder::from_overlay));
    rows
}

/// In-memory merged view for one contract address.
///
/// Holds the last full ledger read plus every overlay record seen so far,
/// keyed by overlay key. Gossip events are applied as deltas against this
/// state instead of triggering a re-fetch of both sources; a full
/// [`MergedView::replace`] remains the startup and recovery path.
#[derive(Debug, Default)]
pub struct MergedView {
    contract: ContractAddress,
    ledger: Vec<LedgerOrder>,
    overlay: HashMap<OverlayKey, OverlayRecord>,
}

impl MergedView {
    pub fn new(contract: impl Into<ContractAddress>) -> Self {
        Self {
            contract: contract.into(),
            ledger: Vec::new(),
            overlay: HashMap::new(),
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Replace both sides wholesale (startup / recovery path).
    pub fn replace(&mut self, ledger: Vec<LedgerOrder>, overlay: Vec<OverlayRecord>) {
        self.ledger = ledger;
        self.overlay = overlay
            .into_iter()
            .map(|r| {
                let key = super::order::overlay_key(&r.contract_address, r.timestamp);
                (key, r)
            })
            .collect();
    }

    /// Apply one delivered overlay mutation as a delta.
    ///
    /// Upserts the record under its key. Returns true when the view
    /// changed. Records for other contracts are ignored (the dispatcher
    /// subscribes per-contract, so this only guards against misrouted
    /// gossip).
    pub fn apply_overlay_event(&mut self, key: &str, record: OverlayRecord) -> bool {
        if record.contract_address != self.contract {
            return false;
        }
        match self.overlay.get(key) {
            Some(existing) if *existing == record => false,
            _ => {
                self.overlay.insert(key.to_string(), record);
                true
            }
        }
    }

    /// Compute the merged rows from the in-memory state.
    pub fn rows(&self) -> Vec<MergedOrder> {
        let overlay: Vec<OverlayRecord> = self.overlay.values().cloned().collect();
        merge(&self.contract, &self.ledger, &overlay)
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{overlay_key, PENDING_TRADER};

    fn ledger_order(id: u64, hash: Option<&str>) -> LedgerOrder {
        LedgerOrder {
            option_id: id,
            trader: "0xtrader".into(),
            option_type: OptionType::Call,
            action: OrderAction::Buy,
            lots: 1,
            strike_price: U256::from(1500),
            premium: U256::from(10),
            expiry: 1_800_000_000,
            is_active: true,
            tx_hash: hash.map(str::to_string),
        }
    }

    fn overlay_record(ts: u64, hash: &str) -> OverlayRecord {
        OverlayRecord {
            contract_address: "0xc".into(),
            option_type: OptionType::Call,
            action: OrderAction::Buy,
            lots: 1,
            strike_price: U256::from(1500),
            premium: U256::from(10),
            expiry: 1_800_000_000,
            transaction_hash: hash.to_string(),
            trader: if hash.is_empty() {
                PENDING_TRADER.into()
            } else {
                "0xtrader".into()
            },
            status: if hash.is_empty() {
                OrderStatus::Pending
            } else {
                OrderStatus::Confirmed
            },
            timestamp: ts,
            account_address: "0xme".into(),
        }
    }

    #[test]
    fn test_confirmed_duplicate_appears_once() {
        let ledger = vec![ledger_order(1, Some("0xaaa"))];
        let overlay = vec![overlay_record(100, "0xaaa")];

        let rows = merge("0xc", &ledger, &overlay);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].origin, OrderOrigin::Ledger);
        assert_eq!(rows[0].transaction_hash, "0xaaa");
    }

    #[test]
    fn test_pending_records_survive_dedup() {
        let ledger = vec![ledger_order(1, Some("0xaaa"))];
        let overlay = vec![overlay_record(100, ""), overlay_record(200, "")];

        let rows = merge("0xc", &ledger, &overlay);
        assert_eq!(rows.len(), 3);
        let pending = rows
            .iter()
            .filter(|r| r.status == OrderStatus::Pending)
            .count();
        assert_eq!(pending, 2);
    }

    #[test]
    fn test_merged_length_is_n_plus_m_minus_k() {
        // N=3 overlay, M=2 ledger, K=1 matching hash => 4 rows
        let ledger = vec![ledger_order(1, Some("0xaaa")), ledger_order(2, Some("0xbbb"))];
        let overlay = vec![
            overlay_record(1, "0xaaa"),
            overlay_record(2, "0xccc"),
            overlay_record(3, ""),
        ];

        let rows = merge("0xc", &ledger, &overlay);
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_ledger_without_hash_never_matches() {
        // Unresolvable ledger hash: overlay confirmed row is kept as a
        // distinct entry rather than silently deduped.
        let ledger = vec![ledger_order(1, None)];
        let overlay = vec![overlay_record(1, "0xaaa")];

        let rows = merge("0xc", &ledger, &overlay);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_overlay_rows_sorted_newest_first_after_ledger() {
        let ledger = vec![ledger_order(1, Some("0xaaa"))];
        let overlay = vec![overlay_record(100, ""), overlay_record(300, ""), overlay_record(200, "")];

        let rows = merge("0xc", &ledger, &overlay);
        assert_eq!(rows[0].origin, OrderOrigin::Ledger);
        let stamps: Vec<u64> = rows[1..].iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![300, 200, 100]);
    }

    #[test]
    fn test_view_delta_matches_full_merge() {
        let mut view = MergedView::new("0xc");
        view.replace(vec![ledger_order(1, Some("0xaaa"))], vec![overlay_record(100, "")]);
        assert_eq!(view.rows().len(), 2);

        let rec = overlay_record(200, "");
        let key = overlay_key(&rec.contract_address, rec.timestamp);
        assert!(view.apply_overlay_event(&key, rec.clone()));

        // Delta application equals a full re-merge over the same sets
        let full = merge(
            "0xc",
            &[ledger_order(1, Some("0xaaa"))],
            &[overlay_record(100, ""), overlay_record(200, "")],
        );
        assert_eq!(view.rows().len(), full.len());

        // Redelivery of the identical record is a no-op (at-least-once)
        assert!(!view.apply_overlay_event(&key, rec));
    }

    #[test]
    fn test_view_ignores_foreign_contract() {
        let mut view = MergedView::new("0xc");
        let mut rec = overlay_record(100, "");
        rec.contract_address = "0xother".into();
        assert!(!view.apply_overlay_event("0xother_100", rec));
        assert_eq!(view.overlay_len(), 0);
    }

    #[test]
    fn test_promotion_upsert_replaces_pending_row() {
        let mut view = MergedView::new("0xc");
        let pending = overlay_record(100, "");
        let key = overlay_key(&pending.contract_address, pending.timestamp);
        view.apply_overlay_event(&key, pending.clone());

        let confirmed = pending.promoted("0xaaa", "0xtrader");
        assert!(view.apply_overlay_event(&key, confirmed));

        let rows = view.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, OrderStatus::Confirmed);
        assert_eq!(rows[0].transaction_hash, "0xaaa");
    }
}

//! Overlay Adapters - Eventually-Consistent Order Gossip
//!
//! - `store`: in-process mesh store with per-field last-writer-wins merge
//!   and per-contract topic broadcast
//! - `relay`: WebSocket peer link that syncs put envelopes with a relay,
//!   auto-reconnecting after disconnects

pub mod relay;
pub mod store;

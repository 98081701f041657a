//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `LedgerClient`: authoritative on-chain order submission and queries
//! - `OverlayStore`: eventually-consistent pending-order gossip
//! - `IntentOutbox`: durable submission-intent log

pub mod ledger;
pub mod outbox;
pub mod overlay;

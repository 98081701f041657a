//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (blockchain RPC, WebSockets, file I/O, HTTP).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: options-ledger contract interaction via alloy-rs
//! - `overlay`: eventually-consistent mesh store + WebSocket relay link
//! - `persistence`: JSONL submission-intent outbox
//! - `metrics`: Prometheus metrics export
//! - `api`: axum HTTP surface (health, merged view, submission)

pub mod api;
pub mod chain;
pub mod metrics;
pub mod overlay;
pub mod persistence;

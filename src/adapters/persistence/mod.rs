//! Persistence Adapters - Durable Local State
//!
//! JSONL-based intent outbox. No database dependency — lightweight
//! append-only log format optimized for audit trails and crash recovery.

pub mod outbox;

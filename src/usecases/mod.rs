//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces. Each use case is a
//! self-contained coordination workflow:
//!
//! - `SubmissionCoordinator`: pending→confirmed lifecycle of one order
//! - `SubscriptionDispatcher`: gossip-driven merged-view maintenance
//! - `OutboxSweeper`: periodic expiry of unresolved submission intents

pub mod dispatcher;
pub mod outbox_sweep;
pub mod submission;

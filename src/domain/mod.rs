//! Domain Layer - Order Types and Reconciliation Algebra
//!
//! Pure business logic with no I/O dependencies. Defines the two order
//! representations (authoritative ledger vs. speculative overlay) and the
//! merge-and-deduplicate algebra that stitches them into one
//! status-annotated view.

pub mod order;
pub mod reconcile;

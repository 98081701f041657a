//! HTTP API Adapter - Order and Wallet Surface
//!
//! Axum 0.7 REST surface for the node: merged order views, order
//! submission, and wallet introspection. Monetary amounts cross this
//! boundary as decimal strings; everything below it is 18-decimal
//! fixed-point integers.

pub mod server;

pub use server::{ApiServer, ApiState};

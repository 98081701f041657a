//! Chain Adapters - Options Ledger via alloy-rs
//!
//! - `provider`: RPC connection management and optional wallet signer
//! - `contracts`: `LedgerClient` implementation for the options-trading
//!   ledger contract

pub mod contracts;
pub mod provider;

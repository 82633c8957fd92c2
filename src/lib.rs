//! Portfolio simulation service: an append-only trade ledger plus a cash
//! balance that only moves in the same atomic unit as a ledger append.
//! Holdings are never stored; every read derives them from the ledger.

pub mod api;
pub mod config;
pub mod engine;
pub mod portfolio;
pub mod quotes;
pub mod store;
pub mod types;

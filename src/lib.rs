//! Balance-consistency core of a retail banking ledger.
//!
//! Deposits, withdrawals, transfers and service payments run through
//! [`engine::LedgerEngine`], which serializes operations on overlapping accounts,
//! commits each balance change together with its transaction record, and reports
//! committed balances to audit sinks.

pub mod config;
pub mod engine;
pub mod events;
pub mod gateway;
pub mod guard;
pub mod models;
pub mod storage;
pub mod types;

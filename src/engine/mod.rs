mod errors;
mod ledger_engine;
mod receipt;
#[cfg(test)]
mod tests;

pub use errors::EngineError;
pub use ledger_engine::LedgerEngine;
pub use receipt::{BalanceRead, BalanceSource, Receipt};

use chrono::{DateTime, Utc};

use crate::models::{TransactionKind, TransactionStatus};
use crate::storage::BalanceUpdate;
use crate::types::{AccountId, Money, TransactionId};

/// The definitive result of a completed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_id: TransactionId,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Money,
    /// Committed balance of every account the operation changed.
    pub balances: Vec<BalanceUpdate>,
    pub created_at: DateTime<Utc>,
    /// `true` when this receipt was returned for a repeated idempotency key.
    pub replayed: bool
}

impl Receipt {
    pub fn balance_of(&self, account_id: AccountId) -> Option<Money> {
        self.balances.iter()
            .find(|update| update.account_id == account_id)
            .map(|update| update.balance)
    }
}

/// Where a balance read was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceSource {
    Cache,
    Store
}

/// A committed balance together with the version it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceRead {
    pub balance: Money,
    pub version: u64,
    pub source: BalanceSource
}

use crate::models::ValidationError;
use crate::types::{AccountId, Money, TransactionId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account [{account_id}] was not found")]
    AccountNotFound {
        account_id: AccountId
    },
    #[error("Account number [{account_number}] was not found")]
    AccountNumberNotFound {
        account_number: String
    },
    #[error("User [{0}] was not found")]
    UserNotFound(String),
    #[error("Transaction [{transaction_id}] was not found")]
    TransactionNotFound {
        transaction_id: TransactionId
    },
    #[error("Version conflict for account [{account_id}]: expected [{expected}], found [{actual}]")]
    VersionConflict {
        account_id: AccountId,
        expected: u64,
        actual: u64
    },
    #[error("Insufficient funds in account [{account_id}]: balance [{balance}], change [{delta}]")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Money,
        delta: Money
    },
    #[error("Balance overflow for account [{account_id}]")]
    Overflow {
        account_id: AccountId
    },
    #[error("Account number [{0}] is already in use")]
    DuplicateAccountNumber(String),
    #[error("Username [{0}] is already taken")]
    DuplicateUsername(String),
    #[error("Email [{0}] is already registered")]
    DuplicateEmail(String),
    #[error("Transaction [{0}] was already recorded")]
    DuplicateTransaction(TransactionId),
    #[error("Owner [{0}] does not exist")]
    OwnerNotFound(UserId),
    #[error("Rejected transaction record: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Ledger store unavailable: {0}")]
    Unavailable(String),
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot is malformed: {0}")]
    Serialization(#[from] serde_json::Error)
}

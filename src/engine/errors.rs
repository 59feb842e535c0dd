use std::time::Duration;

use thiserror::Error;

use crate::guard::GuardError;
use crate::models::ValidationError;
use crate::storage::StoreError;
use crate::types::{AccountId, Money, TransactionId};

/// Every way an operation can end without completing.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Account [{account_id}] was not found")]
    AccountNotFound {
        account_id: AccountId
    },
    #[error("Insufficient funds for transaction [{transaction_id}] on account [{account_id}]: available [{available}], requested [{requested}]")]
    InsufficientFunds {
        account_id: AccountId,
        transaction_id: TransactionId,
        available: Money,
        requested: Money
    },
    #[error("Version conflict on account [{account_id}] after {attempts} attempt(s)")]
    VersionConflict {
        account_id: AccountId,
        attempts: u32
    },
    #[error("Timed out after {waited:?} waiting for account [{account_id}]")]
    LockTimeout {
        account_id: AccountId,
        waited: Duration
    },
    #[error("Internal ledger failure: {reason}")]
    Internal {
        transaction_id: Option<TransactionId>,
        reason: String
    }
}

impl EngineError {
    /// Whether the same operation may succeed if submitted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::LockTimeout { .. } | Self::Internal { .. })
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal { transaction_id: None, reason: reason.into() }
    }
}

impl From<GuardError> for EngineError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::LockTimeout { account_id, waited } => Self::LockTimeout { account_id, waited }
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::AccountNotFound { account_id } => Self::AccountNotFound { account_id },
            StoreError::VersionConflict { account_id, .. } => Self::VersionConflict { account_id, attempts: 1 },
            StoreError::Validation(error) => Self::Validation(error),
            other => Self::internal(other.to_string())
        }
    }
}

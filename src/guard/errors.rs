use std::time::Duration;

use thiserror::Error;

use crate::types::AccountId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("Timed out after {waited:?} waiting for the lock on account [{account_id}]")]
    LockTimeout {
        account_id: AccountId,
        waited: Duration
    }
}

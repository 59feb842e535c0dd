use crate::types::{AccountId, MoneyError, UserId};
use thiserror::Error;

/// Input that can never succeed no matter how often it is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0}")]
    InvalidAmount(#[from] MoneyError),
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String
    },
    #[error("Unknown {field} '{value}'")]
    UnknownVariant {
        field: &'static str,
        value: String
    },
    #[error("Source and destination account are the same [{account_id}]")]
    SameAccount {
        account_id: AccountId
    },
    #[error("Account [{account_id}] does not belong to user [{owner_id}]")]
    NotAccountOwner {
        account_id: AccountId,
        owner_id: UserId
    }
}

impl ValidationError {
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField { field, reason: reason.into() }
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::InvalidField { field, reason: "is required".to_string() }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{check_length, closed_enum, ValidationError};
use crate::types::{AccountId, Money, UserId};

closed_enum!(
    AccountType, "account type" {
        Checking => "checking",
        Savings => "savings",
        Investment => "investment"
    }
);

/// The committed state of a single account.
///
/// `balance` and `version` always travel together: every balance mutation bumps the
/// version, and readers only ever see both from the same committed snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Human-facing number, unique and immutable after creation.
    pub account_number: String,
    pub account_type: AccountType,
    /// Never negative once committed.
    pub balance: Money,
    pub owner_id: UserId,
    /// Optimistic-concurrency token, incremented on every balance mutation.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

impl Account {
    pub fn open(request: NewAccount, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            account_number: request.account_number,
            account_type: request.account_type,
            balance: request.opening_balance,
            owner_id: request.owner_id,
            version: 0,
            created_at: now,
            updated_at: now
        }
    }
}

/// A request to open an account for an existing user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub account_number: String,
    pub account_type: AccountType,
    pub owner_id: UserId,
    pub opening_balance: Money
}

impl NewAccount {
    pub fn new(account_number: impl Into<String>, account_type: AccountType, owner_id: UserId) -> Self {
        Self {
            account_number: account_number.into(),
            account_type,
            owner_id,
            opening_balance: Money::ZERO
        }
    }

    pub fn with_opening_balance(mut self, opening_balance: Money) -> Self {
        self.opening_balance = opening_balance;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_length("account number", &self.account_number, 10, 20)?;

        if self.opening_balance.is_negative() {
            return Err(ValidationError::invalid_field("opening balance", "must not be negative"));
        }

        Ok(())
    }
}

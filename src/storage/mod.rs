mod errors;
mod memory_store;

use crate::models::{Account, NewAccount, NewUser, TransactionRecord, User};
use crate::types::{AccountId, Money, TransactionId, UserId};

pub use errors::StoreError;
pub use memory_store::{CommitStage, MemoryLedgerStore};

/// A signed change to one account's balance, guarded by the version the caller last read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub account_id: AccountId,
    pub delta: Money,
    pub expected_version: u64
}

/// The committed balance and version of an account after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub account_id: AccountId,
    pub balance: Money,
    pub version: u64
}

impl From<&Account> for BalanceUpdate {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            balance: account.balance,
            version: account.version
        }
    }
}

/// Durable home of accounts, users and transaction records.
///
/// The store is the only component allowed to change a balance. Every write is
/// all-or-nothing: a failed call leaves no trace, and readers never observe a balance
/// without its version bump or a record without its balance mutations.
pub trait LedgerStore: Send + Sync + 'static {
    fn create_user(&self, request: NewUser) -> Result<User, StoreError>;
    fn get_user(&self, user_id: UserId) -> Result<User, StoreError>;
    fn find_user_by_username(&self, username: &str) -> Result<User, StoreError>;

    fn open_account(&self, request: NewAccount) -> Result<Account, StoreError>;
    fn get_account(&self, account_id: AccountId) -> Result<Account, StoreError>;
    fn find_account_by_number(&self, account_number: &str) -> Result<Account, StoreError>;
    /// All accounts ordered by account number.
    fn accounts(&self) -> Result<Vec<Account>, StoreError>;
    fn accounts_owned_by(&self, owner_id: UserId) -> Result<Vec<Account>, StoreError>;

    /// Latest committed balance.
    fn get_balance(&self, account_id: AccountId) -> Result<Money, StoreError> {
        Ok(self.get_account(account_id)?.balance)
    }

    /// `false` when the account is missing or owned by someone else.
    fn account_exists_and_belongs_to(&self, account_id: AccountId, owner_id: UserId) -> Result<bool, StoreError> {
        match self.get_account(account_id) {
            Ok(account) => Ok(account.owner_id == owner_id),
            Err(StoreError::AccountNotFound { .. }) => Ok(false),
            Err(error) => Err(error)
        }
    }

    /// Applies a single mutation without a record. Fails with `VersionConflict` or
    /// `InsufficientFunds` without changing anything.
    fn apply_mutation(&self, account_id: AccountId, delta: Money, expected_version: u64) -> Result<BalanceUpdate, StoreError>;

    /// Persists a terminal record together with every balance mutation it caused, as one unit.
    fn record_transaction(&self, record: TransactionRecord, mutations: &[Mutation]) -> Result<Vec<BalanceUpdate>, StoreError>;

    fn get_transaction(&self, transaction_id: TransactionId) -> Result<TransactionRecord, StoreError>;

    /// Records naming the account, newest first, at most `limit` of them.
    fn transaction_history(&self, account_id: AccountId, limit: usize) -> Result<Vec<TransactionRecord>, StoreError>;
}

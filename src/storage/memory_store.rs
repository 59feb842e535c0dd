use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Account, NewAccount, NewUser, TransactionRecord, TransactionStatus, User};
use crate::storage::{BalanceUpdate, LedgerStore, Mutation, StoreError};
use crate::types::{AccountId, Money, TransactionId, UserId};

/// Points inside a commit where a failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitStage {
    /// New balances are computed but not yet visible.
    BalancesStaged,
    /// The transaction record is prepared but not yet visible.
    RecordStaged
}

#[derive(Debug, Default)]
struct LedgerState {
    users: HashMap<UserId, User>,
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, TransactionRecord>,
    /// Transaction ids in commit order.
    journal: Vec<TransactionId>,
    history: HashMap<AccountId, Vec<TransactionId>>,
    usernames: HashMap<String, UserId>,
    emails: HashMap<String, UserId>,
    account_numbers: HashMap<String, AccountId>
}

impl LedgerState {
    fn insert_user(&mut self, user: User) -> Result<(), StoreError> {
        if self.usernames.contains_key(&user.username) {
            return Err(StoreError::DuplicateUsername(user.username));
        }

        let email = user.email.to_lowercase();

        if self.emails.contains_key(&email) {
            return Err(StoreError::DuplicateEmail(user.email));
        }

        self.usernames.insert(user.username.clone(), user.id);
        self.emails.insert(email, user.id);
        self.users.insert(user.id, user);

        Ok(())
    }

    fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        if self.account_numbers.contains_key(&account.account_number) {
            return Err(StoreError::DuplicateAccountNumber(account.account_number));
        }

        if !self.users.contains_key(&account.owner_id) {
            return Err(StoreError::OwnerNotFound(account.owner_id));
        }

        self.account_numbers.insert(account.account_number.clone(), account.id);
        self.accounts.insert(account.id, account);

        Ok(())
    }

    fn account(&self, account_id: AccountId) -> Result<&Account, StoreError> {
        self.accounts.get(&account_id).ok_or(StoreError::AccountNotFound { account_id })
    }

    fn check_record(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        if !record.status.is_terminal() {
            return Err(StoreError::InvalidRecord(format!("transaction [{}] is still pending", record.id)));
        }

        if self.transactions.contains_key(&record.id) {
            return Err(StoreError::DuplicateTransaction(record.id));
        }

        for account_id in record.accounts() {
            self.account(account_id)?;
        }

        Ok(())
    }

    /// Computes the post-commit copy of every mutated account without touching the live state.
    fn stage(&self, mutations: &[Mutation], now: DateTime<Utc>) -> Result<Vec<Account>, StoreError> {
        let mut seen = HashSet::with_capacity(mutations.len());
        let mut staged = Vec::with_capacity(mutations.len());

        for mutation in mutations {
            if !seen.insert(mutation.account_id) {
                return Err(StoreError::InvalidRecord(format!("account [{}] mutated twice in one commit", mutation.account_id)));
            }

            let mut account = self.account(mutation.account_id)?.clone();

            if account.version != mutation.expected_version {
                return Err(StoreError::VersionConflict {
                    account_id: account.id,
                    expected: mutation.expected_version,
                    actual: account.version
                });
            }

            let balance = account.balance.checked_add(mutation.delta)
                .map_err(|_| StoreError::Overflow { account_id: account.id })?;

            if balance.is_negative() {
                return Err(StoreError::InsufficientFunds {
                    account_id: account.id,
                    balance: account.balance,
                    delta: mutation.delta
                });
            }

            account.balance = balance;
            account.version += 1;
            account.updated_at = now;
            staged.push(account);
        }

        Ok(staged)
    }

    fn publish(&mut self, staged: Vec<Account>) -> Vec<BalanceUpdate> {
        staged.into_iter()
            .map(|account| {
                let update = BalanceUpdate::from(&account);
                self.accounts.insert(account.id, account);
                update
            })
            .collect()
    }

    fn append(&mut self, record: TransactionRecord) {
        for account_id in record.accounts() {
            self.history.entry(account_id).or_default().push(record.id);
        }

        self.journal.push(record.id);
        self.transactions.insert(record.id, record);
    }
}

/// On-disk form of the ledger. Records are kept in commit order so history survives a reload.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    users: Vec<User>,
    accounts: Vec<Account>,
    transactions: Vec<TransactionRecord>
}

/// In-memory ledger store with JSON snapshot persistence.
///
/// All state sits behind a single lock, so a commit that touches several accounts and
/// a record becomes visible in one step. Faults can be armed per `CommitStage` to
/// exercise the all-or-nothing paths.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: RwLock<LedgerState>,
    faults: DashMap<CommitStage, usize>
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` commits fail once they reach `stage`.
    pub fn inject_fault(&self, stage: CommitStage, times: usize) {
        self.faults.insert(stage, times);
    }

    /// Loads a snapshot written by [`MemoryLedgerStore::save_snapshot`].
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let bytes = fs::read(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        let mut state = LedgerState::default();

        for user in snapshot.users {
            state.insert_user(user)?;
        }

        for account in snapshot.accounts {
            if account.balance.is_negative() {
                return Err(StoreError::InvalidRecord(format!("account [{}] has a negative balance", account.id)));
            }

            state.insert_account(account)?;
        }

        for record in snapshot.transactions {
            state.check_record(&record)?;
            state.append(record);
        }

        debug!("Loaded ledger snapshot with {} accounts and {} transactions", state.accounts.len(), state.journal.len());

        Ok(Self {
            state: RwLock::new(state),
            faults: DashMap::new()
        })
    }

    /// Writes the full ledger to `path`, going through a temporary file so a crash never
    /// leaves a half-written snapshot behind.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let snapshot = {
            let state = self.read()?;
            let mut users: Vec<User> = state.users.values().cloned().collect();
            let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
            users.sort_by(|a, b| a.username.cmp(&b.username));
            accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));

            Snapshot {
                users,
                accounts,
                transactions: state.journal.iter()
                    .filter_map(|id| state.transactions.get(id).cloned())
                    .collect()
            }
        };

        let temporary = path.with_extension("tmp");
        fs::write(&temporary, serde_json::to_vec_pretty(&snapshot)?)?;
        fs::rename(&temporary, path)?;

        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state.read().map_err(|_| StoreError::Unavailable("ledger lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state.write().map_err(|_| StoreError::Unavailable("ledger lock poisoned".to_string()))
    }

    fn trip(&self, stage: CommitStage) -> Result<(), StoreError> {
        if let Some(mut remaining) = self.faults.get_mut(&stage) {
            if *remaining > 0 {
                *remaining -= 1;
                warn!("Injected store fault at {stage:?}");
                return Err(StoreError::Unavailable(format!("injected fault at {stage:?}")));
            }
        }

        Ok(())
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn create_user(&self, request: NewUser) -> Result<User, StoreError> {
        request.validate()?;

        let user = User::register(request, Utc::now());
        self.write()?.insert_user(user.clone())?;

        Ok(user)
    }

    fn get_user(&self, user_id: UserId) -> Result<User, StoreError> {
        self.read()?.users.get(&user_id).cloned()
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }

    fn find_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        let state = self.read()?;

        state.usernames.get(username)
            .and_then(|id| state.users.get(id))
            .cloned()
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))
    }

    fn open_account(&self, request: NewAccount) -> Result<Account, StoreError> {
        request.validate()?;

        let account = Account::open(request, Utc::now());
        self.write()?.insert_account(account.clone())?;

        Ok(account)
    }

    fn get_account(&self, account_id: AccountId) -> Result<Account, StoreError> {
        self.read()?.account(account_id).cloned()
    }

    fn find_account_by_number(&self, account_number: &str) -> Result<Account, StoreError> {
        let state = self.read()?;

        state.account_numbers.get(account_number)
            .and_then(|id| state.accounts.get(id))
            .cloned()
            .ok_or_else(|| StoreError::AccountNumberNotFound { account_number: account_number.to_string() })
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.read()?.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));

        Ok(accounts)
    }

    fn accounts_owned_by(&self, owner_id: UserId) -> Result<Vec<Account>, StoreError> {
        Ok(self.accounts()?.into_iter().filter(|account| account.owner_id == owner_id).collect())
    }

    fn get_balance(&self, account_id: AccountId) -> Result<Money, StoreError> {
        Ok(self.read()?.account(account_id)?.balance)
    }

    fn apply_mutation(&self, account_id: AccountId, delta: Money, expected_version: u64) -> Result<BalanceUpdate, StoreError> {
        let mut state = self.write()?;
        let staged = state.stage(&[Mutation { account_id, delta, expected_version }], Utc::now())?;

        self.trip(CommitStage::BalancesStaged)?;

        state.publish(staged).pop()
            .ok_or_else(|| StoreError::Unavailable("mutation produced no balance".to_string()))
    }

    fn record_transaction(&self, record: TransactionRecord, mutations: &[Mutation]) -> Result<Vec<BalanceUpdate>, StoreError> {
        if record.status == TransactionStatus::Failed && !mutations.is_empty() {
            return Err(StoreError::InvalidRecord(format!("failed transaction [{}] cannot move funds", record.id)));
        }

        if let Some(stranger) = mutations.iter().find(|mutation| !record.involves(mutation.account_id)) {
            return Err(StoreError::InvalidRecord(format!(
                "transaction [{}] does not name account [{}]", record.id, stranger.account_id
            )));
        }

        let mut state = self.write()?;
        state.check_record(&record)?;

        let staged = state.stage(mutations, record.created_at)?;
        self.trip(CommitStage::BalancesStaged)?;
        self.trip(CommitStage::RecordStaged)?;

        let updates = state.publish(staged);
        state.append(record);

        Ok(updates)
    }

    fn get_transaction(&self, transaction_id: TransactionId) -> Result<TransactionRecord, StoreError> {
        self.read()?.transactions.get(&transaction_id).cloned()
            .ok_or(StoreError::TransactionNotFound { transaction_id })
    }

    fn transaction_history(&self, account_id: AccountId, limit: usize) -> Result<Vec<TransactionRecord>, StoreError> {
        let state = self.read()?;
        state.account(account_id)?;

        let Some(ids) = state.history.get(&account_id) else {
            return Ok(Vec::new())
        };

        Ok(ids.iter().rev()
            .take(limit)
            .filter_map(|id| state.transactions.get(id).cloned())
            .collect())
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::engine::{BalanceRead, BalanceSource, EngineError, Receipt};
use crate::events::{AuditEmitter, AuditEvent, BalanceCache};
use crate::guard::{AccountLocks, IdempotencyCache};
use crate::models::{
    Account, DepositMethod, Operation, OperationRequest, ServiceType, TransactionRecord, TransactionStatus,
    ValidationError, WithdrawalMethod
};
use crate::storage::{BalanceUpdate, LedgerStore, Mutation, StoreError};
use crate::types::{AccountId, Money, MoneyError, UserId};

/// What an idempotency key is bound to: the operation it was first used for, and its
/// receipt once that operation has completed.
#[derive(Clone)]
struct IdempotentOutcome {
    operation: Operation,
    receipt: Option<Receipt>
}

/// Applies deposits, withdrawals, transfers and service payments to a [`LedgerStore`].
///
/// Each operation is validated, then serialized against every other operation touching
/// the same accounts, checked for funds, and committed with its transaction record in a
/// single store call. Operations on disjoint accounts run fully in parallel.
pub struct LedgerEngine<S: LedgerStore> {
    store: Arc<S>,
    locks: AccountLocks,
    idempotency: IdempotencyCache<IdempotentOutcome>,
    emitter: AuditEmitter,
    balance_cache: Option<Arc<BalanceCache>>,
    config: EngineConfig
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Creates an engine over `store` that emits no audit events.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            locks: AccountLocks::new(config.lock_timeout),
            idempotency: IdempotencyCache::new(config.idempotency_capacity, config.idempotency_ttl),
            emitter: AuditEmitter::disabled(),
            balance_cache: None,
            config
        }
    }

    pub fn with_emitter(mut self, emitter: AuditEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    /// Serves balance reads from `cache` whenever its entry is still current.
    pub fn with_balance_cache(mut self, cache: Arc<BalanceCache>) -> Self {
        self.balance_cache = Some(cache);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    pub async fn deposit(&self, account_id: AccountId, amount: Money, method: DepositMethod, description: Option<String>) -> Result<Receipt, EngineError> {
        let operation = Operation::Deposit { account_id, amount, method, description, reference_number: None };
        self.submit(operation.into()).await
    }

    pub async fn withdraw(&self, account_id: AccountId, amount: Money, method: WithdrawalMethod, description: Option<String>) -> Result<Receipt, EngineError> {
        let operation = Operation::Withdrawal { account_id, amount, method, description };
        self.submit(operation.into()).await
    }

    pub async fn transfer(&self, from_account: AccountId, to_account: AccountId, amount: Money, description: Option<String>) -> Result<Receipt, EngineError> {
        let operation = Operation::Transfer { from_account, to_account, amount, description };
        self.submit(operation.into()).await
    }

    pub async fn pay_service(
        &self,
        account_id: AccountId,
        provider: String,
        service_type: ServiceType,
        amount: Money,
        reference_number: Option<String>
    ) -> Result<Receipt, EngineError> {
        let operation = Operation::ServicePayment { account_id, provider, service_type, amount, reference_number, description: None };
        self.submit(operation.into()).await
    }

    /// Runs one operation to a definitive result, restarting it on version conflicts up to
    /// the configured retry budget.
    pub async fn submit(&self, request: OperationRequest) -> Result<Receipt, EngineError> {
        let mut attempts = 1;

        loop {
            match self.attempt(&request).await {
                Err(EngineError::VersionConflict { account_id, .. }) if attempts <= self.config.max_retries => {
                    warn!("Version conflict on account [{account_id}], retrying (attempt {attempts})");
                    attempts += 1;
                }
                Err(EngineError::VersionConflict { account_id, .. }) => {
                    return Err(EngineError::VersionConflict { account_id, attempts });
                }
                result => return result
            }
        }
    }

    pub fn balance(&self, account_id: AccountId) -> Result<Money, EngineError> {
        Ok(self.read_balance(account_id)?.balance)
    }

    /// Reads a balance through the balance cache. A cached entry is only used when its
    /// version matches the store's; otherwise the store's value is returned and cached.
    pub fn read_balance(&self, account_id: AccountId) -> Result<BalanceRead, EngineError> {
        let account = self.store.get_account(account_id)?;
        let from_store = BalanceRead { balance: account.balance, version: account.version, source: BalanceSource::Store };

        let Some(cache) = &self.balance_cache else {
            return Ok(from_store)
        };

        match cache.get(account_id) {
            Some(cached) if cached.version == account.version => Ok(BalanceRead {
                balance: cached.balance,
                version: cached.version,
                source: BalanceSource::Cache
            }),
            _ => {
                debug!("Balance cache miss for account [{account_id}] at version {}", account.version);
                cache.refresh(&account);
                Ok(from_store)
            }
        }
    }

    pub fn account(&self, account_id: AccountId) -> Result<Account, EngineError> {
        Ok(self.store.get_account(account_id)?)
    }

    pub fn history(&self, account_id: AccountId, limit: usize) -> Result<Vec<TransactionRecord>, EngineError> {
        Ok(self.store.transaction_history(account_id, limit)?)
    }

    pub fn accounts_for(&self, owner_id: UserId) -> Result<Vec<Account>, EngineError> {
        Ok(self.store.accounts_owned_by(owner_id)?)
    }

    /// Waits until every audit event emitted so far has been handed to the sinks.
    pub async fn flush_events(&self) {
        self.emitter.flush().await;
    }

    async fn attempt(&self, request: &OperationRequest) -> Result<Receipt, EngineError> {
        let operation = &request.operation;

        self.validate(request)?;

        // Binds the key to this operation before any lock is taken, so concurrent requests
        // reusing the key for another operation are refused even on disjoint accounts.
        if let Some(key) = &request.idempotency_key {
            let outcome = self.idempotency.reserve(key.clone(), || IdempotentOutcome {
                operation: operation.clone(),
                receipt: None
            });

            if let Some(receipt) = Self::replay(key, operation, Some(outcome))? {
                return Ok(receipt);
            }
        }

        let accounts = operation.accounts();
        let locks = self.locks.acquire(&accounts).await?;

        debug!("Locked accounts {:?} for {} of {}", locks.accounts(), operation.kind(), operation.amount());

        // A duplicate may have committed while this request waited for the locks.
        if let Some(key) = &request.idempotency_key {
            if let Some(receipt) = Self::replay(key, operation, self.idempotency.get(key))? {
                return Ok(receipt);
            }
        }

        // Nothing below suspends, so once the commit lands the caller always gets its result.
        let receipt = self.commit(operation)?;

        if let Some(key) = &request.idempotency_key {
            self.idempotency.remember(key.clone(), IdempotentOutcome {
                operation: operation.clone(),
                receipt: Some(receipt.clone())
            });
        }

        drop(locks);

        Ok(receipt)
    }

    fn validate(&self, request: &OperationRequest) -> Result<(), EngineError> {
        let operation = &request.operation;
        operation.validate()?;

        for account_id in operation.accounts() {
            self.store.get_account(account_id)?;
        }

        if let (Some(caller), Some(debited)) = (request.caller, operation.debited_account()) {
            if !self.store.account_exists_and_belongs_to(debited, caller)? {
                warn!("User [{caller}] tried to debit account [{debited}] they do not own");
                return Err(ValidationError::NotAccountOwner { account_id: debited, owner_id: caller }.into());
            }
        }

        Ok(())
    }

    /// The earlier receipt for `key` if its operation already completed. `None` means the
    /// operation still has to run, either for the first time or after an earlier failure.
    fn replay(key: &str, operation: &Operation, outcome: Option<IdempotentOutcome>) -> Result<Option<Receipt>, EngineError> {
        let Some(outcome) = outcome else {
            return Ok(None)
        };

        if outcome.operation != *operation {
            return Err(ValidationError::invalid_field("idempotency key", format!("'{key}' was already used for a different operation")).into());
        }

        let Some(receipt) = outcome.receipt else {
            return Ok(None)
        };

        debug!("Replaying transaction [{}] for idempotency key '{key}'", receipt.transaction_id);

        Ok(Some(Receipt { replayed: true, ..receipt }))
    }

    /// Funds check, balance mutations and record write. Must run with every involved account locked.
    fn commit(&self, operation: &Operation) -> Result<Receipt, EngineError> {
        let now = Utc::now();
        let record = TransactionRecord::pending(operation, now);
        let amount = operation.amount();

        let debited = operation.debited_account()
            .map(|account_id| self.store.get_account(account_id))
            .transpose()
            .map_err(|error| self.abort(&record, error))?;

        let credited = operation.credited_account()
            .map(|account_id| self.store.get_account(account_id))
            .transpose()
            .map_err(|error| self.abort(&record, error))?;

        let mut mutations = Vec::with_capacity(2);

        if let Some(account) = &debited {
            if account.balance < amount {
                warn!("Insufficient funds on account [{}]: available {}, requested {}", account.id, account.balance, amount);
                let reason = format!("Insufficient funds: available {}, requested {}", account.balance, amount);
                self.record_failure(record.clone().failed(reason));

                return Err(EngineError::InsufficientFunds {
                    account_id: account.id,
                    transaction_id: record.id,
                    available: account.balance,
                    requested: amount
                });
            }

            mutations.push(Mutation {
                account_id: account.id,
                delta: amount.checked_neg().map_err(|error| self.reject(&record, error))?,
                expected_version: account.version
            });
        }

        if let Some(account) = &credited {
            mutations.push(Mutation {
                account_id: account.id,
                delta: amount,
                expected_version: account.version
            });
        }

        match self.store.record_transaction(record.clone().completed(), &mutations) {
            Ok(updates) => {
                debug!("Transaction [{}] committed: {} of {}", record.id, record.kind, amount);
                self.emit(&record, &updates, now);

                Ok(Receipt {
                    transaction_id: record.id,
                    kind: record.kind,
                    status: TransactionStatus::Completed,
                    amount,
                    balances: updates,
                    created_at: now,
                    replayed: false
                })
            }
            Err(StoreError::VersionConflict { account_id, .. }) => {
                // Nothing was written; the whole operation is restarted by `submit`.
                Err(EngineError::VersionConflict { account_id, attempts: 1 })
            }
            Err(StoreError::InsufficientFunds { account_id, balance, .. }) => {
                self.record_failure(record.clone().failed(format!("Insufficient funds: available {balance}, requested {amount}")));

                Err(EngineError::InsufficientFunds { account_id, transaction_id: record.id, available: balance, requested: amount })
            }
            Err(StoreError::Overflow { .. }) => Err(self.reject(&record, MoneyError::Overflow)),
            Err(error) => Err(self.abort(&record, error))
        }
    }

    fn emit(&self, record: &TransactionRecord, updates: &[BalanceUpdate], timestamp: DateTime<Utc>) {
        for update in updates {
            self.emitter.emit(AuditEvent {
                account_id: update.account_id,
                new_balance: update.balance,
                version: update.version,
                transaction_id: record.id,
                timestamp
            });
        }
    }

    /// Fails the operation as the caller's fault, leaving a failed record behind.
    fn reject(&self, record: &TransactionRecord, error: MoneyError) -> EngineError {
        self.record_failure(record.clone().failed(error.to_string()));
        ValidationError::InvalidAmount(error).into()
    }

    /// Fails the operation on an infrastructure error, leaving a failed record behind if the store allows it.
    fn abort(&self, record: &TransactionRecord, error: StoreError) -> EngineError {
        error!("Transaction [{}] aborted: {error}", record.id);
        self.record_failure(record.clone().failed(error.to_string()));

        EngineError::Internal {
            transaction_id: Some(record.id),
            reason: error.to_string()
        }
    }

    fn record_failure(&self, record: TransactionRecord) {
        let transaction_id = record.id;

        if let Err(error) = self.store.record_transaction(record, &[]) {
            error!("Could not record failed transaction [{transaction_id}]: {error}");
        }
    }
}

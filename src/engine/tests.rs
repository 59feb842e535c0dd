use super::{BalanceSource, EngineError, LedgerEngine};

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use proptest::prelude::*;
use tokio::time::timeout;

use crate::config::EngineConfig;
use crate::events::{AuditEmitter, AuditSink, BalanceCache};
use crate::models::{
    Account, AccountType, DepositMethod, NewAccount, NewUser, Operation, OperationRequest, ServiceType,
    TransactionDetails, TransactionKind, TransactionRecord, TransactionStatus, User, ValidationError, WithdrawalMethod
};
use crate::storage::{BalanceUpdate, CommitStage, LedgerStore, MemoryLedgerStore, Mutation, StoreError};
use crate::types::{AccountId, Money, TransactionId, UserId};

fn money(value: &str) -> Money {
    Money::from_str(value).unwrap_or_default()
}

fn register(store: &impl LedgerStore, username: &str) -> Result<UserId> {
    let user = store.create_user(NewUser {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        first_name: "Test".to_string(),
        last_name: "User".to_string()
    })?;

    Ok(user.id)
}

fn open(store: &impl LedgerStore, owner: UserId, number: &str, balance: &str) -> Result<AccountId> {
    let request = NewAccount::new(number, AccountType::Checking, owner)
        .with_opening_balance(Money::from_str(balance)?);

    Ok(store.open_account(request)?.id)
}

fn engine_with(store: Arc<MemoryLedgerStore>) -> Arc<LedgerEngine<MemoryLedgerStore>> {
    Arc::new(LedgerEngine::new(store, EngineConfig::default()))
}

fn total(store: &MemoryLedgerStore, accounts: &[AccountId]) -> Result<Money> {
    accounts.iter().try_fold(Money::ZERO, |sum, account_id| {
        Ok(sum.checked_add(store.get_balance(*account_id)?)?)
    })
}

#[tokio::test]
async fn test_withdrawal_example_completes_and_then_fails_on_insufficient_funds() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "100.00")?;
    let engine = engine_with(store.clone());

    let receipt = engine.withdraw(account, money("30.00"), WithdrawalMethod::Atm, None).await?;

    assert_eq!(receipt.status, TransactionStatus::Completed);
    assert_eq!(receipt.balance_of(account), Some(money("70.00")));
    assert_eq!(engine.balance(account)?.to_string(), "70.00");

    let history = engine.history(account, 10)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, TransactionKind::Withdrawal);
    assert_eq!(history[0].status, TransactionStatus::Completed);
    assert_eq!(history[0].amount.to_string(), "30.00");

    let result = engine.withdraw(account, money("1000.00"), WithdrawalMethod::Atm, None).await;

    assert!(matches!(result, Err(EngineError::InsufficientFunds { .. })));
    assert_eq!(engine.balance(account)?.to_string(), "70.00");

    let history = engine.history(account, 10)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, TransactionStatus::Failed);
    assert!(history[0].failure_reason.is_some());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_withdrawals_are_serialized() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "500.00")?;
    let engine = engine_with(store.clone());

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.withdraw(account, money("10.00"), WithdrawalMethod::Cash, None).await
            })
        })
        .collect();

    let mut completed = 0;
    let mut insufficient = 0;

    for result in join_all(handles).await {
        match result? {
            Ok(_) => completed += 1,
            Err(EngineError::InsufficientFunds { .. }) => insufficient += 1,
            Err(error) => return Err(anyhow!("unexpected failure: {error}"))
        }
    }

    assert_eq!(completed, 50);
    assert_eq!(insufficient, 50);
    assert_eq!(engine.balance(account)?, Money::ZERO);
    assert_eq!(engine.account(account)?.version, 50);
    assert_eq!(engine.history(account, 1000)?.len(), 100);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_complete_without_deadlock() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let a = open(store.as_ref(), owner, "1000000001", "100.00")?;
    let b = open(store.as_ref(), owner, "1000000002", "100.00")?;
    let engine = engine_with(store.clone());

    let forward = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.transfer(a, b, money("30.00"), None).await })
    };
    let backward = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.transfer(b, a, money("10.00"), None).await })
    };

    let (forward, backward) = timeout(Duration::from_secs(5), async { (forward.await, backward.await) }).await?;
    forward??;
    backward??;

    assert_eq!(engine.balance(a)?.to_string(), "80.00");
    assert_eq!(engine.balance(b)?.to_string(), "120.00");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_transfers_conserve_money() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let mut accounts = Vec::new();

    for index in 0..5 {
        accounts.push(open(store.as_ref(), owner, &format!("100000000{index}"), "50.00")?);
    }

    let engine = engine_with(store.clone());
    let before = total(&store, &accounts)?;

    let handles: Vec<_> = (0..400usize)
        .map(|step| {
            let engine = engine.clone();
            let from = accounts[step % 5];
            let to = accounts[(step * 3 + 1) % 5];
            let amount = Money::from_cents(((step * 37) % 2_500 + 1) as i64);

            tokio::spawn(async move { engine.transfer(from, to, amount, None).await })
        })
        .collect();

    for result in join_all(handles).await {
        match result? {
            Ok(_) | Err(EngineError::InsufficientFunds { .. }) | Err(EngineError::Validation(ValidationError::SameAccount { .. })) => {}
            Err(error) => return Err(anyhow!("unexpected failure: {error}"))
        }
    }

    assert_eq!(total(&store, &accounts)?, before);

    for account in &accounts {
        assert!(!engine.balance(*account)?.is_negative());
    }

    Ok(())
}

async fn run_transfers(transfers: Vec<(usize, usize, i64)>) -> Result<(Money, Money, bool)> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let mut accounts = Vec::new();

    for index in 0..4 {
        accounts.push(open(store.as_ref(), owner, &format!("200000000{index}"), "100.00")?);
    }

    let engine = engine_with(store.clone());
    let before = total(&store, &accounts)?;
    let mut negative = false;

    for (from, to, cents) in transfers {
        let result = engine.transfer(accounts[from], accounts[to], Money::from_cents(cents), None).await;

        match result {
            Ok(receipt) => negative |= receipt.balances.iter().any(|update| update.balance.is_negative()),
            Err(EngineError::InsufficientFunds { .. }) if from != to => {}
            Err(EngineError::Validation(ValidationError::SameAccount { .. })) if from == to => {}
            Err(error) => return Err(anyhow!("unexpected failure: {error}"))
        }
    }

    Ok((before, total(&store, &accounts)?, negative))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_any_transfer_sequence_conserves_total_balance(
        transfers in prop::collection::vec((0usize..4, 0usize..4, 1i64..15_000), 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| TestCaseError::fail(error.to_string()))?;

        let (before, after, negative) = runtime.block_on(run_transfers(transfers))
            .map_err(|error| TestCaseError::fail(error.to_string()))?;

        prop_assert_eq!(before, after);
        prop_assert!(!negative);
    }
}

#[tokio::test]
async fn test_invalid_requests_create_no_records() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "100.00")?;
    let engine = engine_with(store.clone());

    let same = engine.transfer(account, account, money("1.00"), None).await;
    assert!(matches!(same, Err(EngineError::Validation(ValidationError::SameAccount { .. }))));

    let missing = engine.deposit(AccountId::new(), money("1.00"), DepositMethod::Cash, None).await;
    assert!(matches!(missing, Err(EngineError::AccountNotFound { .. })));

    let zero = engine.deposit(account, Money::ZERO, DepositMethod::Cash, None).await;
    assert!(matches!(zero, Err(EngineError::Validation(ValidationError::InvalidAmount(_)))));

    let missing_destination = engine.transfer(account, AccountId::new(), money("1.00"), None).await;
    assert!(matches!(missing_destination, Err(EngineError::AccountNotFound { .. })));

    assert!(engine.history(account, 10)?.is_empty());
    assert_eq!(engine.balance(account)?.to_string(), "100.00");

    Ok(())
}

#[tokio::test]
async fn test_caller_must_own_the_debited_account() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let alice = register(store.as_ref(), "alice")?;
    let bob = register(store.as_ref(), "bob")?;
    let alices = open(store.as_ref(), alice, "1000000001", "100.00")?;
    let bobs = open(store.as_ref(), bob, "1000000002", "0")?;
    let engine = engine_with(store.clone());

    let theft = OperationRequest::new(Operation::transfer(alices, bobs, money("50.00"))).with_caller(bob);
    let result = engine.submit(theft).await;

    assert!(matches!(result, Err(EngineError::Validation(ValidationError::NotAccountOwner { .. }))));

    // Crediting someone else's account is fine.
    let gift = OperationRequest::new(Operation::transfer(alices, bobs, money("50.00"))).with_caller(alice);
    engine.submit(gift).await?;

    assert_eq!(engine.balance(bobs)?.to_string(), "50.00");
    assert_eq!(engine.accounts_for(bob)?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_idempotency_key_applies_an_operation_once() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "0")?;
    let engine = engine_with(store.clone());

    let request = OperationRequest::new(Operation::deposit(account, money("25.00"), DepositMethod::Mobile))
        .with_idempotency_key("deposit-1");

    let first = engine.submit(request.clone()).await?;
    let second = engine.submit(request).await?;

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.transaction_id, second.transaction_id);
    assert_eq!(engine.balance(account)?.to_string(), "25.00");
    assert_eq!(engine.history(account, 10)?.len(), 1);

    let reused = OperationRequest::new(Operation::deposit(account, money("99.00"), DepositMethod::Mobile))
        .with_idempotency_key("deposit-1");

    assert!(matches!(engine.submit(reused).await, Err(EngineError::Validation(ValidationError::InvalidField { .. }))));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reuse_of_a_key_on_disjoint_accounts_commits_once() -> Result<()> {
    for round in 0..25 {
        let store = Arc::new(MemoryLedgerStore::new());
        let owner = register(store.as_ref(), "alice")?;
        let a = open(store.as_ref(), owner, "1000000001", "0")?;
        let b = open(store.as_ref(), owner, "1000000002", "0")?;
        let engine = engine_with(store.clone());
        let key = format!("shared-{round}");

        let requests = [a, b].map(|account| {
            OperationRequest::new(Operation::deposit(account, money("10.00"), DepositMethod::Cash))
                .with_idempotency_key(key.clone())
        });

        let handles: Vec<_> = requests.into_iter()
            .map(|request| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.submit(request).await })
            })
            .collect();

        let mut completed = 0;

        for result in join_all(handles).await {
            match result? {
                Ok(_) => completed += 1,
                Err(EngineError::Validation(ValidationError::InvalidField { field: "idempotency key", .. })) => {}
                Err(error) => return Err(anyhow!("unexpected failure: {error}"))
            }
        }

        assert_eq!(completed, 1);
        assert_eq!(total(&store, &[a, b])?, money("10.00"));
    }

    Ok(())
}

#[tokio::test]
async fn test_store_fault_fails_the_transaction_without_moving_money() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let a = open(store.as_ref(), owner, "1000000001", "100.00")?;
    let b = open(store.as_ref(), owner, "1000000002", "0")?;
    let engine = engine_with(store.clone());

    store.inject_fault(CommitStage::RecordStaged, 1);

    let result = engine.transfer(a, b, money("40.00"), None).await;

    let Err(error) = result else {
        return Err(anyhow!("transfer should have failed"));
    };

    assert!(matches!(error, EngineError::Internal { transaction_id: Some(_), .. }));
    assert!(error.is_retryable());
    assert_eq!(engine.balance(a)?.to_string(), "100.00");
    assert_eq!(engine.balance(b)?, Money::ZERO);

    let history = engine.history(a, 10)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TransactionStatus::Failed);

    // Retrying after the fault clears moves the money exactly once.
    engine.transfer(a, b, money("40.00"), None).await?;

    assert_eq!(engine.balance(a)?.to_string(), "60.00");
    assert_eq!(engine.balance(b)?.to_string(), "40.00");

    Ok(())
}

#[tokio::test]
async fn test_lock_timeout_is_retryable_and_leaves_no_trace() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "100.00")?;
    let engine = LedgerEngine::new(store.clone(), EngineConfig::default().with_lock_timeout(Duration::from_millis(30)));

    let held = engine.locks().acquire(&[account]).await?;
    let result = engine.withdraw(account, money("10.00"), WithdrawalMethod::Cash, None).await;

    assert!(matches!(result, Err(EngineError::LockTimeout { .. })));
    assert!(result.err().is_some_and(|error| error.is_retryable()));
    assert!(engine.history(account, 10)?.is_empty());

    drop(held);

    engine.withdraw(account, money("10.00"), WithdrawalMethod::Cash, None).await?;
    assert_eq!(engine.balance(account)?.to_string(), "90.00");

    Ok(())
}

#[tokio::test]
async fn test_cancelled_request_before_locking_has_no_effect() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "100.00")?;
    let engine = engine_with(store.clone());

    let held = engine.locks().acquire(&[account]).await?;
    let cancelled = timeout(
        Duration::from_millis(20),
        engine.withdraw(account, money("10.00"), WithdrawalMethod::Cash, None)
    ).await;

    assert!(cancelled.is_err());

    drop(held);

    assert_eq!(engine.balance(account)?.to_string(), "100.00");
    assert!(engine.history(account, 10)?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_service_payment_debits_and_keeps_provider_details() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "80.00")?;
    let engine = engine_with(store.clone());

    let receipt = engine.pay_service(account, "City Power".to_string(), ServiceType::Electricity, money("45.50"), Some("INV-42".to_string())).await?;

    assert_eq!(receipt.kind, TransactionKind::ServicePayment);
    assert_eq!(engine.balance(account)?.to_string(), "34.50");

    let record = store.get_transaction(receipt.transaction_id)?;

    assert_eq!(record.reference_number.as_deref(), Some("INV-42"));
    assert_eq!(record.to_account, None);
    assert_eq!(record.details, TransactionDetails::ServicePayment {
        provider: "City Power".to_string(),
        service_type: ServiceType::Electricity
    });

    Ok(())
}

#[tokio::test]
async fn test_committed_balances_reach_the_audit_sinks() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let a = open(store.as_ref(), owner, "1000000001", "10.00")?;
    let b = open(store.as_ref(), owner, "1000000002", "0")?;

    let cache = Arc::new(BalanceCache::new(100, Duration::from_secs(300)));
    let sinks: Vec<Arc<dyn AuditSink>> = vec![cache.clone()];
    let engine = LedgerEngine::new(store.clone(), EngineConfig::default())
        .with_emitter(AuditEmitter::spawn(sinks));

    engine.deposit(a, money("5.00"), DepositMethod::Cash, None).await?;
    let receipt = engine.transfer(a, b, money("15.00"), None).await?;
    engine.flush_events().await;

    let cached_a = cache.get(a).ok_or_else(|| anyhow!("account a missing from cache"))?;
    let cached_b = cache.get(b).ok_or_else(|| anyhow!("account b missing from cache"))?;

    assert_eq!((cached_a.balance, cached_a.version), (Money::ZERO, 2));
    assert_eq!((cached_b.balance, cached_b.version), (money("15.00"), 1));
    assert_eq!(cached_b.last_transaction, Some(receipt.transaction_id));

    Ok(())
}

#[tokio::test]
async fn test_balance_reads_go_through_the_cache_while_it_is_current() -> Result<()> {
    let store = Arc::new(MemoryLedgerStore::new());
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "40.00")?;

    let cache = Arc::new(BalanceCache::new(100, Duration::from_millis(100)));
    let engine = LedgerEngine::new(store.clone(), EngineConfig::default()).with_balance_cache(cache.clone());

    let first = engine.read_balance(account)?;
    let second = engine.read_balance(account)?;

    assert_eq!(first.source, BalanceSource::Store);
    assert_eq!(second.source, BalanceSource::Cache);
    assert_eq!((second.balance, second.version), (money("40.00"), 0));

    // No emitter is attached, so the cached entry falls behind the committed deposit.
    engine.deposit(account, money("2.50"), DepositMethod::Cash, None).await?;

    let after_deposit = engine.read_balance(account)?;

    assert_eq!(after_deposit.source, BalanceSource::Store);
    assert_eq!((after_deposit.balance, after_deposit.version), (money("42.50"), 1));
    assert_eq!(engine.read_balance(account)?.source, BalanceSource::Cache);

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(cache.get(account).is_none());
    assert_eq!(engine.read_balance(account)?.source, BalanceSource::Store);
    assert_eq!(engine.read_balance(account)?.source, BalanceSource::Cache);
    assert_eq!(engine.balance(account)?, money("42.50"));

    Ok(())
}

/// Delegates to a memory store but reports a version conflict for the first few commits
/// that move money, the way a racing writer outside the guard would.
struct ConflictingStore {
    inner: MemoryLedgerStore,
    conflicts: AtomicUsize
}

impl LedgerStore for ConflictingStore {
    fn create_user(&self, request: NewUser) -> Result<User, StoreError> {
        self.inner.create_user(request)
    }

    fn get_user(&self, user_id: UserId) -> Result<User, StoreError> {
        self.inner.get_user(user_id)
    }

    fn find_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.inner.find_user_by_username(username)
    }

    fn open_account(&self, request: NewAccount) -> Result<Account, StoreError> {
        self.inner.open_account(request)
    }

    fn get_account(&self, account_id: AccountId) -> Result<Account, StoreError> {
        self.inner.get_account(account_id)
    }

    fn find_account_by_number(&self, account_number: &str) -> Result<Account, StoreError> {
        self.inner.find_account_by_number(account_number)
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.inner.accounts()
    }

    fn accounts_owned_by(&self, owner_id: UserId) -> Result<Vec<Account>, StoreError> {
        self.inner.accounts_owned_by(owner_id)
    }

    fn apply_mutation(&self, account_id: AccountId, delta: Money, expected_version: u64) -> Result<BalanceUpdate, StoreError> {
        self.inner.apply_mutation(account_id, delta, expected_version)
    }

    fn record_transaction(&self, record: TransactionRecord, mutations: &[Mutation]) -> Result<Vec<BalanceUpdate>, StoreError> {
        if let Some(mutation) = mutations.first() {
            let remaining = self.conflicts.load(Ordering::SeqCst);

            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);

                return Err(StoreError::VersionConflict {
                    account_id: mutation.account_id,
                    expected: mutation.expected_version,
                    actual: mutation.expected_version + 1
                });
            }
        }

        self.inner.record_transaction(record, mutations)
    }

    fn get_transaction(&self, transaction_id: TransactionId) -> Result<TransactionRecord, StoreError> {
        self.inner.get_transaction(transaction_id)
    }

    fn transaction_history(&self, account_id: AccountId, limit: usize) -> Result<Vec<TransactionRecord>, StoreError> {
        self.inner.transaction_history(account_id, limit)
    }
}

#[tokio::test]
async fn test_version_conflicts_are_retried_then_reported() -> Result<()> {
    let store = Arc::new(ConflictingStore { inner: MemoryLedgerStore::new(), conflicts: AtomicUsize::new(2) });
    let owner = register(store.as_ref(), "alice")?;
    let account = open(store.as_ref(), owner, "1000000001", "0")?;
    let engine = LedgerEngine::new(store.clone(), EngineConfig::default().with_max_retries(3));

    engine.deposit(account, money("10.00"), DepositMethod::Check, None).await?;

    assert_eq!(engine.balance(account)?.to_string(), "10.00");
    assert_eq!(engine.history(account, 10)?.len(), 1);

    store.conflicts.store(10, Ordering::SeqCst);

    let result = engine.deposit(account, money("10.00"), DepositMethod::Check, None).await;

    assert!(matches!(result, Err(EngineError::VersionConflict { attempts: 4, .. })));
    assert_eq!(engine.balance(account)?.to_string(), "10.00");

    Ok(())
}

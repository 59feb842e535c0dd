use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::guard::GuardError;
use crate::types::AccountId;

/// Per-account mutual exclusion for the balance mutation path.
///
/// Locks are always taken in ascending account id order, so two operations over the
/// same accounts can never wait on each other in a cycle. Accounts are never deleted,
/// so registry entries live as long as the engine.
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
    timeout: Duration
}

impl AccountLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout
        }
    }

    /// Locks every account in `accounts`, waiting at most the configured timeout in total.
    ///
    /// Dropping the returned future before it resolves releases whatever was already
    /// acquired, so a cancelled caller leaves nothing behind.
    pub async fn acquire(&self, accounts: &[AccountId]) -> Result<LockSet, GuardError> {
        let mut ordered = accounts.to_vec();
        ordered.sort();
        ordered.dedup();

        let deadline = Instant::now() + self.timeout;
        let mut held = LockSet {
            accounts: Vec::with_capacity(ordered.len()),
            guards: Vec::with_capacity(ordered.len())
        };

        for account_id in ordered {
            let lock = self.lock_for(account_id);

            match timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => {
                    held.accounts.push(account_id);
                    held.guards.push(guard);
                }
                Err(_) => {
                    debug!("Lock wait on account [{account_id}] exceeded {:?}", self.timeout);
                    return Err(GuardError::LockTimeout { account_id, waited: self.timeout });
                }
            }
        }

        Ok(held)
    }

    fn lock_for(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        self.locks.entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Locks held for one operation. Released in reverse acquisition order on drop.
pub struct LockSet {
    accounts: Vec<AccountId>,
    guards: Vec<OwnedMutexGuard<()>>
}

impl LockSet {
    /// Locked accounts in ascending order.
    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, FutureExt, Shared};
use tokio::spawn;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::engine::LedgerEngine;
use crate::models::OperationRequest;
use crate::storage::LedgerStore;
use crate::types::AccountId;

/// Resolves once the operation it belongs to has finished, whatever its outcome.
type Finished = Shared<oneshot::Receiver<()>>;

/// How many operations the lanes applied and how many the engine refused.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LaneTally {
    pub applied: usize,
    pub failed: usize
}

/// Submits operations so that any two touching the same account run in input order.
///
/// Every operation waits for the last queued operation on each of its accounts, so the
/// final ledger matches applying the rows one by one. Operations on disjoint accounts
/// still run concurrently.
pub struct AccountLanes<S: LedgerStore> {
    engine: Arc<LedgerEngine<S>>,
    tails: HashMap<AccountId, Finished>,
    tasks: Vec<JoinHandle<bool>>
}

impl<S: LedgerStore> AccountLanes<S> {
    pub fn new(engine: Arc<LedgerEngine<S>>) -> Self {
        Self {
            engine,
            tails: HashMap::new(),
            tasks: Vec::new()
        }
    }

    pub fn dispatch(&mut self, owner: String, request: OperationRequest) {
        let accounts = request.operation.accounts();
        let predecessors: Vec<Finished> = accounts.iter()
            .filter_map(|account_id| self.tails.get(account_id).cloned())
            .collect();

        let (done, finished) = oneshot::channel::<()>();
        let finished = finished.shared();

        for account_id in accounts {
            self.tails.insert(account_id, finished.clone());
        }

        let engine = self.engine.clone();

        self.tasks.push(spawn(async move {
            // A predecessor that panicked drops its sender, which still releases us.
            join_all(predecessors).await;

            let kind = request.operation.kind();
            let result = engine.submit(request).await;
            let _ = done.send(());

            match result {
                Ok(receipt) => {
                    debug!("Transaction [{}]:[{kind}] for owner [{owner}] completed", receipt.transaction_id);
                    true
                }
                Err(error) => {
                    warn!("{kind} for owner [{owner}] failed: {error}");
                    false
                }
            }
        }));
    }

    /// Waits for everything dispatched so far.
    pub async fn finish(self) -> LaneTally {
        let mut tally = LaneTally::default();

        for result in join_all(self.tasks).await {
            match result {
                Ok(true) => tally.applied += 1,
                Ok(false) => tally.failed += 1,
                Err(error) => error!("A lane task did not finish gracefully: {error:?}")
            }
        }

        tally
    }
}

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, Trim};
use tokio::sync::mpsc;
use tokio::task::{spawn_blocking, JoinHandle};
use tracing::{debug, error, warn};

use crate::engine::LedgerEngine;
use crate::gateway::lane::AccountLanes;
use crate::gateway::{GatewayError, OperationRow, RowKind};
use crate::models::{NewAccount, NewUser, Operation, OperationRequest, ValidationError};
use crate::storage::LedgerStore;

/// Counts for one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub users: usize,
    pub accounts: usize,
    /// Operations the engine completed.
    pub applied: usize,
    /// Operations the engine ended as failed (insufficient funds, timeouts, ...).
    pub failed: usize,
    /// Rows that never reached the engine.
    pub rejected: usize
}

/// Drives a CSV stream of requests through a [`LedgerEngine`].
///
/// Users and accounts are created inline in input order. Balance operations run
/// concurrently, except that rows sharing an account apply in the order they were read,
/// so the same input always produces the same ledger.
pub struct BatchGateway<S: LedgerStore> {
    engine: Arc<LedgerEngine<S>>,
    backpressure: usize
}

impl<S: LedgerStore> BatchGateway<S> {
    pub fn new(engine: Arc<LedgerEngine<S>>) -> Self {
        Self {
            engine,
            backpressure: 256
        }
    }

    pub async fn run(&self, path: impl AsRef<Path>) -> Result<BatchSummary, GatewayError> {
        let path = path.as_ref().to_path_buf();

        // Fail fast on a missing file instead of silently processing nothing.
        File::open(&path)?;

        let (sender, receiver) = mpsc::channel::<OperationRow>(self.backpressure);
        let csv_handle = Self::spawn_csv_reader(path, sender);
        let mut summary = self.process_rows(receiver).await;

        match csv_handle.await {
            Ok(malformed) => summary.rejected += malformed,
            Err(error) => error!("CSV ingestion failed: {error}")
        }

        Ok(summary)
    }

    /// Reads rows on a blocking thread; returns how many lines could not be deserialized.
    fn spawn_csv_reader(path: PathBuf, sender: mpsc::Sender<OperationRow>) -> JoinHandle<usize> {
        spawn_blocking(move || {
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(error) => {
                    error!("Error opening CSV at path: {} | {error}", path.display());
                    return 0;
                }
            };

            let mut reader = ReaderBuilder::new()
                .trim(Trim::All)
                .flexible(true)
                .from_reader(BufReader::new(file));

            let mut malformed = 0;

            for result in reader.deserialize::<OperationRow>() {
                match result {
                    Ok(row) => {
                        if sender.blocking_send(row).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        error!("CSV deserialization error: {error}");
                        malformed += 1;
                    }
                }
            }

            malformed
        })
    }

    async fn process_rows(&self, mut receiver: mpsc::Receiver<OperationRow>) -> BatchSummary {
        let mut lanes = AccountLanes::new(self.engine.clone());
        let mut summary = BatchSummary::default();

        while let Some(row) = receiver.recv().await {
            let outcome = match row.kind() {
                Ok(RowKind::User) => self.register(&row).map(|_| summary.users += 1),
                Ok(RowKind::Open) => self.open(&row).map(|_| summary.accounts += 1),
                Ok(kind) => self.request(kind, &row).map(|(owner, request)| lanes.dispatch(owner, request)),
                Err(error) => Err(error.into())
            };

            if let Err(error) = outcome {
                warn!("Skipping '{}' row: {error}", row.op);
                summary.rejected += 1;
            }
        }

        let tally = lanes.finish().await;
        summary.applied += tally.applied;
        summary.failed += tally.failed;

        summary
    }

    fn register(&self, row: &OperationRow) -> Result<(), GatewayError> {
        let user = self.engine.store().create_user(NewUser {
            username: row.owner()?.to_string(),
            email: row.field("email")?.to_string(),
            first_name: row.field("first_name")?.to_string(),
            last_name: row.field("last_name")?.to_string()
        })?;

        debug!("Registered user [{}] as [{}]", user.username, user.id);

        Ok(())
    }

    fn open(&self, row: &OperationRow) -> Result<(), GatewayError> {
        let store = self.engine.store();
        let owner = store.find_user_by_username(row.owner()?)?;
        let request = NewAccount::new(row.account()?, row.field("account_type")?.parse()?, owner.id)
            .with_opening_balance(row.opening_balance()?);

        let account = store.open_account(request)?;

        debug!("Opened {} account [{}] for [{}]", account.account_type, account.account_number, owner.username);

        Ok(())
    }

    /// Resolves usernames and account numbers into an engine request, along with the acting owner.
    fn request(&self, kind: RowKind, row: &OperationRow) -> Result<(String, OperationRequest), GatewayError> {
        let store = self.engine.store();
        let owner = store.find_user_by_username(row.owner()?)?;
        let account_id = store.find_account_by_number(row.account()?)?.id;
        let amount = row.amount()?;

        let operation = match kind {
            RowKind::Deposit => Operation::Deposit {
                account_id,
                amount,
                method: row.field("method")?.parse()?,
                description: row.description.clone(),
                reference_number: row.reference.clone()
            },
            RowKind::Withdrawal => Operation::Withdrawal {
                account_id,
                amount,
                method: row.field("method")?.parse()?,
                description: row.description.clone()
            },
            RowKind::Transfer => Operation::Transfer {
                from_account: account_id,
                to_account: store.find_account_by_number(row.to_account()?)?.id,
                amount,
                description: row.description.clone()
            },
            RowKind::Payment => Operation::ServicePayment {
                account_id,
                provider: row.field("provider")?.to_string(),
                service_type: row.field("service_type")?.parse()?,
                amount,
                reference_number: row.reference.clone(),
                description: row.description.clone()
            },
            RowKind::User | RowKind::Open => {
                return Err(ValidationError::invalid_field("op", format!("'{kind}' does not move money")).into())
            }
        };

        Ok((owner.username, OperationRequest::new(operation).with_caller(owner.id)))
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use tracing::info;

use crate::events::{AuditEvent, SinkError};
use crate::models::Account;
use crate::types::{AccountId, Money, TransactionId};

/// A best-effort consumer of audit events.
pub trait AuditSink: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn publish(&self, event: &AuditEvent) -> Result<(), SinkError>;
}

/// Writes every committed balance change to the `audit` tracing target.
pub struct LogSink;

impl AuditSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish(&self, event: &AuditEvent) -> Result<(), SinkError> {
        info!(
            target: "audit",
            account_id = %event.account_id,
            balance = %event.new_balance,
            version = event.version,
            transaction_id = %event.transaction_id,
            "Balance committed"
        );

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBalance {
    pub balance: Money,
    pub version: u64,
    /// `None` when the entry was filled from a store read rather than a commit.
    pub last_transaction: Option<TransactionId>,
    pub updated_at: DateTime<Utc>
}

/// Read-side cache of recent balances, refreshed from audit events and store reads and
/// expired after a TTL.
///
/// The cache may lag the ledger. Readers compare the cached version with the store's
/// before trusting an entry, and the engine's funds checks never consult it.
pub struct BalanceCache {
    entries: Cache<AccountId, CachedBalance>
}

impl BalanceCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build()
        }
    }

    pub fn get(&self, account_id: AccountId) -> Option<CachedBalance> {
        self.entries.get(&account_id)
    }

    /// Fills the entry for `account` from a store read unless a newer or equal version is cached.
    pub fn refresh(&self, account: &Account) {
        let stale = self.entries.get(&account.id)
            .is_none_or(|cached| cached.version < account.version);

        if stale {
            self.entries.insert(account.id, CachedBalance {
                balance: account.balance,
                version: account.version,
                last_transaction: None,
                updated_at: account.updated_at
            });
        }
    }
}

impl AuditSink for BalanceCache {
    fn name(&self) -> &'static str {
        "balance-cache"
    }

    fn publish(&self, event: &AuditEvent) -> Result<(), SinkError> {
        match self.entries.get(&event.account_id) {
            Some(cached) if cached.version > event.version => {
                return Err(SinkError::Rejected {
                    sink: self.name(),
                    reason: format!("version {} is superseded by cached version {}", event.version, cached.version)
                });
            }
            Some(cached) if cached.version == event.version && cached.last_transaction.is_some() => return Ok(()),
            _ => {}
        }

        self.entries.insert(event.account_id, CachedBalance {
            balance: event.new_balance,
            version: event.version,
            last_transaction: Some(event.transaction_id),
            updated_at: event.timestamp
        });

        Ok(())
    }
}

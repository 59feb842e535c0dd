use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{AccountId, Money, TransactionId};

/// Notification that an account balance changed as part of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub account_id: AccountId,
    pub new_balance: Money,
    pub version: u64,
    pub transaction_id: TransactionId,
    pub timestamp: DateTime<Utc>
}

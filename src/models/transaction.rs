use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{closed_enum, DepositMethod, Operation, ServiceType, WithdrawalMethod};
use crate::types::{AccountId, Money, TransactionId};

closed_enum!(
    TransactionKind, "transaction kind" {
        Deposit => "deposit",
        Withdrawal => "withdrawal",
        Transfer => "transfer",
        ServicePayment => "service_payment"
    }
);

closed_enum!(
    /// `Pending` only exists before a record reaches the store; the store accepts
    /// terminal records exclusively.
    TransactionStatus, "transaction status" {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed"
    }
);

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Kind-specific metadata. Stored verbatim, never interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionDetails {
    Deposit { method: DepositMethod },
    Withdrawal { method: WithdrawalMethod },
    Transfer,
    ServicePayment { provider: String, service_type: ServiceType }
}

/// An immutable record of one balance-affecting operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub from_account: Option<AccountId>,
    pub to_account: Option<AccountId>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
    pub reference_number: Option<String>,
    pub details: TransactionDetails,
    pub failure_reason: Option<String>
}

impl TransactionRecord {
    pub fn pending(operation: &Operation, created_at: DateTime<Utc>) -> Self {
        let details = match operation {
            Operation::Deposit { method, .. } => TransactionDetails::Deposit { method: *method },
            Operation::Withdrawal { method, .. } => TransactionDetails::Withdrawal { method: *method },
            Operation::Transfer { .. } => TransactionDetails::Transfer,
            Operation::ServicePayment { provider, service_type, .. } => TransactionDetails::ServicePayment {
                provider: provider.clone(),
                service_type: *service_type
            }
        };

        Self {
            id: TransactionId::new(),
            kind: operation.kind(),
            amount: operation.amount(),
            from_account: operation.debited_account(),
            to_account: operation.credited_account(),
            status: TransactionStatus::Pending,
            created_at,
            description: operation.description().map(str::to_string),
            reference_number: operation.reference_number().map(str::to_string),
            details,
            failure_reason: None
        }
    }

    pub fn completed(mut self) -> Self {
        self.status = TransactionStatus::Completed;
        self
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_account == Some(account_id) || self.to_account == Some(account_id)
    }

    /// Every account the record names, in from/to order.
    pub fn accounts(&self) -> impl Iterator<Item = AccountId> {
        self.from_account.into_iter().chain(self.to_account)
    }
}

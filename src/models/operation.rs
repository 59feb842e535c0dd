use crate::models::{check_length, check_optional_length, closed_enum, TransactionKind, ValidationError};
use crate::types::{AccountId, Money, MoneyError, UserId};

const MAX_DESCRIPTION_LENGTH: usize = 255;
const MAX_REFERENCE_LENGTH: usize = 50;
const MAX_PROVIDER_LENGTH: usize = 100;

closed_enum!(
    DepositMethod, "deposit method" {
        Cash => "cash",
        Check => "check",
        Transfer => "transfer",
        Atm => "atm",
        Mobile => "mobile"
    }
);

closed_enum!(
    WithdrawalMethod, "withdrawal method" {
        Cash => "cash",
        Atm => "atm",
        Transfer => "transfer",
        Check => "check"
    }
);

closed_enum!(
    ServiceType, "service type" {
        Electricity => "electricity",
        Water => "water",
        Gas => "gas",
        Phone => "phone",
        Internet => "internet",
        Cable => "cable",
        Insurance => "insurance",
        CreditCard => "credit_card",
        Loan => "loan",
        Other => "other"
    }
);

/// The closed set of balance-affecting operations the engine accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Deposit {
        account_id: AccountId,
        amount: Money,
        method: DepositMethod,
        description: Option<String>,
        reference_number: Option<String>
    },
    Withdrawal {
        account_id: AccountId,
        amount: Money,
        method: WithdrawalMethod,
        description: Option<String>
    },
    Transfer {
        from_account: AccountId,
        to_account: AccountId,
        amount: Money,
        description: Option<String>
    },
    ServicePayment {
        account_id: AccountId,
        provider: String,
        service_type: ServiceType,
        amount: Money,
        reference_number: Option<String>,
        description: Option<String>
    }
}

impl Operation {
    pub fn deposit(account_id: AccountId, amount: Money, method: DepositMethod) -> Self {
        Self::Deposit { account_id, amount, method, description: None, reference_number: None }
    }

    pub fn withdrawal(account_id: AccountId, amount: Money, method: WithdrawalMethod) -> Self {
        Self::Withdrawal { account_id, amount, method, description: None }
    }

    pub fn transfer(from_account: AccountId, to_account: AccountId, amount: Money) -> Self {
        Self::Transfer { from_account, to_account, amount, description: None }
    }

    pub fn service_payment(account_id: AccountId, provider: impl Into<String>, service_type: ServiceType, amount: Money) -> Self {
        Self::ServicePayment {
            account_id,
            provider: provider.into(),
            service_type,
            amount,
            reference_number: None,
            description: None
        }
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Deposit { description, .. }
            | Self::Withdrawal { description, .. }
            | Self::Transfer { description, .. }
            | Self::ServicePayment { description, .. } => *description = Some(text.into())
        }
        self
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::Deposit { .. } => TransactionKind::Deposit,
            Self::Withdrawal { .. } => TransactionKind::Withdrawal,
            Self::Transfer { .. } => TransactionKind::Transfer,
            Self::ServicePayment { .. } => TransactionKind::ServicePayment
        }
    }

    pub fn amount(&self) -> Money {
        match self {
            Self::Deposit { amount, .. }
            | Self::Withdrawal { amount, .. }
            | Self::Transfer { amount, .. }
            | Self::ServicePayment { amount, .. } => *amount
        }
    }

    /// The account funds leave, if any.
    pub fn debited_account(&self) -> Option<AccountId> {
        match self {
            Self::Deposit { .. } => None,
            Self::Withdrawal { account_id, .. } | Self::ServicePayment { account_id, .. } => Some(*account_id),
            Self::Transfer { from_account, .. } => Some(*from_account)
        }
    }

    /// The account funds arrive in, if any.
    pub fn credited_account(&self) -> Option<AccountId> {
        match self {
            Self::Deposit { account_id, .. } => Some(*account_id),
            Self::Withdrawal { .. } | Self::ServicePayment { .. } => None,
            Self::Transfer { to_account, .. } => Some(*to_account)
        }
    }

    /// Every account the operation touches, sorted ascending and deduplicated.
    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.debited_account().into_iter()
            .chain(self.credited_account())
            .collect();
        accounts.sort();
        accounts.dedup();
        accounts
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Deposit { description, .. }
            | Self::Withdrawal { description, .. }
            | Self::Transfer { description, .. }
            | Self::ServicePayment { description, .. } => description.as_deref()
        }
    }

    pub fn reference_number(&self) -> Option<&str> {
        match self {
            Self::Deposit { reference_number, .. } | Self::ServicePayment { reference_number, .. } => reference_number.as_deref(),
            Self::Withdrawal { .. } | Self::Transfer { .. } => None
        }
    }

    /// Checks the shape of the operation without looking at any stored state.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.amount().is_positive() {
            return Err(MoneyError::InvalidAmount(format!("Amount must be greater than zero, got {}", self.amount())).into());
        }

        if let Self::Transfer { from_account, to_account, .. } = self {
            if from_account == to_account {
                return Err(ValidationError::SameAccount { account_id: *from_account });
            }
        }

        if let Self::ServicePayment { provider, .. } = self {
            check_length("service provider", provider, 1, MAX_PROVIDER_LENGTH)?;
        }

        check_optional_length("description", self.description(), MAX_DESCRIPTION_LENGTH)?;
        check_optional_length("reference number", self.reference_number(), MAX_REFERENCE_LENGTH)?;

        Ok(())
    }
}

/// An operation as delivered by the gateway, with the caller identity it vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub operation: Operation,
    /// When present, the debited account must belong to this user.
    pub caller: Option<UserId>,
    /// Repeating a request with the same key returns the first receipt instead of re-applying it.
    pub idempotency_key: Option<String>
}

impl OperationRequest {
    pub fn new(operation: Operation) -> Self {
        Self { operation, caller: None, idempotency_key: None }
    }

    pub fn with_caller(mut self, caller: UserId) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

impl From<Operation> for OperationRequest {
    fn from(operation: Operation) -> Self {
        Self::new(operation)
    }
}

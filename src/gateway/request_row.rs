use serde::Deserialize;

use crate::models::{closed_enum, ValidationError};
use crate::types::Money;

closed_enum!(
    /// What a CSV row asks for.
    RowKind, "op" {
        User => "user",
        Open => "open",
        Deposit => "deposit",
        Withdrawal => "withdrawal",
        Transfer => "transfer",
        Payment => "payment"
    }
);

/// One line of the batch input. Columns a row kind does not use are left empty.
///
/// `op` stays a plain string so that an unknown kind is reported for that row instead
/// of failing CSV deserialization for the whole line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationRow {
    pub op: String,
    pub owner: Option<String>,
    pub account: Option<String>,
    pub to_account: Option<String>,
    pub amount: Option<String>,
    pub account_type: Option<String>,
    pub method: Option<String>,
    pub provider: Option<String>,
    pub service_type: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>
}

impl OperationRow {
    pub fn kind(&self) -> Result<RowKind, ValidationError> {
        self.op.parse()
    }

    /// The owner column: the username a row creates, opens an account for, or acts as.
    pub fn owner(&self) -> Result<&str, ValidationError> {
        required("owner", &self.owner)
    }

    pub fn account(&self) -> Result<&str, ValidationError> {
        required("account", &self.account)
    }

    pub fn to_account(&self) -> Result<&str, ValidationError> {
        required("to_account", &self.to_account)
    }

    /// A strictly positive amount.
    pub fn amount(&self) -> Result<Money, ValidationError> {
        Ok(Money::parse_amount(required("amount", &self.amount)?)?)
    }

    /// An opening balance, zero when the column is empty.
    pub fn opening_balance(&self) -> Result<Money, ValidationError> {
        match &self.amount {
            Some(amount) => Ok(amount.parse()?),
            None => Ok(Money::ZERO)
        }
    }

    pub fn field(&self, name: &'static str) -> Result<&str, ValidationError> {
        let value = match name {
            "account_type" => &self.account_type,
            "method" => &self.method,
            "provider" => &self.provider,
            "service_type" => &self.service_type,
            "email" => &self.email,
            "first_name" => &self.first_name,
            "last_name" => &self.last_name,
            _ => &None
        };

        required(name, value)
    }
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, ValidationError> {
    value.as_deref()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ValidationError::missing_field(field))
}

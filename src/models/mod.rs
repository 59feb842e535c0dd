mod account;
mod errors;
mod operation;
mod transaction;
mod user;

pub use account::{Account, AccountType, NewAccount};
pub use errors::ValidationError;
pub use operation::{DepositMethod, Operation, OperationRequest, ServiceType, WithdrawalMethod};
pub use transaction::{TransactionDetails, TransactionKind, TransactionRecord, TransactionStatus};
pub use user::{NewUser, User};

/// Declares a closed, string-backed enum: serde uses the same snake_case names as
/// `Display`/`FromStr`, and anything outside the set fails with `UnknownVariant`.
macro_rules! closed_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::models::ValidationError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::models::ValidationError::UnknownVariant {
                        field: $field,
                        value: other.to_string()
                    })
                }
            }
        }
    };
}

pub(crate) use closed_enum;

/// Rejects free text that is empty (when required) or longer than `max` characters.
pub(crate) fn check_length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let length = value.chars().count();

    if length < min || length > max {
        return Err(ValidationError::invalid_field(field, format!("must be between {min} and {max} characters, got {length}")));
    }

    Ok(())
}

pub(crate) fn check_optional_length(field: &'static str, value: Option<&str>, max: usize) -> Result<(), ValidationError> {
    match value {
        Some(value) => check_length(field, value, 0, max),
        None => Ok(())
    }
}

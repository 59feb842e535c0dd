use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Monetary overflow")]
    Overflow
}

mod errors;
mod ids;
mod money;
#[cfg(test)]
mod tests;

pub use errors::MoneyError;
pub use ids::{AccountId, TransactionId, UserId};
pub use money::Money;

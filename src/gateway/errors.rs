use thiserror::Error;

use crate::models::ValidationError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Row rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("Row rejected by the store: {0}")]
    Store(#[from] StoreError),
    #[error("Could not open CSV input: {0}")]
    Io(#[from] std::io::Error)
}

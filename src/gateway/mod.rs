mod batch;
mod errors;
mod lane;
mod request_row;

pub use batch::{BatchGateway, BatchSummary};
pub use errors::GatewayError;
pub use request_row::{OperationRow, RowKind};

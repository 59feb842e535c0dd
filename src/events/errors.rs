use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Audit sink [{sink}] rejected event: {reason}")]
    Rejected {
        sink: &'static str,
        reason: String
    }
}

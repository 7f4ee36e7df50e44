use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DealEngineError {
    #[error("Invalid assumption {field}: {reason}")]
    InvalidAssumption { field: String, reason: String },

    #[error("Invalid term {field}: {reason}")]
    InvalidTerm { field: String, reason: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (last delta: {last_delta})")]
    NonConvergence {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Unknown {entity} id: {id}")]
    NotFound { entity: String, id: u64 },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for DealEngineError {
    fn from(e: serde_json::Error) -> Self {
        DealEngineError::SerializationError(e.to_string())
    }
}

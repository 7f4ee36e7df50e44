pub mod deal;
pub mod error;
pub mod export;
pub mod generator;
pub mod primitives;
pub mod resolver;
pub mod scoring;
pub mod sensitivity;
pub mod store;
pub mod types;

pub use error::DealEngineError;
pub use types::*;

/// Standard result type for all engine operations
pub type DealEngineResult<T> = Result<T, DealEngineError>;

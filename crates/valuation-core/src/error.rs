use thiserror::Error;

use crate::UnitTag;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValuationError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Two monetary values were combined without converting them to the same unit.
    #[error("Unit mismatch: expected {expected}, found {found}")]
    UnitMismatch { expected: UnitTag, found: UnitTag },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

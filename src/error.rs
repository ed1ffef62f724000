use crate::types::position::{Price, Qty};

/// Engine error taxonomy. `PriceUnavailable` and `ConcurrencyConflict` are
/// transient; everything else is a user-correctable input or state error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no executed holding found for {symbol}")]
    NoMatchingHolding { symbol: String },

    #[error("only {available} quantity available to sell")]
    InsufficientQuantity { available: Qty },

    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: Price, available: Price },

    #[error("position is not pending")]
    InvalidState,

    #[error("position not found")]
    PositionNotFound,

    #[error("account not found")]
    AccountNotFound,

    #[error("price unavailable for {symbol}")]
    PriceUnavailable { symbol: String },

    #[error("conflicting update in progress, retry")]
    ConcurrencyConflict,
}

impl EngineError {
    /// Transient errors are safe to retry without user intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::PriceUnavailable { .. } | EngineError::ConcurrencyConflict
        )
    }
}

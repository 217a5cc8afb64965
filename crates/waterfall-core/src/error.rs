use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaterfallError {
    #[error("Invalid configuration: {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("Unknown waterfall variant: {0}")]
    UnknownVariant(String),

    #[error("Waterfall variant already registered: {0}")]
    DuplicateVariant(String),

    #[error("Step {step} references unknown tranche '{tranche}'")]
    UnknownTranche { step: String, tranche: String },

    #[error("Input inconsistency: {field}: {reason}")]
    InputInconsistency { field: String, reason: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Negative amount due at step {step}: {amount}")]
    NegativeAmountDue { step: String, amount: Decimal },

    #[error("Period order violation: expected period {expected}, got {actual}")]
    PeriodOrder { expected: u32, actual: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WaterfallError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WaterfallError::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WaterfallError::InputInconsistency {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for the programming-defect class (money invariants broken).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            WaterfallError::InvariantViolation(_) | WaterfallError::NegativeAmountDue { .. }
        )
    }
}

impl From<serde_json::Error> for WaterfallError {
    fn from(e: serde_json::Error) -> Self {
        WaterfallError::Serialization(e.to_string())
    }
}

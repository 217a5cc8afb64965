use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Tranche identifiers are the deal's own class labels ("A-1", "B", "Sub").
pub type TrancheId = String;

/// Currency amounts carry two decimal places.
pub const CURRENCY_DP: u32 = 2;

/// Round a computed currency amount to cents, banker's rounding.
pub fn round_currency(amount: Money) -> Money {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointNearestEven)
}

/// Division with a zero sentinel for an empty denominator.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Clamp a value to be non-negative.
pub fn floor_zero(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: format!("rust_decimal_128bit/round_half_even_{}dp", CURRENCY_DP),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_currency_half_even() {
        assert_eq!(round_currency(dec!(10.125)), dec!(10.12));
        assert_eq!(round_currency(dec!(10.135)), dec!(10.14));
    }

    #[test]
    fn test_safe_div_zero_denominator() {
        assert_eq!(safe_div(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_div(dec!(5), dec!(2)), dec!(2.5));
    }

    #[test]
    fn test_with_metadata_envelope() {
        let out = with_metadata("Test", &serde_json::json!({"a": 1}), vec![], 7, dec!(1));
        assert_eq!(out.metadata.computation_time_us, 7);
        assert_eq!(out.methodology, "Test");
    }
}

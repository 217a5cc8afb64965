//! Coverage-test results consumed by the waterfall.
//!
//! Results are produced upstream (OC/IC test calculation) and are read-only
//! for the duration of one execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::deal::state::DealState;
use crate::error::WaterfallError;
use crate::types::{floor_zero, Money};
use crate::WaterfallResult;

/// Coverage test family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    /// Par value of collateral over cumulative tranche notional.
    Overcollateralization,
    /// Net interest over cumulative interest due.
    InterestCoverage,
}

impl TestType {
    pub fn code(&self) -> &'static str {
        match self {
            TestType::Overcollateralization => "oc",
            TestType::InterestCoverage => "ic",
        }
    }
}

/// Result of one coverage test at one tranche level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub tranche: String,
    pub test: TestType,
    pub ratio: Decimal,
    pub threshold: Decimal,
    pub passed: bool,
    /// Cash needed to restore the test (0 when passing).
    #[serde(default)]
    pub cure_amount: Money,
}

impl TriggerResult {
    /// Headroom over the trigger level (negative when breached).
    pub fn buffer(&self) -> Decimal {
        self.ratio - self.threshold
    }
}

/// All coverage-test results for one deal and period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerContext {
    results: Vec<TriggerResult>,
}

impl TriggerContext {
    pub fn new(results: Vec<TriggerResult>) -> Self {
        TriggerContext { results }
    }

    pub fn results(&self) -> &[TriggerResult] {
        &self.results
    }

    pub fn result(&self, tranche: &str, test: TestType) -> Option<&TriggerResult> {
        self.results
            .iter()
            .find(|r| r.tranche == tranche && r.test == test)
    }

    pub fn for_tranche<'a>(&'a self, tranche: &'a str) -> impl Iterator<Item = &'a TriggerResult> {
        self.results.iter().filter(move |r| r.tranche == tranche)
    }

    pub fn has_tranche(&self, tranche: &str) -> bool {
        self.results.iter().any(|r| r.tranche == tranche)
    }

    /// True when any test at a debt tranche ranked at or above `priority` fails.
    pub fn any_failure_through(&self, deal: &DealState, priority: u32) -> bool {
        self.results.iter().filter(|r| !r.passed).any(|r| {
            deal.tranche(&r.tranche)
                .map(|t| !t.is_equity && t.priority <= priority)
                .unwrap_or(false)
        })
    }

    pub fn test_failed(&self, tranche: &str, test: TestType) -> bool {
        self.result(tranche, test).map(|r| !r.passed).unwrap_or(false)
    }

    /// Lowest OC ratio in the deal, `None` when no OC test was reported.
    pub fn min_oc_ratio(&self) -> Option<Decimal> {
        self.results
            .iter()
            .filter(|r| r.test == TestType::Overcollateralization)
            .map(|r| r.ratio)
            .min()
    }

    /// Tightest OC headroom. A deal reporting no OC tests has zero buffer.
    pub fn coverage_buffer(&self) -> Decimal {
        self.results
            .iter()
            .filter(|r| r.test == TestType::Overcollateralization)
            .map(|r| r.buffer())
            .min()
            .unwrap_or(Decimal::ZERO)
    }

    /// Failing results that carry a cure amount, in reporting order.
    pub fn cures_needed(&self) -> impl Iterator<Item = &TriggerResult> {
        self.results
            .iter()
            .filter(|r| !r.passed && floor_zero(r.cure_amount) > Decimal::ZERO)
    }

    pub fn validate(&self, deal: &DealState) -> WaterfallResult<()> {
        let mut seen = HashSet::new();
        for r in &self.results {
            let field = format!("triggers.{}.{}", r.tranche, r.test.code());
            if deal.tranche(&r.tranche).is_none() {
                return Err(WaterfallError::input(field, "Result for a tranche not in the deal."));
            }
            if !seen.insert((r.tranche.as_str(), r.test)) {
                return Err(WaterfallError::input(field, "Duplicate trigger result."));
            }
            if r.cure_amount < Decimal::ZERO {
                return Err(WaterfallError::input(field, "Cure amount cannot be negative."));
            }
            if r.ratio < Decimal::ZERO || r.threshold < Decimal::ZERO {
                return Err(WaterfallError::input(field, "Ratio and threshold cannot be negative."));
            }
        }
        Ok(())
    }
}

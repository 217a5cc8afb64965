//! Per-execution record of applied cures.
//!
//! A cure for a given (tranche, test) pair is applied at most once per
//! execution. The orchestrator consults the ledger before recording a cure
//! payment; a second application is an invariant violation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::WaterfallError;
use crate::triggers::context::TestType;
use crate::types::{Money, TrancheId};
use crate::WaterfallResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCure {
    pub tranche: TrancheId,
    pub test: TestType,
    pub amount: Money,
    pub sequence_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CureLedger {
    applied: BTreeMap<(TrancheId, TestType), AppliedCure>,
}

impl CureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        tranche: &str,
        test: TestType,
        amount: Money,
        sequence_index: usize,
    ) -> WaterfallResult<()> {
        let key = (tranche.to_string(), test);
        if let Some(prior) = self.applied.get(&key) {
            return Err(WaterfallError::InvariantViolation(format!(
                "cure {}:{} already applied at step {}",
                tranche,
                test.code(),
                prior.sequence_index
            )));
        }
        self.applied.insert(
            key,
            AppliedCure {
                tranche: tranche.to_string(),
                test,
                amount,
                sequence_index,
            },
        );
        Ok(())
    }

    pub fn is_applied(&self, tranche: &str, test: TestType) -> bool {
        self.applied.contains_key(&(tranche.to_string(), test))
    }

    pub fn applied(&self) -> impl Iterator<Item = &AppliedCure> {
        self.applied.values()
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_second_application_rejected() {
        let mut ledger = CureLedger::new();
        ledger.record("B", TestType::Overcollateralization, dec!(100), 3).unwrap();
        let err = ledger
            .record("B", TestType::Overcollateralization, dec!(100), 5)
            .unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_distinct_tests_tracked_separately() {
        let mut ledger = CureLedger::new();
        ledger.record("B", TestType::Overcollateralization, dec!(100), 3).unwrap();
        ledger.record("B", TestType::InterestCoverage, dec!(50), 4).unwrap();
        assert!(ledger.is_applied("B", TestType::InterestCoverage));
        assert!(!ledger.is_applied("A", TestType::InterestCoverage));
        assert_eq!(ledger.len(), 2);
    }
}

//! Deal state store.
//!
//! Holds the balances a deal carries from one period to the next. The
//! orchestrator is the only writer: it clones the opening state, applies a
//! period's payments to the clone and hands the clone back only once the
//! execution has completed.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::deal::tranche::Tranche;
use crate::error::WaterfallError;
use crate::types::Money;
use crate::WaterfallResult;

/// Balances of a single deal at a period boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealState {
    pub deal_id: String,
    /// Last completed period (0 before the first payment date).
    #[serde(default)]
    pub period: u32,
    pub tranches: Vec<Tranche>,
    #[serde(default)]
    pub reserve_balance: Money,
    /// Equity distributions withheld under claw-back or distribution-stop rules.
    #[serde(default)]
    pub escrow_balance: Money,
    /// Suspense cash carried into the next period's register.
    #[serde(default)]
    pub carried_cash: Money,
    /// Incentive fees deferred under the fee-deferral rule, by fee name.
    #[serde(default)]
    pub deferred_fees: BTreeMap<String, Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_date: Option<NaiveDate>,
}

impl DealState {
    pub fn tranche(&self, id: &str) -> Option<&Tranche> {
        self.tranches.iter().find(|t| t.id == id)
    }

    pub(crate) fn tranche_mut(&mut self, id: &str) -> Option<&mut Tranche> {
        self.tranches.iter_mut().find(|t| t.id == id)
    }

    /// Tranches ordered most senior first. Ties keep declaration order.
    pub fn tranches_by_priority(&self) -> Vec<&Tranche> {
        let mut ordered: Vec<&Tranche> = self.tranches.iter().collect();
        ordered.sort_by_key(|t| t.priority);
        ordered
    }

    /// Non-equity tranches, most senior first.
    pub fn debt_tranches(&self) -> Vec<&Tranche> {
        self.tranches_by_priority()
            .into_iter()
            .filter(|t| !t.is_equity)
            .collect()
    }

    /// The equity class receiving residual distributions, if the deal models one.
    pub fn equity_tranche(&self) -> Option<&Tranche> {
        self.tranches_by_priority().into_iter().find(|t| t.is_equity)
    }

    /// Outstanding debt of classes at or above `priority`.
    pub fn debt_outstanding_through(&self, priority: u32) -> Money {
        self.tranches
            .iter()
            .filter(|t| !t.is_equity && t.priority <= priority)
            .map(|t| t.current_balance)
            .sum()
    }

    pub fn total_deferred_fees(&self) -> Money {
        self.deferred_fees.values().copied().sum()
    }

    pub fn validate(&self) -> WaterfallResult<()> {
        if self.deal_id.trim().is_empty() {
            return Err(WaterfallError::config("deal_id", "Deal id cannot be empty."));
        }
        if self.tranches.is_empty() {
            return Err(WaterfallError::config(
                "tranches",
                "At least one tranche is required.",
            ));
        }
        let mut seen = HashSet::new();
        for t in &self.tranches {
            t.validate()?;
            if !seen.insert(t.id.as_str()) {
                return Err(WaterfallError::config(
                    format!("tranche.{}", t.id),
                    "Duplicate tranche identifier.",
                ));
            }
        }
        for (field, value) in [
            ("reserve_balance", self.reserve_balance),
            ("escrow_balance", self.escrow_balance),
            ("carried_cash", self.carried_cash),
        ] {
            if value < Decimal::ZERO {
                return Err(WaterfallError::config(field, "Balance cannot be negative."));
            }
        }
        if let Some((name, _)) = self.deferred_fees.iter().find(|(_, v)| **v < Decimal::ZERO) {
            return Err(WaterfallError::config(
                format!("deferred_fees.{}", name),
                "Deferred fee balance cannot be negative.",
            ));
        }
        Ok(())
    }
}

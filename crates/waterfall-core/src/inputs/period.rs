//! Per-period inputs, fetched once before the step loop begins.
//!
//! Fee amounts, interest due and coverage-test results are computed
//! upstream from the prior period's ending state and stay fixed for the
//! whole execution.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::deal::state::DealState;
use crate::error::WaterfallError;
use crate::triggers::context::TriggerContext;
use crate::types::{Money, Rate, TrancheId};
use crate::WaterfallResult;

/// Everything the waterfall consumes for one (deal, period, payment date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodInputs {
    /// Period being paid (must be the deal's last completed period + 1).
    pub period: u32,
    pub payment_date: NaiveDate,
    /// Cash collected from the collateral pool for distribution.
    pub collection_amount: Money,
    /// Amount due per configured fee, before gating or sharing.
    #[serde(default)]
    pub fee_amounts: BTreeMap<String, Money>,
    /// Current-period interest due per debt tranche.
    #[serde(default)]
    pub interest_due: BTreeMap<TrancheId, Money>,
    /// Scheduled principal allocation per tranche. Absent means the full balance.
    #[serde(default)]
    pub principal_targets: BTreeMap<TrancheId, Money>,
    /// Required reserve account balance after this payment date.
    #[serde(default)]
    pub reserve_target: Money,
    #[serde(default)]
    pub triggers: TriggerContext,
    /// Trailing equity performance (e.g. annualised cash-on-cash), decimal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_performance: Option<Rate>,
    /// Tranches whose PIK toggle is explicitly elected this period.
    #[serde(default)]
    pub pik_elections: BTreeSet<TrancheId>,
    /// Explicit redemption direction lifting call protection for this period.
    #[serde(default)]
    pub call_override: bool,
}

impl PeriodInputs {
    pub fn fee_amount(&self, name: &str) -> WaterfallResult<Money> {
        self.fee_amounts.get(name).copied().ok_or_else(|| {
            WaterfallError::input(format!("fee_amounts.{}", name), "No amount supplied for fee.")
        })
    }

    pub fn interest_for(&self, tranche: &str) -> WaterfallResult<Money> {
        self.interest_due.get(tranche).copied().ok_or_else(|| {
            WaterfallError::input(
                format!("interest_due.{}", tranche),
                "No interest amount supplied for tranche.",
            )
        })
    }

    pub fn require_equity_performance(&self, reason: &str) -> WaterfallResult<Rate> {
        self.equity_performance
            .ok_or_else(|| WaterfallError::input("equity_performance", reason))
    }

    /// Input checks independent of the step sequence.
    pub fn validate(&self, deal: &DealState) -> WaterfallResult<()> {
        if self.collection_amount < Decimal::ZERO {
            return Err(WaterfallError::input(
                "collection_amount",
                "Collection amount cannot be negative.",
            ));
        }
        if self.reserve_target < Decimal::ZERO {
            return Err(WaterfallError::input(
                "reserve_target",
                "Reserve target cannot be negative.",
            ));
        }
        for (name, amount) in &self.fee_amounts {
            if *amount < Decimal::ZERO {
                return Err(WaterfallError::input(
                    format!("fee_amounts.{}", name),
                    "Fee amount cannot be negative.",
                ));
            }
        }
        for (map_name, map) in [
            ("interest_due", &self.interest_due),
            ("principal_targets", &self.principal_targets),
        ] {
            for (tranche, amount) in map {
                let field = format!("{}.{}", map_name, tranche);
                if deal.tranche(tranche).is_none() {
                    return Err(WaterfallError::input(field, "Tranche not in the deal."));
                }
                if *amount < Decimal::ZERO {
                    return Err(WaterfallError::input(field, "Amount cannot be negative."));
                }
            }
        }
        for tranche in &self.pik_elections {
            match deal.tranche(tranche) {
                Some(t) if t.pik_eligible => {}
                Some(_) => {
                    return Err(WaterfallError::input(
                        format!("pik_elections.{}", tranche),
                        "Tranche is not PIK-eligible.",
                    ))
                }
                None => {
                    return Err(WaterfallError::input(
                        format!("pik_elections.{}", tranche),
                        "Tranche not in the deal.",
                    ))
                }
            }
        }
        if let Some(last) = deal.last_payment_date {
            if self.payment_date <= last {
                return Err(WaterfallError::input(
                    "payment_date",
                    format!("Payment date must fall after the previous one ({}).", last),
                ));
            }
        }
        self.triggers.validate(deal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::tranche::{CouponTerms, Tranche};
    use rust_decimal_macros::dec;

    fn sample_deal() -> DealState {
        DealState {
            deal_id: "D".into(),
            period: 0,
            tranches: vec![Tranche {
                id: "A".into(),
                original_balance: dec!(100),
                current_balance: dec!(100),
                deferred_balance: Decimal::ZERO,
                coupon: CouponTerms::Fixed { rate: dec!(0.05) },
                priority: 1,
                is_equity: false,
                pik_eligible: false,
            }],
            reserve_balance: Decimal::ZERO,
            escrow_balance: Decimal::ZERO,
            carried_cash: Decimal::ZERO,
            deferred_fees: BTreeMap::new(),
            last_payment_date: NaiveDate::from_ymd_opt(2025, 1, 15),
        }
    }

    fn sample_inputs() -> PeriodInputs {
        PeriodInputs {
            period: 1,
            payment_date: NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(),
            collection_amount: dec!(10),
            fee_amounts: BTreeMap::new(),
            interest_due: BTreeMap::from([("A".to_string(), dec!(1.25))]),
            principal_targets: BTreeMap::new(),
            reserve_target: Decimal::ZERO,
            triggers: TriggerContext::default(),
            equity_performance: None,
            pik_elections: BTreeSet::new(),
            call_override: false,
        }
    }

    #[test]
    fn test_valid_inputs() {
        assert!(sample_inputs().validate(&sample_deal()).is_ok());
    }

    #[test]
    fn test_reject_negative_collection() {
        let mut inputs = sample_inputs();
        inputs.collection_amount = dec!(-1);
        assert!(matches!(
            inputs.validate(&sample_deal()),
            Err(WaterfallError::InputInconsistency { .. })
        ));
    }

    #[test]
    fn test_reject_interest_for_unknown_tranche() {
        let mut inputs = sample_inputs();
        inputs.interest_due.insert("Z".into(), dec!(1));
        assert!(inputs.validate(&sample_deal()).is_err());
    }

    #[test]
    fn test_reject_pik_election_on_ineligible_tranche() {
        let mut inputs = sample_inputs();
        inputs.pik_elections.insert("A".into());
        assert!(inputs.validate(&sample_deal()).is_err());
    }

    #[test]
    fn test_reject_stale_payment_date() {
        let mut inputs = sample_inputs();
        inputs.payment_date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert!(inputs.validate(&sample_deal()).is_err());
    }

    #[test]
    fn test_missing_fee_names_field() {
        let err = sample_inputs().fee_amount("trustee").unwrap_err();
        assert!(err.to_string().contains("fee_amounts.trustee"));
    }
}

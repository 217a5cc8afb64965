//! Period-by-period history of one deal.
//!
//! Periods run strictly in order: each execution starts from the previous
//! one's ending state. A completed execution is never re-run in place; a
//! correction goes through [`DealTimeline::supersede_latest`], which
//! re-runs the last period from its recorded opening state and keeps the
//! replaced execution for audit.

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::variant::VariantConfiguration;
use crate::deal::state::DealState;
use crate::engine::execution::WaterfallExecution;
use crate::engine::orchestrator::WaterfallEngine;
use crate::error::WaterfallError;
use crate::inputs::period::PeriodInputs;
use crate::WaterfallResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TimelineEntry {
    opening: DealState,
    execution: WaterfallExecution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealTimeline {
    initial: DealState,
    entries: Vec<TimelineEntry>,
    superseded: Vec<WaterfallExecution>,
}

impl DealTimeline {
    pub fn new(initial: DealState) -> Self {
        DealTimeline {
            initial,
            entries: Vec::new(),
            superseded: Vec::new(),
        }
    }

    pub fn deal_id(&self) -> &str {
        &self.initial.deal_id
    }

    /// State the next period will start from.
    pub fn current_state(&self) -> &DealState {
        self.entries
            .last()
            .map(|e| e.execution.ending_state())
            .unwrap_or(&self.initial)
    }

    pub fn executions(&self) -> impl Iterator<Item = &WaterfallExecution> {
        self.entries.iter().map(|e| &e.execution)
    }

    pub fn latest(&self) -> Option<&WaterfallExecution> {
        self.entries.last().map(|e| &e.execution)
    }

    /// Executions replaced by corrections, oldest first.
    pub fn superseded(&self) -> &[WaterfallExecution] {
        &self.superseded
    }

    /// Run the next period. On failure the timeline is unchanged.
    pub fn run_next(
        &mut self,
        engine: &WaterfallEngine,
        config: &VariantConfiguration,
        inputs: &PeriodInputs,
    ) -> WaterfallResult<&WaterfallExecution> {
        let opening = self.current_state().clone();
        let execution = engine.run_waterfall(&opening, config, inputs)?;
        Ok(self.push(opening, execution))
    }

    /// Replace the latest execution with a re-run of the same period.
    pub fn supersede_latest(
        &mut self,
        engine: &WaterfallEngine,
        config: &VariantConfiguration,
        inputs: &PeriodInputs,
    ) -> WaterfallResult<&WaterfallExecution> {
        let latest = self
            .entries
            .last()
            .ok_or_else(|| WaterfallError::input("period", "No completed period to supersede."))?;
        if inputs.period != latest.execution.period() {
            return Err(WaterfallError::PeriodOrder {
                expected: latest.execution.period(),
                actual: inputs.period,
            });
        }
        let execution = engine.execute(
            &latest.opening,
            config,
            inputs,
            latest.execution.revision() + 1,
            Some(latest.execution.execution_id().to_string()),
        )?;
        let replaced = self
            .entries
            .pop()
            .ok_or_else(|| WaterfallError::InvariantViolation("timeline emptied during supersede".into()))?;
        info!(
            "{} superseded by {}",
            replaced.execution.execution_id(),
            execution.execution_id()
        );
        self.superseded.push(replaced.execution);
        Ok(self.push(replaced.opening, execution))
    }

    fn push(&mut self, opening: DealState, execution: WaterfallExecution) -> &WaterfallExecution {
        self.entries.push(TimelineEntry { opening, execution });
        let last = self.entries.len() - 1;
        &self.entries[last].execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::variant::{FeeClass, FeeSpec};
    use crate::deal::tranche::{CouponTerms, Tranche};
    use crate::triggers::context::{TestType, TriggerContext, TriggerResult};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_deal() -> DealState {
        DealState {
            deal_id: "T".into(),
            period: 0,
            tranches: vec![Tranche {
                id: "A".into(),
                original_balance: dec!(1_000),
                current_balance: dec!(1_000),
                deferred_balance: Decimal::ZERO,
                coupon: CouponTerms::None,
                priority: 1,
                is_equity: false,
                pik_eligible: false,
            }],
            reserve_balance: Decimal::ZERO,
            escrow_balance: Decimal::ZERO,
            carried_cash: Decimal::ZERO,
            deferred_fees: BTreeMap::new(),
            last_payment_date: None,
        }
    }

    fn sample_config() -> VariantConfiguration {
        let mut cfg = VariantConfiguration::new("T", "traditional", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        cfg.fees = vec![FeeSpec { name: "trustee".into(), class: FeeClass::Senior }];
        cfg
    }

    fn inputs_for(period: u32, collection: Decimal) -> PeriodInputs {
        PeriodInputs {
            period,
            payment_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap() + chrono::Months::new(3 * period),
            collection_amount: collection,
            fee_amounts: BTreeMap::from([("trustee".to_string(), dec!(5))]),
            interest_due: BTreeMap::from([("A".to_string(), dec!(20))]),
            principal_targets: BTreeMap::new(),
            reserve_target: Decimal::ZERO,
            triggers: TriggerContext::new(vec![TriggerResult {
                tranche: "A".into(),
                test: TestType::Overcollateralization,
                ratio: dec!(1.3),
                threshold: dec!(1.1),
                passed: true,
                cure_amount: Decimal::ZERO,
            }]),
            equity_performance: None,
            pik_elections: BTreeSet::new(),
            call_override: false,
        }
    }

    #[test]
    fn test_periods_chain_balances() {
        let engine = WaterfallEngine::default();
        let cfg = sample_config();
        let mut timeline = DealTimeline::new(sample_deal());
        timeline.run_next(&engine, &cfg, &inputs_for(1, dec!(125))).unwrap();
        timeline.run_next(&engine, &cfg, &inputs_for(2, dec!(225))).unwrap();
        assert_eq!(timeline.current_state().tranche("A").unwrap().current_balance, dec!(700));
        assert_eq!(timeline.current_state().period, 2);
        assert_eq!(timeline.executions().count(), 2);
    }

    #[test]
    fn test_out_of_order_period_leaves_timeline_unchanged() {
        let engine = WaterfallEngine::default();
        let cfg = sample_config();
        let mut timeline = DealTimeline::new(sample_deal());
        let err = timeline.run_next(&engine, &cfg, &inputs_for(2, dec!(100))).unwrap_err();
        assert!(matches!(err, WaterfallError::PeriodOrder { expected: 1, actual: 2 }));
        assert_eq!(timeline.current_state(), &sample_deal());
    }

    #[test]
    fn test_supersede_reruns_from_prior_state() {
        let engine = WaterfallEngine::default();
        let cfg = sample_config();
        let mut timeline = DealTimeline::new(sample_deal());
        timeline.run_next(&engine, &cfg, &inputs_for(1, dec!(125))).unwrap();
        let corrected = timeline
            .supersede_latest(&engine, &cfg, &inputs_for(1, dec!(75)))
            .unwrap();
        assert_eq!(corrected.execution_id(), "T-P0001-R1");
        assert_eq!(corrected.supersedes(), Some("T-P0001-R0"));
        assert_eq!(timeline.superseded().len(), 1);
        assert_eq!(timeline.current_state().tranche("A").unwrap().current_balance, dec!(950));
        assert_eq!(timeline.executions().count(), 1);
    }

    #[test]
    fn test_supersede_requires_same_period() {
        let engine = WaterfallEngine::default();
        let cfg = sample_config();
        let mut timeline = DealTimeline::new(sample_deal());
        assert!(timeline.supersede_latest(&engine, &cfg, &inputs_for(1, dec!(10))).is_err());
        timeline.run_next(&engine, &cfg, &inputs_for(1, dec!(125))).unwrap();
        let err = timeline
            .supersede_latest(&engine, &cfg, &inputs_for(2, dec!(10)))
            .unwrap_err();
        assert!(matches!(err, WaterfallError::PeriodOrder { .. }));
    }
}

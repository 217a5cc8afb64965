//! External collaborator interfaces.
//!
//! Collections, coverage tests, fee/interest amounts and configurations
//! come from outside the engine. [`gather_period_inputs`] queries each
//! provider once, upfront, so every step of an execution sees the same
//! snapshot.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::config::variant::VariantConfiguration;
use crate::deal::state::DealState;
use crate::error::WaterfallError;
use crate::inputs::period::PeriodInputs;
use crate::sequence::step::PaymentStep;
use crate::triggers::context::TriggerContext;
use crate::types::{round_currency, Money, Rate};
use crate::WaterfallResult;

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

pub trait CollectionProvider {
    fn collection_amount(&self, deal_id: &str, period: u32) -> WaterfallResult<Money>;
}

pub trait TriggerContextProvider {
    fn trigger_context(&self, deal_id: &str, period: u32) -> WaterfallResult<TriggerContext>;
}

/// Amount due for a fee or interest step before gating. `None` when the
/// provider does not size that step.
pub trait AmountProvider {
    fn amount_due(&self, deal: &DealState, period: u32, step: &PaymentStep) -> WaterfallResult<Option<Money>>;
}

pub trait ConfigurationStore {
    /// The configuration in force for `deal_id` on `date`.
    fn configuration_for(&self, deal_id: &str, date: NaiveDate) -> WaterfallResult<VariantConfiguration>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Effective-dated configurations; the latest `effective_from <= date` wins.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    configurations: Vec<VariantConfiguration>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a configuration, replacing one for the same deal and date.
    pub fn insert(&mut self, config: VariantConfiguration) {
        self.configurations
            .retain(|c| !(c.deal_id == config.deal_id && c.effective_from == config.effective_from));
        self.configurations.push(config);
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}

impl FromIterator<VariantConfiguration> for InMemoryConfigStore {
    fn from_iter<I: IntoIterator<Item = VariantConfiguration>>(iter: I) -> Self {
        let mut store = InMemoryConfigStore::new();
        for config in iter {
            store.insert(config);
        }
        store
    }
}

impl ConfigurationStore for InMemoryConfigStore {
    fn configuration_for(&self, deal_id: &str, date: NaiveDate) -> WaterfallResult<VariantConfiguration> {
        self.configurations
            .iter()
            .filter(|c| c.deal_id == deal_id && c.effective_from <= date)
            .max_by_key(|c| c.effective_from)
            .cloned()
            .ok_or_else(|| {
                WaterfallError::config(
                    "effective_from",
                    format!("No configuration for deal '{}' in force on {}.", deal_id, date),
                )
            })
    }
}

/// Collections and coverage tests keyed by period.
#[derive(Debug, Clone, Default)]
pub struct StaticPeriodSource {
    pub collections: BTreeMap<u32, Money>,
    pub triggers: BTreeMap<u32, TriggerContext>,
}

impl CollectionProvider for StaticPeriodSource {
    fn collection_amount(&self, _deal_id: &str, period: u32) -> WaterfallResult<Money> {
        self.collections.get(&period).copied().ok_or_else(|| {
            WaterfallError::input(
                "collection_amount",
                format!("No collection amount for period {}.", period),
            )
        })
    }
}

impl TriggerContextProvider for StaticPeriodSource {
    fn trigger_context(&self, _deal_id: &str, period: u32) -> WaterfallResult<TriggerContext> {
        Ok(self.triggers.get(&period).cloned().unwrap_or_default())
    }
}

/// Interest from each tranche's coupon terms, fees from a fixed schedule.
#[derive(Debug, Clone, Default)]
pub struct CouponAccrual {
    /// Reference rate for floating coupons (e.g. 3M SOFR), decimal.
    pub reference_rate: Rate,
    pub accrual_days: u32,
    pub fees: BTreeMap<String, Money>,
}

impl AmountProvider for CouponAccrual {
    fn amount_due(&self, deal: &DealState, _period: u32, step: &PaymentStep) -> WaterfallResult<Option<Money>> {
        match step {
            PaymentStep::Interest { tranche } => {
                let t = deal.tranche(tranche).ok_or_else(|| WaterfallError::UnknownTranche {
                    step: step.to_string(),
                    tranche: tranche.clone(),
                })?;
                Ok(Some(round_currency(
                    t.period_interest(self.reference_rate, self.accrual_days),
                )))
            }
            PaymentStep::Fee { name, .. } => Ok(self.fees.get(name).copied()),
            _ => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

pub struct PeriodSources<'a> {
    pub collections: &'a dyn CollectionProvider,
    pub triggers: &'a dyn TriggerContextProvider,
    pub amounts: &'a dyn AmountProvider,
}

/// Query every provider once for `period` and assemble the inputs. Fields
/// the providers do not cover (reserve target, performance, elections)
/// are left at their defaults for the caller to set.
pub fn gather_period_inputs(
    deal: &DealState,
    config: &VariantConfiguration,
    period: u32,
    payment_date: NaiveDate,
    sources: &PeriodSources<'_>,
) -> WaterfallResult<PeriodInputs> {
    let collection_amount = sources.collections.collection_amount(&deal.deal_id, period)?;
    let triggers = sources.triggers.trigger_context(&deal.deal_id, period)?;

    let mut fee_amounts = BTreeMap::new();
    for fee in &config.fees {
        let step = PaymentStep::Fee {
            name: fee.name.clone(),
            class: fee.class,
        };
        let amount = sources.amounts.amount_due(deal, period, &step)?.ok_or_else(|| {
            WaterfallError::input(format!("fee_amounts.{}", fee.name), "Provider has no amount for fee.")
        })?;
        fee_amounts.insert(fee.name.clone(), amount);
    }

    let mut interest_due = BTreeMap::new();
    for t in deal.debt_tranches() {
        let step = PaymentStep::Interest { tranche: t.id.clone() };
        let amount = sources
            .amounts
            .amount_due(deal, period, &step)?
            .unwrap_or(Decimal::ZERO);
        interest_due.insert(t.id.clone(), amount);
    }

    Ok(PeriodInputs {
        period,
        payment_date,
        collection_amount,
        fee_amounts,
        interest_due,
        principal_targets: BTreeMap::new(),
        reserve_target: Decimal::ZERO,
        triggers,
        equity_performance: None,
        pik_elections: Default::default(),
        call_override: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::variant::{FeeClass, FeeSpec};
    use crate::deal::tranche::{CouponTerms, Tranche};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_deal() -> DealState {
        let fixed = Tranche {
            id: "A".into(),
            original_balance: dec!(1_000_000),
            current_balance: dec!(1_000_000),
            deferred_balance: Decimal::ZERO,
            coupon: CouponTerms::Fixed { rate: dec!(0.05) },
            priority: 1,
            is_equity: false,
            pik_eligible: false,
        };
        let floating = Tranche {
            id: "B".into(),
            coupon: CouponTerms::Floating { spread: dec!(0.03), floor: Some(dec!(0.01)) },
            priority: 2,
            ..fixed.clone()
        };
        DealState {
            deal_id: "P".into(),
            period: 0,
            tranches: vec![fixed, floating],
            reserve_balance: Decimal::ZERO,
            escrow_balance: Decimal::ZERO,
            carried_cash: Decimal::ZERO,
            deferred_fees: BTreeMap::new(),
            last_payment_date: None,
        }
    }

    #[test]
    fn test_store_picks_latest_effective() {
        let store: InMemoryConfigStore = [
            VariantConfiguration::new("P", "traditional", date(2024, 1, 1)),
            VariantConfiguration::new("P", "turbo", date(2025, 1, 1)),
            VariantConfiguration::new("Q", "pik_toggle", date(2023, 1, 1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(store.configuration_for("P", date(2024, 6, 30)).unwrap().variant, "traditional");
        assert_eq!(store.configuration_for("P", date(2025, 1, 1)).unwrap().variant, "turbo");
        assert!(store.configuration_for("P", date(2023, 12, 31)).is_err());
    }

    #[test]
    fn test_coupon_accrual_act_360() {
        let deal = sample_deal();
        let accrual = CouponAccrual {
            reference_rate: dec!(0.02),
            accrual_days: 90,
            fees: BTreeMap::new(),
        };
        let interest = |id: &str| {
            accrual
                .amount_due(&deal, 1, &PaymentStep::Interest { tranche: id.into() })
                .unwrap()
                .unwrap()
        };
        // 1,000,000 * 5% * 90/360
        assert_eq!(interest("A"), dec!(12_500.00));
        // (2% + 3%) floored at 1%
        assert_eq!(interest("B"), dec!(12_500.00));
    }

    #[test]
    fn test_gather_fetches_once_per_source() {
        let deal = sample_deal();
        let mut config = VariantConfiguration::new("P", "traditional", date(2025, 1, 1));
        config.fees = vec![FeeSpec { name: "trustee".into(), class: FeeClass::Senior }];
        let source = StaticPeriodSource {
            collections: BTreeMap::from([(1, dec!(40_000))]),
            triggers: BTreeMap::new(),
        };
        let accrual = CouponAccrual {
            reference_rate: dec!(0.04),
            accrual_days: 90,
            fees: BTreeMap::from([("trustee".to_string(), dec!(250))]),
        };
        let sources = PeriodSources {
            collections: &source,
            triggers: &source,
            amounts: &accrual,
        };
        let inputs = gather_period_inputs(&deal, &config, 1, date(2025, 4, 15), &sources).unwrap();
        assert_eq!(inputs.collection_amount, dec!(40_000));
        assert_eq!(inputs.fee_amounts["trustee"], dec!(250));
        assert_eq!(inputs.interest_due["B"], dec!(17_500.00));

        let missing = gather_period_inputs(&deal, &config, 2, date(2025, 7, 15), &sources).unwrap_err();
        assert!(matches!(missing, WaterfallError::InputInconsistency { .. }));
    }
}

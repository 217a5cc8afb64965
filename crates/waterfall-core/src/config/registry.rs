//! Variant configuration registry.
//!
//! Maps a variant identifier to its feature flags and default parameters,
//! and resolves a deal's configuration to a concrete strategy/calculator
//! pair. New variants are added with [`VariantRegistry::register`] without
//! touching the built-in ones. Every check that can fail runs here, before
//! any period is processed.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calculator::amount::AmountCalculator;
use crate::config::variant::{FeatureFlags, VariantConfiguration, VariantParameters};
use crate::deal::state::DealState;
use crate::error::WaterfallError;
use crate::inputs::period::PeriodInputs;
use crate::sequence::base;
use crate::sequence::step::SequencedStep;
use crate::sequence::strategy::SequenceStrategy;
use crate::types::Rate;
use crate::WaterfallResult;

/// A registered variant: the flags it switches on and its parameter defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDefinition {
    pub description: String,
    pub flags: FeatureFlags,
    #[serde(default)]
    pub defaults: VariantParameters,
}

/// Parameters after defaults are applied and required values checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParameters {
    pub turbo_threshold: Decimal,
    pub non_call_end: Option<NaiveDate>,
    pub min_equity_performance: Rate,
    /// 1 when fee sharing is off.
    pub fee_share_pct: Rate,
    pub hurdle_rate: Rate,
    pub catch_up_rate: Rate,
    pub holdback_pct: Rate,
    pub stopper_threshold: Decimal,
    pub pik_on_ic_failure: bool,
}

/// Output of [`VariantRegistry::load`]: everything an execution needs.
#[derive(Debug, Clone)]
pub struct ResolvedVariant {
    pub variant: String,
    pub flags: FeatureFlags,
    pub parameters: ResolvedParameters,
    pub strategy: SequenceStrategy,
    pub calculator: AmountCalculator,
    pub configuration: VariantConfiguration,
}

impl ResolvedVariant {
    /// This period's step sequence.
    pub fn sequence(&self, deal: &DealState, inputs: &PeriodInputs) -> WaterfallResult<Vec<SequencedStep>> {
        self.strategy.sequence(&self.configuration, deal, inputs)
    }
}

#[derive(Debug, Clone)]
pub struct VariantRegistry {
    variants: BTreeMap<String, VariantDefinition>,
}

impl Default for VariantRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn common_defaults() -> VariantParameters {
    VariantParameters {
        catch_up_rate: Some(Decimal::ONE),
        holdback_pct: Some(Decimal::ONE),
        pik_on_ic_failure: Some(false),
        ..Default::default()
    }
}

impl VariantRegistry {
    pub fn empty() -> Self {
        VariantRegistry {
            variants: BTreeMap::new(),
        }
    }

    /// Registry holding the traditional waterfall and its standard variants.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let builtins: [(&str, &str, FeatureFlags); 9] = [
            (
                "traditional",
                "Sequential interest then principal, gated on coverage tests",
                FeatureFlags::default(),
            ),
            (
                "turbo",
                "Principal accelerated behind each tranche's interest when OC is strong",
                FeatureFlags { turbo: true, ..Default::default() },
            ),
            (
                "pik_toggle",
                "PIK-eligible tranches may capitalise interest instead of paying cash",
                FeatureFlags { pik_toggle: true, ..Default::default() },
            ),
            (
                "claw_back",
                "Equity distributions escrowed below a performance hurdle",
                FeatureFlags { claw_back: true, ..Default::default() },
            ),
            (
                "call_protection",
                "No principal repayment during the non-call period",
                FeatureFlags { call_protection: true, ..Default::default() },
            ),
            (
                "fee_deferral",
                "Junior and incentive fees subordinated on weak equity performance",
                FeatureFlags { fee_deferral: true, ..Default::default() },
            ),
            (
                "fee_sharing",
                "Incentive fees scaled by a sharing percentage",
                FeatureFlags { fee_sharing: true, ..Default::default() },
            ),
            (
                "performance_tiered",
                "Fee deferral combined with incentive fee sharing",
                FeatureFlags {
                    fee_deferral: true,
                    fee_sharing: true,
                    ..Default::default()
                },
            ),
            (
                "distribution_stopper",
                "Equity and incentive distributions stopped on a thin coverage buffer",
                FeatureFlags { distribution_stopper: true, ..Default::default() },
            ),
        ];
        for (id, description, flags) in builtins {
            registry.variants.insert(
                id.to_string(),
                VariantDefinition {
                    description: description.to_string(),
                    flags,
                    defaults: common_defaults(),
                },
            );
        }
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, definition: VariantDefinition) -> WaterfallResult<()> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WaterfallError::config("variant", "Variant identifier cannot be empty."));
        }
        if self.variants.contains_key(&id) {
            return Err(WaterfallError::DuplicateVariant(id));
        }
        self.variants.insert(id, definition);
        Ok(())
    }

    pub fn definition(&self, id: &str) -> Option<&VariantDefinition> {
        self.variants.get(id)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(|k| k.as_str())
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&str, &VariantDefinition)> {
        self.variants.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve an identifier plus deal-level flags and parameters to a
    /// strategy, a calculator and the effective parameters.
    pub fn resolve(
        &self,
        id: &str,
        extra_flags: FeatureFlags,
        parameters: &VariantParameters,
    ) -> WaterfallResult<(SequenceStrategy, AmountCalculator, ResolvedParameters)> {
        let definition = self
            .variants
            .get(id)
            .ok_or_else(|| WaterfallError::UnknownVariant(id.to_string()))?;
        let flags = definition.flags.union(extra_flags);
        let merged = parameters.overlay(&definition.defaults);
        let resolved = resolve_parameters(&flags, &merged)?;
        Ok((
            SequenceStrategy::new(flags, resolved.clone()),
            AmountCalculator::new(flags, resolved.clone()),
            resolved,
        ))
    }

    /// Resolve and validate a deal's configuration against its tranches.
    pub fn load(&self, config: &VariantConfiguration, deal: &DealState) -> WaterfallResult<ResolvedVariant> {
        deal.validate()?;
        if config.deal_id != deal.deal_id {
            return Err(WaterfallError::config(
                "deal_id",
                format!(
                    "Configuration is for deal '{}', not '{}'.",
                    config.deal_id, deal.deal_id
                ),
            ));
        }
        validate_fees(config)?;
        let (strategy, calculator, parameters) =
            self.resolve(&config.variant, config.flags, &config.parameters)?;
        let flags = strategy.flags();
        let layout = base::layout_steps(config, deal, &flags);
        base::validate_layout(&layout, config, deal, &flags)?;
        Ok(ResolvedVariant {
            variant: config.variant.clone(),
            flags,
            parameters,
            strategy,
            calculator,
            configuration: config.clone(),
        })
    }
}

fn validate_fees(config: &VariantConfiguration) -> WaterfallResult<()> {
    for (i, fee) in config.fees.iter().enumerate() {
        if fee.name.trim().is_empty() {
            return Err(WaterfallError::config("fees.name", "Fee name cannot be empty."));
        }
        if config.fees[..i].iter().any(|f| f.name == fee.name) {
            return Err(WaterfallError::config(
                format!("fees.{}", fee.name),
                "Duplicate fee name.",
            ));
        }
    }
    Ok(())
}

fn require<T: Copy>(value: Option<T>, field: &str, flag: &str) -> WaterfallResult<T> {
    value.ok_or_else(|| {
        WaterfallError::config(
            format!("parameters.{}", field),
            format!("Required when {} is active.", flag),
        )
    })
}

fn check_unit_interval(value: Rate, field: &str) -> WaterfallResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(WaterfallError::config(
            format!("parameters.{}", field),
            "Must be in [0, 1].",
        ));
    }
    Ok(())
}

fn resolve_parameters(flags: &FeatureFlags, p: &VariantParameters) -> WaterfallResult<ResolvedParameters> {
    let turbo_threshold = if flags.turbo {
        let v = require(p.turbo_threshold, "turbo_threshold", "turbo")?;
        if v < Decimal::ZERO {
            return Err(WaterfallError::config(
                "parameters.turbo_threshold",
                "Threshold cannot be negative.",
            ));
        }
        v
    } else {
        p.turbo_threshold.unwrap_or(Decimal::ZERO)
    };

    let non_call_end = if flags.call_protection {
        Some(require(p.non_call_end, "non_call_end", "call_protection")?)
    } else {
        p.non_call_end
    };

    let min_equity_performance = if flags.fee_deferral {
        require(p.min_equity_performance, "min_equity_performance", "fee_deferral")?
    } else {
        p.min_equity_performance.unwrap_or(Decimal::ZERO)
    };

    let fee_share_pct = if flags.fee_sharing {
        let v = require(p.fee_share_pct, "fee_share_pct", "fee_sharing")?;
        check_unit_interval(v, "fee_share_pct")?;
        v
    } else {
        Decimal::ONE
    };

    let hurdle_rate = if flags.claw_back {
        require(p.hurdle_rate, "hurdle_rate", "claw_back")?
    } else {
        p.hurdle_rate.unwrap_or(Decimal::ZERO)
    };
    let catch_up_rate = p.catch_up_rate.unwrap_or(Decimal::ONE);
    if catch_up_rate < Decimal::ZERO {
        return Err(WaterfallError::config(
            "parameters.catch_up_rate",
            "Catch-up rate cannot be negative.",
        ));
    }
    let holdback_pct = p.holdback_pct.unwrap_or(Decimal::ONE);
    check_unit_interval(holdback_pct, "holdback_pct")?;

    let stopper_threshold = if flags.distribution_stopper {
        require(p.stopper_threshold, "stopper_threshold", "distribution_stopper")?
    } else {
        p.stopper_threshold.unwrap_or(Decimal::ZERO)
    };

    Ok(ResolvedParameters {
        turbo_threshold,
        non_call_end,
        min_equity_performance,
        fee_share_pct,
        hurdle_rate,
        catch_up_rate,
        holdback_pct,
        stopper_threshold,
        pik_on_ic_failure: p.pik_on_ic_failure.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::tranche::{CouponTerms, Tranche};
    use crate::sequence::step::PaymentStep;
    use rust_decimal_macros::dec;

    fn sample_deal() -> DealState {
        DealState {
            deal_id: "CLO-1".into(),
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
            last_payment_date: None,
        }
    }

    fn sample_config(variant: &str) -> VariantConfiguration {
        VariantConfiguration::new("CLO-1", variant, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }

    #[test]
    fn test_builtins_present() {
        let r = VariantRegistry::default();
        let ids: Vec<&str> = r.identifiers().collect();
        for id in ["traditional", "turbo", "claw_back", "distribution_stopper", "performance_tiered"] {
            assert!(ids.contains(&id), "missing {}", id);
        }
    }

    #[test]
    fn test_unknown_variant_fails_fast() {
        let r = VariantRegistry::default();
        let err = r.load(&sample_config("waterfall_x"), &sample_deal()).unwrap_err();
        assert!(matches!(err, WaterfallError::UnknownVariant(ref id) if id == "waterfall_x"));
    }

    #[test]
    fn test_missing_required_parameter_names_field() {
        let r = VariantRegistry::default();
        let err = r.load(&sample_config("turbo"), &sample_deal()).unwrap_err();
        assert!(err.to_string().contains("parameters.turbo_threshold"));
    }

    #[test]
    fn test_fee_share_out_of_range() {
        let r = VariantRegistry::default();
        let mut cfg = sample_config("fee_sharing");
        cfg.parameters.fee_share_pct = Some(dec!(1.5));
        assert!(r.load(&cfg, &sample_deal()).is_err());
    }

    #[test]
    fn test_register_new_variant() {
        let mut r = VariantRegistry::default();
        r.register(
            "turbo_stopper",
            VariantDefinition {
                description: "Turbo with a distribution stop".into(),
                flags: FeatureFlags {
                    turbo: true,
                    distribution_stopper: true,
                    ..Default::default()
                },
                defaults: VariantParameters {
                    turbo_threshold: Some(dec!(1.3)),
                    stopper_threshold: Some(dec!(0.02)),
                    ..Default::default()
                },
            },
        )
        .unwrap();
        let resolved = r.load(&sample_config("turbo_stopper"), &sample_deal()).unwrap();
        assert!(resolved.flags.turbo && resolved.flags.distribution_stopper);
        assert_eq!(resolved.parameters.turbo_threshold, dec!(1.3));
        assert_eq!(resolved.parameters.catch_up_rate, Decimal::ONE);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut r = VariantRegistry::default();
        let def = r.definition("traditional").unwrap().clone();
        assert!(matches!(
            r.register("traditional", def),
            Err(WaterfallError::DuplicateVariant(_))
        ));
    }

    #[test]
    fn test_config_flags_compose_with_variant() {
        let r = VariantRegistry::default();
        let mut cfg = sample_config("turbo");
        cfg.flags.call_protection = true;
        cfg.parameters.turbo_threshold = Some(dec!(1.25));
        cfg.parameters.non_call_end = NaiveDate::from_ymd_opt(2026, 1, 1);
        let resolved = r.load(&cfg, &sample_deal()).unwrap();
        assert_eq!(resolved.flags.active(), vec!["turbo", "call_protection"]);
    }

    #[test]
    fn test_custom_sequence_without_terminal_rejected() {
        let r = VariantRegistry::default();
        let mut cfg = sample_config("traditional");
        cfg.custom_sequence = Some(vec![PaymentStep::Interest { tranche: "A".into() }]);
        assert!(matches!(
            r.load(&cfg, &sample_deal()),
            Err(WaterfallError::Configuration { .. })
        ));
    }

    #[test]
    fn test_deal_mismatch_rejected() {
        let r = VariantRegistry::default();
        let mut cfg = sample_config("traditional");
        cfg.deal_id = "OTHER".into();
        assert!(r.load(&cfg, &sample_deal()).is_err());
    }
}

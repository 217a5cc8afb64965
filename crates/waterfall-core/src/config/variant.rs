//! Per-deal variant configuration.
//!
//! A configuration names a registered variant, may switch on extra
//! behaviours through the closed [`FeatureFlags`] record, and overrides the
//! variant's numeric defaults through [`VariantParameters`]. It is loaded
//! once per execution and never changes while one is in flight.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::sequence::step::PaymentStep;
use crate::types::Rate;

/// Optional behaviours layered on the traditional waterfall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Accelerate principal behind each tranche's interest when coverage is strong.
    pub turbo: bool,
    /// Allow PIK-eligible tranches to capitalise interest instead of drawing cash.
    pub pik_toggle: bool,
    /// Escrow equity distributions while performance is below the hurdle.
    pub claw_back: bool,
    /// Withhold principal repayment during the non-call period.
    pub call_protection: bool,
    /// Subordinate junior and incentive fees when equity performance is weak.
    pub fee_deferral: bool,
    /// Scale incentive fees by a sharing percentage.
    pub fee_sharing: bool,
    /// Stop equity and incentive distributions when the coverage buffer is thin.
    pub distribution_stopper: bool,
}

impl FeatureFlags {
    pub fn union(self, other: FeatureFlags) -> FeatureFlags {
        FeatureFlags {
            turbo: self.turbo || other.turbo,
            pik_toggle: self.pik_toggle || other.pik_toggle,
            claw_back: self.claw_back || other.claw_back,
            call_protection: self.call_protection || other.call_protection,
            fee_deferral: self.fee_deferral || other.fee_deferral,
            fee_sharing: self.fee_sharing || other.fee_sharing,
            distribution_stopper: self.distribution_stopper || other.distribution_stopper,
        }
    }

    /// Whether the residual is preceded by an escrow-hold decision.
    pub fn needs_escrow(&self) -> bool {
        self.claw_back || self.distribution_stopper
    }

    /// Names of the active flags, in declaration order.
    pub fn active(&self) -> Vec<&'static str> {
        [
            ("turbo", self.turbo),
            ("pik_toggle", self.pik_toggle),
            ("claw_back", self.claw_back),
            ("call_protection", self.call_protection),
            ("fee_deferral", self.fee_deferral),
            ("fee_sharing", self.fee_sharing),
            ("distribution_stopper", self.distribution_stopper),
        ]
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Numeric parameters of the variant rules. Unset values fall back to the
/// registered variant's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantParameters {
    /// Minimum OC ratio that must be exceeded for turbo principal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turbo_threshold: Option<Decimal>,
    /// First payment date on which principal may be repaid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_call_end: Option<NaiveDate>,
    /// Equity performance below which junior and incentive fees are deferred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_equity_performance: Option<Rate>,
    /// Share of the incentive fee actually paid (0..=1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_share_pct: Option<Rate>,
    /// Equity performance hurdle for claw-back escrow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hurdle_rate: Option<Rate>,
    /// Escrow released per unit of residual once the hurdle is met.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_up_rate: Option<Rate>,
    /// Share of the residual withheld while below the hurdle (0..=1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holdback_pct: Option<Rate>,
    /// OC headroom below which equity distributions stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopper_threshold: Option<Decimal>,
    /// Elect PIK automatically when the tranche's IC test fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pik_on_ic_failure: Option<bool>,
}

impl VariantParameters {
    /// Values set here win; unset values are taken from `defaults`.
    pub fn overlay(&self, defaults: &VariantParameters) -> VariantParameters {
        VariantParameters {
            turbo_threshold: self.turbo_threshold.or(defaults.turbo_threshold),
            non_call_end: self.non_call_end.or(defaults.non_call_end),
            min_equity_performance: self
                .min_equity_performance
                .or(defaults.min_equity_performance),
            fee_share_pct: self.fee_share_pct.or(defaults.fee_share_pct),
            hurdle_rate: self.hurdle_rate.or(defaults.hurdle_rate),
            catch_up_rate: self.catch_up_rate.or(defaults.catch_up_rate),
            holdback_pct: self.holdback_pct.or(defaults.holdback_pct),
            stopper_threshold: self.stopper_threshold.or(defaults.stopper_threshold),
            pik_on_ic_failure: self.pik_on_ic_failure.or(defaults.pik_on_ic_failure),
        }
    }
}

/// Position of a fee in the priority of payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeClass {
    /// Trustee, administrative and senior management fees.
    Senior,
    /// Subordinated management fees.
    Junior,
    /// Performance-based manager fees.
    Incentive,
}

/// A named fee line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSpec {
    pub name: String,
    pub class: FeeClass,
}

/// Where cash left after every other step goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualRouting {
    #[default]
    Equity,
    /// Hold the residual in a suspense account for the next period.
    CarryForward,
}

/// Per-deal configuration in force from `effective_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfiguration {
    pub deal_id: String,
    /// Registered variant identifier (e.g. "traditional", "turbo").
    pub variant: String,
    pub effective_from: NaiveDate,
    /// Behaviours added on top of the variant's own flags.
    #[serde(default)]
    pub flags: FeatureFlags,
    #[serde(default)]
    pub parameters: VariantParameters,
    /// Fee lines, in payment order within each class.
    #[serde(default)]
    pub fees: Vec<FeeSpec>,
    /// Include a reserve-account top-up after interest.
    #[serde(default)]
    pub reserve_account: bool,
    #[serde(default)]
    pub residual_routing: ResidualRouting,
    /// Explicit priority of payments replacing the canonical one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_sequence: Option<Vec<PaymentStep>>,
    /// Pay principal even when coverage tests fail.
    #[serde(default)]
    pub gate_override: bool,
}

impl VariantConfiguration {
    /// Minimal configuration for a registered variant with no fees.
    pub fn new(deal_id: impl Into<String>, variant: impl Into<String>, effective_from: NaiveDate) -> Self {
        VariantConfiguration {
            deal_id: deal_id.into(),
            variant: variant.into(),
            effective_from,
            flags: FeatureFlags::default(),
            parameters: VariantParameters::default(),
            fees: Vec::new(),
            reserve_account: false,
            residual_routing: ResidualRouting::Equity,
            custom_sequence: None,
            gate_override: false,
        }
    }

    pub fn fee(&self, name: &str) -> Option<&FeeSpec> {
        self.fees.iter().find(|f| f.name == name)
    }

    pub fn fees_of(&self, class: FeeClass) -> impl Iterator<Item = &FeeSpec> {
        self.fees.iter().filter(move |f| f.class == class)
    }
}

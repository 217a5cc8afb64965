//! Payment amount calculator.
//!
//! Sizes each step independently of the cash actually available: the
//! orchestrator caps the result at the remaining register. Only the escrow
//! hold, residual and carry-forward steps are sized from the remaining
//! cash itself.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::registry::ResolvedParameters;
use crate::config::variant::{FeatureFlags, FeeClass};
use crate::deal::state::DealState;
use crate::deal::tranche::Tranche;
use crate::error::WaterfallError;
use crate::inputs::period::PeriodInputs;
use crate::sequence::step::{HoldReason, PaymentStep, SequencedStep, StepDirective};
use crate::triggers::context::TestType;
use crate::types::{floor_zero, round_currency, Money};
use crate::WaterfallResult;

/// State visible to the calculator at one step.
pub struct CalcContext<'a> {
    /// Deal state at the start of the period.
    pub opening: &'a DealState,
    /// Deal state with this period's earlier steps applied.
    pub working: &'a DealState,
    pub inputs: &'a PeriodInputs,
    pub remaining: Money,
    pub gate_override: bool,
}

/// Sizing of one step, before capping at available cash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmountDue {
    pub amount: Money,
    /// A failing coverage test forced the amount to zero.
    pub trigger_blocked: bool,
    /// What would have been due without gating or suppression.
    pub blocked_amount: Money,
    pub suppressed: bool,
    /// Cure amount reported by the trigger this step satisfies.
    pub cure_amount: Money,
    /// Interest capitalised into the deferred balance instead of paid.
    pub pik_capitalized: Money,
    /// Fee amount pushed to a later period.
    pub deferred_amount: Money,
    /// Escrow paid to equity alongside the residual.
    pub escrow_release: Money,
}

impl AmountDue {
    fn of(amount: Money) -> Self {
        AmountDue {
            amount,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountCalculator {
    flags: FeatureFlags,
    params: ResolvedParameters,
}

impl AmountCalculator {
    pub fn new(flags: FeatureFlags, params: ResolvedParameters) -> Self {
        AmountCalculator { flags, params }
    }

    pub fn amount_due(&self, step: &SequencedStep, ctx: &CalcContext<'_>) -> WaterfallResult<AmountDue> {
        match &step.step {
            PaymentStep::Fee { name, class } => self.fee_due(name, *class, step.directive, ctx),
            PaymentStep::Interest { tranche } => {
                let t = lookup(ctx.working, &step.step, tranche)?;
                let interest = ctx.inputs.interest_for(tranche)?;
                if self.pik_elected(t, ctx.inputs) {
                    Ok(AmountDue {
                        pik_capitalized: interest,
                        ..Default::default()
                    })
                } else {
                    Ok(AmountDue::of(interest))
                }
            }
            PaymentStep::Principal { tranche } => {
                let t = lookup(ctx.working, &step.step, tranche)?;
                let allocation = ctx
                    .inputs
                    .principal_targets
                    .get(tranche)
                    .copied()
                    .unwrap_or(t.current_balance);
                let ungated = t.current_balance.min(allocation);
                let exempt = step.directive == StepDirective::Turbo || ctx.gate_override;
                if !exempt && self.principal_gated(t, ctx) {
                    Ok(AmountDue {
                        trigger_blocked: true,
                        blocked_amount: ungated,
                        ..Default::default()
                    })
                } else {
                    Ok(AmountDue::of(ungated))
                }
            }
            PaymentStep::Cure { tranche, test } => {
                let t = lookup(ctx.working, &step.step, tranche)?;
                match ctx.inputs.triggers.result(tranche, *test) {
                    Some(r) if !r.passed && r.cure_amount > Decimal::ZERO => {
                        let capacity = ctx.working.debt_outstanding_through(t.priority);
                        Ok(AmountDue {
                            amount: r.cure_amount.min(capacity),
                            cure_amount: r.cure_amount,
                            ..Default::default()
                        })
                    }
                    _ => Ok(AmountDue::default()),
                }
            }
            PaymentStep::ReserveFunding => Ok(AmountDue::of(floor_zero(
                ctx.inputs.reserve_target - ctx.working.reserve_balance,
            ))),
            PaymentStep::DeferredInterest { tranche } => {
                let t = lookup(ctx.working, &step.step, tranche)?;
                if self.pik_elected(t, ctx.inputs) {
                    return Ok(AmountDue::default());
                }
                let opening = ctx
                    .opening
                    .tranche(tranche)
                    .map(|o| o.deferred_balance)
                    .unwrap_or(Decimal::ZERO);
                Ok(AmountDue::of(opening.min(t.deferred_balance)))
            }
            PaymentStep::EscrowHold => Ok(match step.directive {
                StepDirective::Hold {
                    reason: HoldReason::DistributionStop,
                } => AmountDue::of(ctx.remaining),
                StepDirective::Hold {
                    reason: HoldReason::BelowHurdle,
                } => AmountDue::of(round_currency(ctx.remaining * self.params.holdback_pct).min(ctx.remaining)),
                _ => AmountDue::default(),
            }),
            PaymentStep::ResidualEquity => Ok(match step.directive {
                StepDirective::Suppressed { .. } => AmountDue {
                    suppressed: true,
                    blocked_amount: ctx.remaining,
                    ..Default::default()
                },
                StepDirective::Release => AmountDue {
                    amount: ctx.remaining,
                    escrow_release: ctx
                        .working
                        .escrow_balance
                        .min(round_currency(ctx.remaining * self.params.catch_up_rate)),
                    ..Default::default()
                },
                _ => AmountDue::of(ctx.remaining),
            }),
            PaymentStep::CarryForward => Ok(AmountDue::of(ctx.remaining)),
        }
    }

    fn fee_due(
        &self,
        name: &str,
        class: FeeClass,
        directive: StepDirective,
        ctx: &CalcContext<'_>,
    ) -> WaterfallResult<AmountDue> {
        let base = ctx.inputs.fee_amount(name)?;
        let amount = if class == FeeClass::Incentive && self.flags.fee_sharing {
            round_currency(base * self.params.fee_share_pct)
        } else {
            base
        };
        Ok(match directive {
            StepDirective::Suppressed { .. } => AmountDue {
                suppressed: true,
                blocked_amount: amount,
                ..Default::default()
            },
            StepDirective::Deferred if class == FeeClass::Incentive => AmountDue {
                deferred_amount: amount,
                ..Default::default()
            },
            _ => AmountDue::of(amount),
        })
    }

    /// Whether this period's interest on `tranche` is capitalised.
    pub fn pik_elected(&self, tranche: &Tranche, inputs: &PeriodInputs) -> bool {
        self.flags.pik_toggle
            && tranche.pik_eligible
            && (inputs.pik_elections.contains(&tranche.id)
                || (self.params.pik_on_ic_failure
                    && inputs.triggers.test_failed(&tranche.id, TestType::InterestCoverage)))
    }

    /// A failing test at this tranche or any more senior one blocks principal.
    pub fn principal_gated(&self, tranche: &Tranche, ctx: &CalcContext<'_>) -> bool {
        ctx.inputs
            .triggers
            .any_failure_through(ctx.opening, tranche.priority)
    }
}

fn lookup<'a>(deal: &'a DealState, step: &PaymentStep, id: &str) -> WaterfallResult<&'a Tranche> {
    deal.tranche(id).ok_or_else(|| WaterfallError::UnknownTranche {
        step: step.to_string(),
        tranche: id.to_string(),
    })
}

//! Per-period sequence rules.
//!
//! Rules run in the fixed order of [`SequenceRule::ORDER`]: gating and
//! removal rules first, relocation rules after. A rule never overwrites a
//! directive set by an earlier rule.

use log::trace;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::registry::ResolvedParameters;
use crate::config::variant::{FeatureFlags, FeeClass};
use crate::deal::state::DealState;
use crate::inputs::period::PeriodInputs;
use crate::sequence::step::{
    HoldReason, PaymentStep, SequencedStep, StepDirective, SuppressionReason,
};
use crate::WaterfallResult;

/// Inputs every rule may consult.
pub struct RuleContext<'a> {
    pub deal: &'a DealState,
    pub inputs: &'a PeriodInputs,
    pub params: &'a ResolvedParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceRule {
    CallProtection,
    DistributionStopper,
    ClawBack,
    Turbo,
    FeeDeferral,
}

impl SequenceRule {
    pub const ORDER: [SequenceRule; 5] = [
        SequenceRule::CallProtection,
        SequenceRule::DistributionStopper,
        SequenceRule::ClawBack,
        SequenceRule::Turbo,
        SequenceRule::FeeDeferral,
    ];

    pub fn enabled_by(&self, flags: &FeatureFlags) -> bool {
        match self {
            SequenceRule::CallProtection => flags.call_protection,
            SequenceRule::DistributionStopper => flags.distribution_stopper,
            SequenceRule::ClawBack => flags.claw_back,
            SequenceRule::Turbo => flags.turbo,
            SequenceRule::FeeDeferral => flags.fee_deferral,
        }
    }

    /// Rules enabled by `flags`, in application order.
    pub fn active(flags: &FeatureFlags) -> Vec<SequenceRule> {
        Self::ORDER
            .iter()
            .copied()
            .filter(|r| r.enabled_by(flags))
            .collect()
    }

    pub fn apply(&self, steps: &mut Vec<SequencedStep>, ctx: &RuleContext<'_>) -> WaterfallResult<()> {
        match self {
            SequenceRule::CallProtection => apply_call_protection(steps, ctx),
            SequenceRule::DistributionStopper => apply_distribution_stopper(steps, ctx),
            SequenceRule::ClawBack => apply_claw_back(steps, ctx)?,
            SequenceRule::Turbo => apply_turbo(steps, ctx),
            SequenceRule::FeeDeferral => apply_fee_deferral(steps, ctx)?,
        }
        Ok(())
    }
}

/// Whether the payment date falls inside the non-call period with no override.
pub fn call_protected(ctx: &RuleContext<'_>) -> bool {
    match ctx.params.non_call_end {
        Some(end) => ctx.inputs.payment_date < end && !ctx.inputs.call_override,
        None => false,
    }
}

pub fn distributions_stopped(ctx: &RuleContext<'_>) -> bool {
    ctx.inputs.triggers.coverage_buffer() < ctx.params.stopper_threshold
}

/// Turbo needs every reported OC ratio above the threshold.
pub fn turbo_active(ctx: &RuleContext<'_>) -> bool {
    ctx.inputs
        .triggers
        .min_oc_ratio()
        .map(|r| r > ctx.params.turbo_threshold)
        .unwrap_or(false)
}

fn apply_call_protection(steps: &mut Vec<SequencedStep>, ctx: &RuleContext<'_>) {
    if !call_protected(ctx) {
        return;
    }
    let before = steps.len();
    steps.retain(|s| !matches!(s.step, PaymentStep::Principal { .. }));
    trace!(
        "call protection: removed {} principal step(s) before {:?}",
        before - steps.len(),
        ctx.params.non_call_end
    );
}

fn apply_distribution_stopper(steps: &mut [SequencedStep], ctx: &RuleContext<'_>) {
    if !distributions_stopped(ctx) {
        return;
    }
    trace!(
        "distribution stopper: buffer {} below {}",
        ctx.inputs.triggers.coverage_buffer(),
        ctx.params.stopper_threshold
    );
    for s in steps.iter_mut() {
        if s.directive != StepDirective::Normal {
            continue;
        }
        match s.step {
            PaymentStep::ResidualEquity
            | PaymentStep::Fee {
                class: FeeClass::Incentive,
                ..
            } => {
                s.directive = StepDirective::Suppressed {
                    reason: SuppressionReason::DistributionStop,
                }
            }
            PaymentStep::EscrowHold => {
                s.directive = StepDirective::Hold {
                    reason: HoldReason::DistributionStop,
                }
            }
            _ => {}
        }
    }
}

fn apply_claw_back(steps: &mut [SequencedStep], ctx: &RuleContext<'_>) -> WaterfallResult<()> {
    let performance = ctx
        .inputs
        .require_equity_performance("Claw-back deals need trailing equity performance.")?;
    let below_hurdle = performance < ctx.params.hurdle_rate;
    let hold_in_force = steps.iter().any(|s| {
        s.step == PaymentStep::EscrowHold && matches!(s.directive, StepDirective::Hold { .. })
    });
    trace!(
        "claw-back: performance {} vs hurdle {}, escrow {}",
        performance,
        ctx.params.hurdle_rate,
        ctx.deal.escrow_balance
    );
    for s in steps.iter_mut() {
        if s.directive != StepDirective::Normal {
            continue;
        }
        match s.step {
            PaymentStep::EscrowHold if below_hurdle => {
                s.directive = StepDirective::Hold {
                    reason: HoldReason::BelowHurdle,
                }
            }
            PaymentStep::ResidualEquity
                if !below_hurdle && !hold_in_force && ctx.deal.escrow_balance > Decimal::ZERO =>
            {
                s.directive = StepDirective::Release
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply_turbo(steps: &mut Vec<SequencedStep>, ctx: &RuleContext<'_>) {
    if !turbo_active(ctx) {
        return;
    }
    let principal: Vec<SequencedStep> = steps
        .iter()
        .filter(|s| matches!(s.step, PaymentStep::Principal { .. }))
        .cloned()
        .collect();
    for mut p in principal {
        let Some(id) = p.step.tranche().map(str::to_string) else {
            continue;
        };
        if interest_position(steps, &id).is_none() {
            continue;
        }
        steps.retain(|s| !s.step.is_principal_for(&id));
        let Some(anchor) = interest_position(steps, &id) else {
            continue;
        };
        let mut insert_at = anchor + 1;
        while insert_at < steps.len()
            && matches!(&steps[insert_at].step, PaymentStep::Cure { tranche, .. } if *tranche == id)
        {
            insert_at += 1;
        }
        if p.directive == StepDirective::Normal {
            p.directive = StepDirective::Turbo;
        }
        steps.insert(insert_at, p);
    }
    trace!("turbo: principal relocated behind interest");
}

fn interest_position(steps: &[SequencedStep], id: &str) -> Option<usize> {
    steps
        .iter()
        .position(|s| matches!(&s.step, PaymentStep::Interest { tranche } if tranche == id))
}

fn apply_fee_deferral(steps: &mut Vec<SequencedStep>, ctx: &RuleContext<'_>) -> WaterfallResult<()> {
    let performance = ctx
        .inputs
        .require_equity_performance("Fee-deferral deals need trailing equity performance.")?;
    if performance >= ctx.params.min_equity_performance {
        return Ok(());
    }
    let is_subordinated_fee = |s: &SequencedStep| {
        s.step.is_fee_of(FeeClass::Junior) || s.step.is_fee_of(FeeClass::Incentive)
    };
    let mut moved: Vec<SequencedStep> = steps.iter().filter(|s| is_subordinated_fee(s)).cloned().collect();
    steps.retain(|s| !is_subordinated_fee(s));
    for s in moved.iter_mut() {
        if s.step.is_fee_of(FeeClass::Incentive) && s.directive == StepDirective::Normal {
            s.directive = StepDirective::Deferred;
        }
    }
    let terminal_block = steps
        .iter()
        .position(|s| s.step == PaymentStep::EscrowHold || s.step.is_absorbing())
        .unwrap_or(steps.len());
    trace!(
        "fee deferral: performance {} below {}, {} fee step(s) relocated",
        performance,
        ctx.params.min_equity_performance,
        moved.len()
    );
    steps.splice(terminal_block..terminal_block, moved);
    Ok(())
}

//! Canonical priority of payments and load-time layout checks.
//!
//! Traditional order:
//! senior fees -> interest by seniority (cures behind their tranche's
//! interest) -> reserve funding -> principal by seniority -> junior fees ->
//! incentive fees -> deferred interest by seniority -> escrow hold ->
//! residual equity (or carry-forward).

use std::collections::HashSet;

use crate::config::variant::{FeatureFlags, FeeClass, ResidualRouting, VariantConfiguration};
use crate::deal::state::DealState;
use crate::error::WaterfallError;
use crate::sequence::step::PaymentStep;
use crate::triggers::context::TriggerContext;
use crate::WaterfallResult;

/// The configured layout before any per-period cure insertion or rules.
pub fn layout_steps(
    config: &VariantConfiguration,
    deal: &DealState,
    flags: &FeatureFlags,
) -> Vec<PaymentStep> {
    if deal.tranches.is_empty() {
        return Vec::new();
    }
    match &config.custom_sequence {
        Some(custom) => custom.clone(),
        None => canonical_steps(config, deal, flags),
    }
}

/// Build the traditional sequence from the deal's tranches and fee lines.
pub fn canonical_steps(
    config: &VariantConfiguration,
    deal: &DealState,
    flags: &FeatureFlags,
) -> Vec<PaymentStep> {
    let debt = deal.debt_tranches();
    let mut steps = Vec::new();

    let fee_steps = |class: FeeClass| {
        config.fees_of(class).map(|f| PaymentStep::Fee {
            name: f.name.clone(),
            class: f.class,
        })
    };

    steps.extend(fee_steps(FeeClass::Senior));
    steps.extend(debt.iter().map(|t| PaymentStep::Interest {
        tranche: t.id.clone(),
    }));
    if config.reserve_account {
        steps.push(PaymentStep::ReserveFunding);
    }
    steps.extend(debt.iter().map(|t| PaymentStep::Principal {
        tranche: t.id.clone(),
    }));
    steps.extend(fee_steps(FeeClass::Junior));
    steps.extend(fee_steps(FeeClass::Incentive));
    steps.extend(
        debt.iter()
            .filter(|t| t.pik_eligible)
            .map(|t| PaymentStep::DeferredInterest {
                tranche: t.id.clone(),
            }),
    );
    match config.residual_routing {
        ResidualRouting::Equity => {
            if flags.needs_escrow() {
                steps.push(PaymentStep::EscrowHold);
            }
            steps.push(PaymentStep::ResidualEquity);
        }
        ResidualRouting::CarryForward => steps.push(PaymentStep::CarryForward),
    }
    steps
}

/// Insert a cure step behind each breached tranche's interest step.
///
/// Only failing results with a positive cure amount get a step; a tranche
/// with several breached tests gets its OC cure before its IC cure. Cure
/// steps already present in the layout are kept where they are. A cure with
/// neither an explicit step nor an interest step to follow is rejected.
pub fn insert_cures(
    steps: &mut Vec<PaymentStep>,
    deal: &DealState,
    triggers: &TriggerContext,
) -> WaterfallResult<()> {
    let mut cures: Vec<_> = triggers
        .cures_needed()
        .filter_map(|r| deal.tranche(&r.tranche).map(|t| (t, r.test)))
        .filter(|(t, _)| !t.is_equity)
        .collect();
    cures.sort_by_key(|(t, test)| (t.priority, *test));

    for (tranche, test) in cures {
        let cure = PaymentStep::Cure {
            tranche: tranche.id.clone(),
            test,
        };
        if steps.contains(&cure) {
            continue;
        }
        let anchor = steps.iter().position(
            |s| matches!(s, PaymentStep::Interest { tranche: t } if *t == tranche.id),
        );
        let Some(pos) = anchor else {
            return Err(WaterfallError::input(
                format!("triggers.{}.{}", tranche.id, test.code()),
                "cure amount reported but the sequence has no interest or cure step for the tranche",
            ));
        };
        let mut insert_at = pos + 1;
        while insert_at < steps.len()
            && matches!(&steps[insert_at], PaymentStep::Cure { tranche: t, .. } if *t == tranche.id)
        {
            insert_at += 1;
        }
        steps.insert(insert_at, cure);
    }
    Ok(())
}

/// Load-time checks on a layout: every tranche and fee reference resolves,
/// nothing repeats, and the last step absorbs the residual.
pub fn validate_layout(
    steps: &[PaymentStep],
    config: &VariantConfiguration,
    deal: &DealState,
    flags: &FeatureFlags,
) -> WaterfallResult<()> {
    let last = match steps.last() {
        Some(s) => s,
        None => {
            return Err(WaterfallError::config(
                "custom_sequence",
                "Sequence must contain at least one step.",
            ))
        }
    };
    if !last.is_absorbing() {
        return Err(WaterfallError::config(
            "custom_sequence",
            format!("Sequence must end with a cash-absorbing step, found '{}'.", last),
        ));
    }
    if steps.iter().filter(|s| s.is_absorbing()).count() > 1 {
        return Err(WaterfallError::config(
            "custom_sequence",
            "Only the final step may absorb residual cash.",
        ));
    }

    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step) {
            return Err(WaterfallError::config(
                "custom_sequence",
                format!("Step '{}' appears more than once.", step),
            ));
        }
        if let Some(id) = step.tranche() {
            let tranche = deal.tranche(id).ok_or_else(|| WaterfallError::UnknownTranche {
                step: step.to_string(),
                tranche: id.to_string(),
            })?;
            if tranche.is_equity {
                return Err(WaterfallError::config(
                    "custom_sequence",
                    format!("Step '{}' cannot reference the equity tranche.", step),
                ));
            }
            if matches!(step, PaymentStep::DeferredInterest { .. }) && !tranche.pik_eligible {
                return Err(WaterfallError::config(
                    "custom_sequence",
                    format!("Step '{}' references a tranche that is not PIK-eligible.", step),
                ));
            }
        }
        if let PaymentStep::Fee { name, class } = step {
            match config.fee(name) {
                Some(spec) if spec.class == *class => {}
                Some(_) => {
                    return Err(WaterfallError::config(
                        format!("fees.{}", name),
                        "Fee class in the sequence differs from the fee definition.",
                    ))
                }
                None => {
                    return Err(WaterfallError::config(
                        format!("fees.{}", name),
                        "Sequence references an undefined fee.",
                    ))
                }
            }
        }
    }

    let has_hold = steps.contains(&PaymentStep::EscrowHold);
    if flags.needs_escrow() {
        let n = steps.len();
        let ends_with_hold =
            n >= 2 && steps[n - 2] == PaymentStep::EscrowHold && steps[n - 1] == PaymentStep::ResidualEquity;
        if !ends_with_hold {
            return Err(WaterfallError::config(
                "residual_routing",
                "Claw-back and distribution-stopper deals must end with escrow_hold then residual_equity.",
            ));
        }
    } else if has_hold {
        return Err(WaterfallError::config(
            "custom_sequence",
            "escrow_hold requires the claw_back or distribution_stopper flag.",
        ));
    }
    Ok(())
}

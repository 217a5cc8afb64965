//! Execution orchestrator.
//!
//! Drives one period's waterfall: resolves the configuration, fetches the
//! step sequence once, then walks it step by step threading the remaining
//! cash register through the loop. Payments are applied to a private copy
//! of the deal state, so a failed run leaves the caller's state untouched
//! and nothing partial ever escapes.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::calculator::amount::CalcContext;
use crate::config::registry::{ResolvedVariant, VariantRegistry};
use crate::config::variant::VariantConfiguration;
use crate::cure::escrow::EscrowAccount;
use crate::cure::ledger::CureLedger;
use crate::deal::state::DealState;
use crate::deal::tranche::Tranche;
use crate::engine::execution::{
    ExecutionParts, ExecutionStatus, PaymentRecord, TrancheSummary, WaterfallExecution,
};
use crate::error::WaterfallError;
use crate::inputs::period::PeriodInputs;
use crate::sequence::step::{PaymentStep, SequencedStep};
use crate::types::{safe_div, Money, TrancheId};
use crate::WaterfallResult;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Entry point for running waterfalls against a variant registry.
#[derive(Debug, Clone, Default)]
pub struct WaterfallEngine {
    registry: VariantRegistry,
}

impl WaterfallEngine {
    pub fn new(registry: VariantRegistry) -> Self {
        WaterfallEngine { registry }
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    /// Run one period. `deal` is the prior period's ending state and is
    /// never modified; the new state is in the returned execution.
    pub fn run_waterfall(
        &self,
        deal: &DealState,
        config: &VariantConfiguration,
        inputs: &PeriodInputs,
    ) -> WaterfallResult<WaterfallExecution> {
        self.execute(deal, config, inputs, 0, None)
    }

    /// The sequence a run would execute, with each step's directive.
    pub fn preview_sequence(
        &self,
        deal: &DealState,
        config: &VariantConfiguration,
        inputs: &PeriodInputs,
    ) -> WaterfallResult<Vec<SequencedStep>> {
        let resolved = self.prepare(deal, config, inputs)?;
        resolved.sequence(deal, inputs)
    }

    pub(crate) fn execute(
        &self,
        deal: &DealState,
        config: &VariantConfiguration,
        inputs: &PeriodInputs,
        revision: u32,
        supersedes: Option<String>,
    ) -> WaterfallResult<WaterfallExecution> {
        let result = self.prepare(deal, config, inputs).and_then(|resolved| {
            WaterfallRun::new(&resolved, deal, inputs)?.finish(revision, supersedes)
        });
        match &result {
            Ok(execution) => info!(
                "{}: period {} completed under '{}', {} paid across {} steps",
                execution.execution_id(),
                execution.period(),
                execution.variant(),
                execution.total_paid(),
                execution.records().len()
            ),
            Err(e) => warn!("{}: period {} rejected: {}", deal.deal_id, inputs.period, e),
        }
        result
    }

    /// Every check that does not need the step loop.
    fn prepare(
        &self,
        deal: &DealState,
        config: &VariantConfiguration,
        inputs: &PeriodInputs,
    ) -> WaterfallResult<ResolvedVariant> {
        let resolved = self.registry.load(config, deal)?;
        let expected = deal.period + 1;
        if inputs.period != expected {
            return Err(WaterfallError::PeriodOrder {
                expected,
                actual: inputs.period,
            });
        }
        if config.effective_from > inputs.payment_date {
            return Err(WaterfallError::config(
                "effective_from",
                format!(
                    "Configuration takes effect {}, after payment date {}.",
                    config.effective_from, inputs.payment_date
                ),
            ));
        }
        inputs.validate(deal)?;
        Ok(resolved)
    }
}

// ---------------------------------------------------------------------------
// Run state machine
// ---------------------------------------------------------------------------

/// A single in-flight execution: `NotStarted -> Running(i) -> Completed`,
/// or `Failed` on the first error.
pub struct WaterfallRun<'a> {
    resolved: &'a ResolvedVariant,
    opening: &'a DealState,
    inputs: &'a PeriodInputs,
    steps: Vec<SequencedStep>,
    working: DealState,
    beginning: Money,
    remaining: Money,
    records: Vec<PaymentRecord>,
    cures: CureLedger,
    escrow: EscrowAccount,
    cure_paydown: BTreeMap<TrancheId, Money>,
    status: ExecutionStatus,
}

impl<'a> WaterfallRun<'a> {
    pub fn new(
        resolved: &'a ResolvedVariant,
        opening: &'a DealState,
        inputs: &'a PeriodInputs,
    ) -> WaterfallResult<Self> {
        let steps = resolved.sequence(opening, inputs)?;
        for step in &steps {
            if let PaymentStep::Principal { tranche } = &step.step {
                if !inputs.triggers.has_tranche(tranche) {
                    return Err(WaterfallError::input(
                        format!("triggers.{}", tranche),
                        "No coverage test result for a tranche with a principal step.",
                    ));
                }
            }
        }
        let beginning = inputs.collection_amount + opening.carried_cash;
        let mut working = opening.clone();
        working.carried_cash = Decimal::ZERO;
        Ok(WaterfallRun {
            resolved,
            opening,
            inputs,
            records: Vec::with_capacity(steps.len()),
            steps,
            working,
            beginning,
            remaining: beginning,
            cures: CureLedger::new(),
            escrow: EscrowAccount::open(opening.escrow_balance),
            cure_paydown: BTreeMap::new(),
            status: ExecutionStatus::NotStarted,
        })
    }

    pub fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    pub fn steps(&self) -> &[SequencedStep] {
        &self.steps
    }

    pub fn remaining(&self) -> Money {
        self.remaining
    }

    pub fn records(&self) -> &[PaymentRecord] {
        &self.records
    }

    /// Execute the next step. Returns `false` once every step has a record.
    pub fn advance(&mut self) -> WaterfallResult<bool> {
        let index = match &self.status {
            ExecutionStatus::NotStarted => 0,
            ExecutionStatus::Running { step_index } => *step_index,
            ExecutionStatus::Completed | ExecutionStatus::Failed { .. } => {
                return Err(WaterfallError::InvariantViolation(
                    "Run has already reached a terminal state.".into(),
                ))
            }
        };
        if index >= self.steps.len() {
            self.status = ExecutionStatus::Running { step_index: index };
            return Ok(false);
        }
        self.status = ExecutionStatus::Running { step_index: index };
        match self.apply_step(index) {
            Ok(()) => {
                self.status = ExecutionStatus::Running {
                    step_index: index + 1,
                };
                Ok(true)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Run the remaining steps, check the money invariants and build the
    /// finalized execution.
    pub fn finish(mut self, revision: u32, supersedes: Option<String>) -> WaterfallResult<WaterfallExecution> {
        while self.advance()? {}
        if let Err(e) = self.check_invariants() {
            return Err(self.fail(e));
        }
        self.working.escrow_balance = self.escrow.balance();
        self.working.period = self.inputs.period;
        self.working.last_payment_date = Some(self.inputs.payment_date);
        self.status = ExecutionStatus::Completed;

        let tranche_summaries = self.summarize();
        Ok(WaterfallExecution::finalize(ExecutionParts {
            deal_id: self.opening.deal_id.clone(),
            variant: self.resolved.variant.clone(),
            period: self.inputs.period,
            payment_date: self.inputs.payment_date,
            revision,
            supersedes,
            collection_amount: self.inputs.collection_amount,
            beginning_cash: self.opening.carried_cash,
            ending_remaining: self.remaining,
            escrow_held: self.escrow.held_this_period(),
            escrow_released: self.escrow.released_this_period(),
            active_flags: self
                .resolved
                .flags
                .active()
                .into_iter()
                .map(String::from)
                .collect(),
            tranche_summaries,
            records: self.records,
            ending_state: self.working,
        }))
    }

    fn fail(&mut self, error: WaterfallError) -> WaterfallError {
        self.status = ExecutionStatus::Failed {
            reason: error.to_string(),
        };
        error
    }

    fn apply_step(&mut self, index: usize) -> WaterfallResult<()> {
        let step = self.steps[index].clone();
        let label = step.step.to_string();
        let due = {
            let ctx = CalcContext {
                opening: self.opening,
                working: &self.working,
                inputs: self.inputs,
                remaining: self.remaining,
                gate_override: self.resolved.configuration.gate_override,
            };
            self.resolved.calculator.amount_due(&step, &ctx)?
        };
        if due.amount < Decimal::ZERO {
            return Err(WaterfallError::NegativeAmountDue {
                step: label,
                amount: due.amount,
            });
        }

        let paid = due.amount.min(self.remaining);
        self.remaining -= paid;
        let shortfall = due.amount - paid;
        let mut pik_capitalized = due.pik_capitalized;
        let mut escrow_released = Decimal::ZERO;

        match &step.step {
            PaymentStep::Fee { name, .. } => {
                if due.deferred_amount > Decimal::ZERO {
                    *self.working.deferred_fees.entry(name.clone()).or_default() += due.deferred_amount;
                    debug!("{}: {} deferred", label, due.deferred_amount);
                }
            }
            PaymentStep::Interest { tranche } => {
                let t = tranche_mut(&mut self.working, &step.step, tranche)?;
                if pik_capitalized.is_zero() && t.pik_eligible && shortfall > Decimal::ZERO {
                    pik_capitalized = shortfall;
                }
                t.deferred_balance += pik_capitalized;
            }
            PaymentStep::Principal { tranche } => {
                tranche_mut(&mut self.working, &step.step, tranche)?.current_balance -= paid;
            }
            PaymentStep::Cure { tranche, test } => {
                if due.cure_amount > Decimal::ZERO {
                    self.cures.record(tranche, *test, due.cure_amount, index)?;
                }
                self.apply_cure_paydown(&step.step, tranche, paid)?;
            }
            PaymentStep::ReserveFunding => self.working.reserve_balance += paid,
            PaymentStep::DeferredInterest { tranche } => {
                tranche_mut(&mut self.working, &step.step, tranche)?.deferred_balance -= paid;
            }
            PaymentStep::EscrowHold => {
                if paid > Decimal::ZERO {
                    self.escrow.hold(paid)?;
                    self.working.escrow_balance = self.escrow.balance();
                    warn!("{}: {} withheld into escrow ({:?})", self.opening.deal_id, paid, step.directive);
                }
            }
            PaymentStep::ResidualEquity => {
                if due.escrow_release > Decimal::ZERO {
                    self.escrow.release(due.escrow_release)?;
                    self.working.escrow_balance = self.escrow.balance();
                    escrow_released = due.escrow_release;
                }
            }
            PaymentStep::CarryForward => self.working.carried_cash = paid,
        }

        if due.suppressed {
            warn!("{}: {} suppressed, {} withheld", self.opening.deal_id, label, due.blocked_amount);
        }
        if paid > Decimal::ZERO && self.remaining.is_zero() && index + 1 < self.steps.len() {
            warn!(
                "{}: cash exhausted at step {} ({}); {} later steps receive nothing",
                self.opening.deal_id,
                index,
                label,
                self.steps.len() - index - 1
            );
        }
        debug!(
            "{}: [{}] {} due {} paid {} remaining {}",
            self.opening.deal_id, index, label, due.amount, paid, self.remaining
        );

        self.records.push(PaymentRecord {
            sequence_index: index,
            tranche: step.step.tranche().map(String::from),
            step: step.step,
            directive: step.directive,
            amount_due: due.amount,
            amount_paid: paid,
            shortfall,
            trigger_blocked: due.trigger_blocked,
            blocked_amount: due.blocked_amount,
            suppressed: due.suppressed,
            cure_amount: due.cure_amount,
            pik_capitalized,
            deferred_amount: due.deferred_amount,
            escrow_released,
            remaining_after: self.remaining,
        });
        Ok(())
    }

    /// Pay a cure down across debt at or above the cured class, senior first.
    fn apply_cure_paydown(&mut self, step: &PaymentStep, tranche: &str, amount: Money) -> WaterfallResult<()> {
        let limit = tranche_mut(&mut self.working, step, tranche)?.priority;
        let order: Vec<TrancheId> = self
            .working
            .debt_tranches()
            .into_iter()
            .filter(|t| t.priority <= limit)
            .map(|t| t.id.clone())
            .collect();
        let mut left = amount;
        for id in order {
            if left.is_zero() {
                break;
            }
            let t = tranche_mut(&mut self.working, step, &id)?;
            let applied = left.min(t.current_balance);
            t.current_balance -= applied;
            left -= applied;
            *self.cure_paydown.entry(id).or_default() += applied;
        }
        if left > Decimal::ZERO {
            return Err(WaterfallError::InvariantViolation(format!(
                "{} cure of {} exceeds outstanding senior debt",
                step, amount
            )));
        }
        Ok(())
    }

    fn check_invariants(&self) -> WaterfallResult<()> {
        if self.records.len() != self.steps.len() {
            return Err(WaterfallError::InvariantViolation(format!(
                "{} records for {} steps",
                self.records.len(),
                self.steps.len()
            )));
        }
        if !self.remaining.is_zero() {
            return Err(WaterfallError::InvariantViolation(format!(
                "{} of cash left unabsorbed after the terminal step",
                self.remaining
            )));
        }
        let paid: Money = self.records.iter().map(|r| r.amount_paid).sum();
        if paid + self.remaining != self.beginning {
            return Err(WaterfallError::InvariantViolation(format!(
                "paid {} + remaining {} != beginning register {}",
                paid, self.remaining, self.beginning
            )));
        }
        for t in &self.working.tranches {
            if t.current_balance < Decimal::ZERO || t.deferred_balance < Decimal::ZERO {
                return Err(WaterfallError::InvariantViolation(format!(
                    "tranche {} ended with a negative balance",
                    t.id
                )));
            }
        }
        Ok(())
    }

    fn summarize(&self) -> Vec<TrancheSummary> {
        let equity = self.opening.equity_tranche().map(|t| t.id.as_str());
        self.opening
            .tranches_by_priority()
            .into_iter()
            .map(|open| {
                let close = self.working.tranche(&open.id).unwrap_or(open);
                let mut summary = TrancheSummary {
                    tranche: open.id.clone(),
                    opening_balance: open.current_balance,
                    closing_balance: close.current_balance,
                    opening_deferred: open.deferred_balance,
                    closing_deferred: close.deferred_balance,
                    cure_paydown: self.cure_paydown.get(&open.id).copied().unwrap_or_default(),
                    factor: safe_div(close.current_balance, open.original_balance).round_dp(6),
                    ..Default::default()
                };
                for r in self.records.iter().filter(|r| r.tranche.as_deref() == Some(open.id.as_str())) {
                    match r.step {
                        PaymentStep::Interest { .. } => {
                            summary.interest_paid += r.amount_paid;
                            summary.pik_capitalized += r.pik_capitalized;
                        }
                        PaymentStep::Principal { .. } => summary.principal_paid += r.amount_paid,
                        PaymentStep::DeferredInterest { .. } => summary.deferred_interest_paid += r.amount_paid,
                        _ => {}
                    }
                }
                if equity == Some(open.id.as_str()) {
                    summary.distributions = self
                        .records
                        .iter()
                        .filter(|r| r.step == PaymentStep::ResidualEquity)
                        .map(|r| r.amount_paid + r.escrow_released)
                        .sum();
                }
                summary
            })
            .collect()
    }
}

fn tranche_mut<'d>(deal: &'d mut DealState, step: &PaymentStep, id: &str) -> WaterfallResult<&'d mut Tranche> {
    deal.tranche_mut(id).ok_or_else(|| WaterfallError::UnknownTranche {
        step: step.to_string(),
        tranche: id.to_string(),
    })
}

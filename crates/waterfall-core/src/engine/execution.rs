//! Finalized execution results.
//!
//! A [`WaterfallExecution`] is only ever produced by a completed run; its
//! fields are private and exposed through read-only accessors so reporting
//! layers cannot alter a persisted result.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::deal::state::DealState;
use crate::sequence::step::{PaymentStep, StepDirective};
use crate::types::{Money, Rate, TrancheId};

/// One line of the payment report. Produced exactly once per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub sequence_index: usize,
    pub step: PaymentStep,
    #[serde(default)]
    pub directive: StepDirective,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tranche: Option<TrancheId>,
    pub amount_due: Money,
    pub amount_paid: Money,
    /// Due minus paid: the part cash did not reach.
    pub shortfall: Money,
    pub trigger_blocked: bool,
    /// Amount a gate or suppression withheld from `amount_due`.
    pub blocked_amount: Money,
    pub suppressed: bool,
    pub cure_amount: Money,
    /// Interest added to the tranche's deferred balance.
    pub pik_capitalized: Money,
    /// Fee amount accrued to the deferred-fee ledger.
    pub deferred_amount: Money,
    /// Escrow paid out alongside this step, outside the cash register.
    pub escrow_released: Money,
    pub remaining_after: Money,
}

/// Orchestrator state machine. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionStatus {
    NotStarted,
    Running { step_index: usize },
    Completed,
    Failed { reason: String },
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed { .. })
    }
}

/// Movement on one tranche over the period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrancheSummary {
    pub tranche: TrancheId,
    pub opening_balance: Money,
    pub closing_balance: Money,
    pub opening_deferred: Money,
    pub closing_deferred: Money,
    pub interest_paid: Money,
    pub principal_paid: Money,
    pub cure_paydown: Money,
    pub deferred_interest_paid: Money,
    pub pik_capitalized: Money,
    /// Residual and escrow releases, for the equity class.
    pub distributions: Money,
    /// Closing balance over original balance (pool factor), 6 dp.
    pub factor: Rate,
}

/// The complete, immutable result of one period's waterfall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallExecution {
    execution_id: String,
    deal_id: String,
    variant: String,
    period: u32,
    payment_date: NaiveDate,
    revision: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supersedes: Option<String>,
    collection_amount: Money,
    /// Cash carried in from the prior period's suspense account.
    beginning_cash: Money,
    records: Vec<PaymentRecord>,
    ending_remaining: Money,
    escrow_held: Money,
    escrow_released: Money,
    active_flags: Vec<String>,
    tranche_summaries: Vec<TrancheSummary>,
    ending_state: DealState,
    status: ExecutionStatus,
}

pub(crate) struct ExecutionParts {
    pub deal_id: String,
    pub variant: String,
    pub period: u32,
    pub payment_date: NaiveDate,
    pub revision: u32,
    pub supersedes: Option<String>,
    pub collection_amount: Money,
    pub beginning_cash: Money,
    pub records: Vec<PaymentRecord>,
    pub ending_remaining: Money,
    pub escrow_held: Money,
    pub escrow_released: Money,
    pub active_flags: Vec<String>,
    pub tranche_summaries: Vec<TrancheSummary>,
    pub ending_state: DealState,
}

/// Deterministic id: `{deal}-P{period:04}-R{revision}`.
pub fn execution_id(deal_id: &str, period: u32, revision: u32) -> String {
    format!("{}-P{:04}-R{}", deal_id, period, revision)
}

impl WaterfallExecution {
    pub(crate) fn finalize(parts: ExecutionParts) -> Self {
        WaterfallExecution {
            execution_id: execution_id(&parts.deal_id, parts.period, parts.revision),
            deal_id: parts.deal_id,
            variant: parts.variant,
            period: parts.period,
            payment_date: parts.payment_date,
            revision: parts.revision,
            supersedes: parts.supersedes,
            collection_amount: parts.collection_amount,
            beginning_cash: parts.beginning_cash,
            records: parts.records,
            ending_remaining: parts.ending_remaining,
            escrow_held: parts.escrow_held,
            escrow_released: parts.escrow_released,
            active_flags: parts.active_flags,
            tranche_summaries: parts.tranche_summaries,
            ending_state: parts.ending_state,
            status: ExecutionStatus::Completed,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn deal_id(&self) -> &str {
        &self.deal_id
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn payment_date(&self) -> NaiveDate {
        self.payment_date
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn supersedes(&self) -> Option<&str> {
        self.supersedes.as_deref()
    }

    pub fn collection_amount(&self) -> Money {
        self.collection_amount
    }

    pub fn beginning_cash(&self) -> Money {
        self.beginning_cash
    }

    /// Register at the first step: collections plus carried cash.
    pub fn beginning_remaining(&self) -> Money {
        self.collection_amount + self.beginning_cash
    }

    pub fn records(&self) -> &[PaymentRecord] {
        &self.records
    }

    pub fn ending_remaining(&self) -> Money {
        self.ending_remaining
    }

    pub fn escrow_held(&self) -> Money {
        self.escrow_held
    }

    pub fn escrow_released(&self) -> Money {
        self.escrow_released
    }

    pub fn active_flags(&self) -> &[String] {
        &self.active_flags
    }

    pub fn tranche_summaries(&self) -> &[TrancheSummary] {
        &self.tranche_summaries
    }

    pub fn tranche_summary(&self, tranche: &str) -> Option<&TrancheSummary> {
        self.tranche_summaries.iter().find(|s| s.tranche == tranche)
    }

    /// Deal state after this period, the next period's opening state.
    pub fn ending_state(&self) -> &DealState {
        &self.ending_state
    }

    pub fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    pub fn total_paid(&self) -> Money {
        self.records.iter().map(|r| r.amount_paid).sum()
    }

    pub fn total_blocked(&self) -> Money {
        self.records
            .iter()
            .filter(|r| r.trigger_blocked)
            .map(|r| r.blocked_amount)
            .sum()
    }

    /// First record matching the step label, e.g. `"principal:A"`.
    pub fn record(&self, label: &str) -> Option<&PaymentRecord> {
        self.records.iter().find(|r| r.step.to_string() == label)
    }

    pub fn paid_to(&self, label: &str) -> Money {
        self.record(label).map(|r| r.amount_paid).unwrap_or(Decimal::ZERO)
    }
}

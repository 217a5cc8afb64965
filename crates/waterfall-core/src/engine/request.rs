//! Request/response wrappers for callers outside the crate (CLI, bindings).
//!
//! Each entry point takes a single serde input and returns the standard
//! [`ComputationOutput`] envelope. Timing lives only in the envelope's
//! metadata; the wrapped [`WaterfallExecution`] is bit-identical across
//! re-runs.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::registry::VariantRegistry;
use crate::config::variant::{VariantConfiguration, VariantParameters};
use crate::deal::state::DealState;
use crate::engine::execution::WaterfallExecution;
use crate::engine::orchestrator::WaterfallEngine;
use crate::engine::timeline::DealTimeline;
use crate::inputs::period::PeriodInputs;
use crate::inputs::providers::{ConfigurationStore, InMemoryConfigStore};
use crate::sequence::step::{PaymentStep, StepDirective};
use crate::types::{with_metadata, ComputationOutput};
use crate::WaterfallResult;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One period against one deal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub deal: DealState,
    pub config: VariantConfiguration,
    pub inputs: PeriodInputs,
}

/// Consecutive periods; each uses the configuration in force on its
/// payment date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineRequest {
    pub deal: DealState,
    pub configurations: Vec<VariantConfiguration>,
    pub periods: Vec<PeriodInputs>,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewStep {
    pub index: usize,
    pub label: String,
    pub step: PaymentStep,
    pub directive: StepDirective,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePreview {
    pub variant: String,
    pub active_flags: Vec<String>,
    pub steps: Vec<PreviewStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineOutput {
    pub executions: Vec<WaterfallExecution>,
    pub ending_state: DealState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantInfo {
    pub id: String,
    pub description: String,
    pub flags: Vec<String>,
    pub defaults: VariantParameters,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn run_period(
    engine: &WaterfallEngine,
    request: &RunRequest,
) -> WaterfallResult<ComputationOutput<WaterfallExecution>> {
    let start = Instant::now();
    let execution = engine.run_waterfall(&request.deal, &request.config, &request.inputs)?;
    let warnings = execution_warnings(&execution);
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Priority-of-payments waterfall: sequential cash allocation with coverage-test gating",
        &serde_json::json!({
            "deal_id": request.deal.deal_id,
            "variant": request.config.variant,
            "period": request.inputs.period,
            "payment_date": request.inputs.payment_date.to_string(),
            "collection_amount": request.inputs.collection_amount.to_string(),
        }),
        warnings,
        elapsed,
        execution,
    ))
}

pub fn preview_sequence(
    engine: &WaterfallEngine,
    request: &RunRequest,
) -> WaterfallResult<ComputationOutput<SequencePreview>> {
    let start = Instant::now();
    let resolved = engine.registry().load(&request.config, &request.deal)?;
    let steps = engine.preview_sequence(&request.deal, &request.config, &request.inputs)?;
    let preview = SequencePreview {
        variant: resolved.variant.clone(),
        active_flags: resolved.flags.active().into_iter().map(String::from).collect(),
        steps: steps
            .into_iter()
            .enumerate()
            .map(|(index, s)| PreviewStep {
                index,
                label: s.step.to_string(),
                step: s.step,
                directive: s.directive,
            })
            .collect(),
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Step sequence after structural layout and variant rules",
        &serde_json::json!({
            "deal_id": request.deal.deal_id,
            "variant": request.config.variant,
            "period": request.inputs.period,
        }),
        Vec::new(),
        elapsed,
        preview,
    ))
}

pub fn run_timeline(
    engine: &WaterfallEngine,
    request: &TimelineRequest,
) -> WaterfallResult<ComputationOutput<TimelineOutput>> {
    let start = Instant::now();
    let store: InMemoryConfigStore = request.configurations.iter().cloned().collect();
    let mut timeline = DealTimeline::new(request.deal.clone());
    let mut warnings = Vec::new();
    for inputs in &request.periods {
        let config = store.configuration_for(&request.deal.deal_id, inputs.payment_date)?;
        let execution = timeline.run_next(engine, &config, inputs)?;
        warnings.extend(
            execution_warnings(execution)
                .into_iter()
                .map(|w| format!("period {}: {}", inputs.period, w)),
        );
    }
    let output = TimelineOutput {
        executions: timeline.executions().cloned().collect(),
        ending_state: timeline.current_state().clone(),
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sequential period waterfalls, each opening on the prior period's ending state",
        &serde_json::json!({
            "deal_id": request.deal.deal_id,
            "num_periods": request.periods.len(),
            "num_configurations": request.configurations.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

pub fn list_variants(registry: &VariantRegistry) -> Vec<VariantInfo> {
    registry
        .definitions()
        .map(|(id, def)| VariantInfo {
            id: id.to_string(),
            description: def.description.clone(),
            flags: def.flags.active().into_iter().map(String::from).collect(),
            defaults: def.defaults.clone(),
        })
        .collect()
}

/// Notable outcomes worth surfacing next to the payment report.
pub fn execution_warnings(execution: &WaterfallExecution) -> Vec<String> {
    let mut warnings = Vec::new();
    for r in execution.records() {
        if r.trigger_blocked && !r.blocked_amount.is_zero() {
            warnings.push(format!("{} blocked by failing coverage test ({} withheld)", r.step, r.blocked_amount));
        }
        if r.suppressed {
            warnings.push(format!("{} suppressed by distribution stopper", r.step));
        }
        if matches!(r.step, PaymentStep::Interest { .. }) && !r.shortfall.is_zero() {
            warnings.push(format!("{} short by {}", r.step, r.shortfall));
        }
    }
    if !execution.escrow_held().is_zero() {
        warnings.push(format!("{} withheld into escrow", execution.escrow_held()));
    }
    warnings
}

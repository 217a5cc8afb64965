//! Priority-ordered cash distribution ("waterfall") engine for
//! structured-finance vehicles.
//!
//! A period's collected cash is run through an ordered list of payment
//! steps (fees, tranche interest and principal, reserve funding, cures,
//! escrow and residual equity). The ordering, gating and sizing of those
//! steps depend on the deal's configured variant and feature flags.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

pub mod calculator;
pub mod config;
pub mod cure;
pub mod deal;
pub mod engine;
pub mod error;
pub mod inputs;
pub mod sequence;
pub mod triggers;
pub mod types;

pub use config::registry::{ResolvedVariant, VariantRegistry};
pub use config::variant::{FeatureFlags, VariantConfiguration, VariantParameters};
pub use deal::state::DealState;
pub use deal::tranche::Tranche;
pub use engine::execution::{ExecutionStatus, PaymentRecord, TrancheSummary, WaterfallExecution};
pub use engine::orchestrator::WaterfallEngine;
pub use engine::timeline::DealTimeline;
pub use error::WaterfallError;
pub use inputs::period::PeriodInputs;
pub use sequence::step::PaymentStep;
pub use triggers::context::{TestType, TriggerContext, TriggerResult};
pub use types::*;

/// Standard result type for all waterfall operations
pub type WaterfallResult<T> = Result<T, WaterfallError>;

//! Payment steps: the lines of a priority of payments.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::variant::FeeClass;
use crate::triggers::context::TestType;
use crate::types::TrancheId;

/// One line in the priority sequence. References at most one tranche.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentStep {
    Fee { name: String, class: FeeClass },
    Interest { tranche: TrancheId },
    ReserveFunding,
    Cure { tranche: TrancheId, test: TestType },
    Principal { tranche: TrancheId },
    /// Cash payment of previously capitalised interest.
    DeferredInterest { tranche: TrancheId },
    /// Escrow-hold decision ahead of the residual.
    EscrowHold,
    ResidualEquity,
    /// Suspense account absorbing the residual into next period's register.
    CarryForward,
}

impl PaymentStep {
    pub fn tranche(&self) -> Option<&str> {
        match self {
            PaymentStep::Interest { tranche }
            | PaymentStep::Cure { tranche, .. }
            | PaymentStep::Principal { tranche }
            | PaymentStep::DeferredInterest { tranche } => Some(tranche),
            _ => None,
        }
    }

    /// Terminal steps absorb every unit of remaining cash.
    pub fn is_absorbing(&self) -> bool {
        matches!(self, PaymentStep::ResidualEquity | PaymentStep::CarryForward)
    }

    pub fn is_principal_for(&self, id: &str) -> bool {
        matches!(self, PaymentStep::Principal { tranche } if tranche == id)
    }

    pub fn is_fee_of(&self, class: FeeClass) -> bool {
        matches!(self, PaymentStep::Fee { class: c, .. } if *c == class)
    }
}

impl fmt::Display for PaymentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStep::Fee { name, .. } => write!(f, "fee:{}", name),
            PaymentStep::Interest { tranche } => write!(f, "interest:{}", tranche),
            PaymentStep::ReserveFunding => write!(f, "reserve_funding"),
            PaymentStep::Cure { tranche, test } => write!(f, "cure:{}:{}", tranche, test.code()),
            PaymentStep::Principal { tranche } => write!(f, "principal:{}", tranche),
            PaymentStep::DeferredInterest { tranche } => write!(f, "deferred_interest:{}", tranche),
            PaymentStep::EscrowHold => write!(f, "escrow_hold"),
            PaymentStep::ResidualEquity => write!(f, "residual_equity"),
            PaymentStep::CarryForward => write!(f, "carry_forward"),
        }
    }
}

/// Why a step's amount is forced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    DistributionStop,
}

/// Why the escrow-hold step withholds cash this period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    BelowHurdle,
    DistributionStop,
}

/// Per-period instruction attached to a step by the sequence rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDirective {
    #[default]
    Normal,
    Suppressed { reason: SuppressionReason },
    /// Principal moved up behind its tranche's interest; not gated.
    Turbo,
    /// Fee relocated and, for incentive fees, deferred to a later period.
    Deferred,
    Hold { reason: HoldReason },
    /// Residual paid together with a catch-up release of escrow.
    Release,
}

/// A step placed in this period's sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedStep {
    pub step: PaymentStep,
    #[serde(default)]
    pub directive: StepDirective,
}

impl SequencedStep {
    pub fn normal(step: PaymentStep) -> Self {
        SequencedStep {
            step,
            directive: StepDirective::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_labels() {
        let s = PaymentStep::Cure {
            tranche: "B".into(),
            test: TestType::Overcollateralization,
        };
        assert_eq!(s.to_string(), "cure:B:oc");
        assert_eq!(s.tranche(), Some("B"));
        assert_eq!(PaymentStep::ReserveFunding.tranche(), None);
    }

    #[test]
    fn test_absorbing_steps() {
        assert!(PaymentStep::ResidualEquity.is_absorbing());
        assert!(PaymentStep::CarryForward.is_absorbing());
        assert!(!PaymentStep::EscrowHold.is_absorbing());
    }

    #[test]
    fn test_step_json_shape() {
        let json = r#"{"type": "fee", "name": "trustee", "class": "senior"}"#;
        let step: PaymentStep = serde_json::from_str(json).unwrap();
        assert!(step.is_fee_of(FeeClass::Senior));
        let back = serde_json::to_string(&PaymentStep::Principal { tranche: "A".into() }).unwrap();
        assert_eq!(back, r#"{"type":"principal","tranche":"A"}"#);
    }
}

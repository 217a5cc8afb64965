//! Step sequence strategy.
//!
//! A pure function of (configuration, deal state, period inputs) to the
//! ordered steps of one period. The variant is a closed set of rules
//! switched on by [`FeatureFlags`]; combinations are applied in the fixed
//! order of [`SequenceRule::ORDER`].

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::registry::ResolvedParameters;
use crate::config::variant::{FeatureFlags, VariantConfiguration};
use crate::deal::state::DealState;
use crate::inputs::period::PeriodInputs;
use crate::sequence::base;
use crate::sequence::rules::{RuleContext, SequenceRule};
use crate::sequence::step::SequencedStep;
use crate::WaterfallResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStrategy {
    flags: FeatureFlags,
    params: ResolvedParameters,
}

impl SequenceStrategy {
    pub fn new(flags: FeatureFlags, params: ResolvedParameters) -> Self {
        SequenceStrategy { flags, params }
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    pub fn rules(&self) -> Vec<SequenceRule> {
        SequenceRule::active(&self.flags)
    }

    /// Ordered steps for this period. Empty only for a deal with no tranches.
    pub fn sequence(
        &self,
        config: &VariantConfiguration,
        deal: &DealState,
        inputs: &PeriodInputs,
    ) -> WaterfallResult<Vec<SequencedStep>> {
        let mut layout = base::layout_steps(config, deal, &self.flags);
        if layout.is_empty() {
            return Ok(Vec::new());
        }
        base::insert_cures(&mut layout, deal, &inputs.triggers)?;
        let mut steps: Vec<SequencedStep> = layout.into_iter().map(SequencedStep::normal).collect();

        let ctx = RuleContext {
            deal,
            inputs,
            params: &self.params,
        };
        for rule in self.rules() {
            rule.apply(&mut steps, &ctx)?;
        }
        debug!(
            "deal {} period {}: {} step(s), rules {:?}",
            deal.deal_id,
            inputs.period,
            steps.len(),
            self.rules()
        );
        Ok(steps)
    }
}

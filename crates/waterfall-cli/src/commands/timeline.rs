use clap::Args;
use log::debug;
use serde_json::Value;

use waterfall_core::engine::request::{self, TimelineRequest};
use waterfall_core::WaterfallEngine;

use crate::input;

/// Arguments for a multi-period run
#[derive(Args)]
pub struct TimelineArgs {
    /// Path to JSON or YAML request ({deal, configurations, periods})
    #[arg(long)]
    pub input: Option<String>,

    /// Print only the final deal state
    #[arg(long)]
    pub state_only: bool,
}

pub fn run_timeline(args: TimelineArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let timeline_request: TimelineRequest = input::read_request(args.input.as_deref(), "timeline run")?;
    debug!(
        "running {} period(s) for deal {} with {} configuration(s)",
        timeline_request.periods.len(),
        timeline_request.deal.deal_id,
        timeline_request.configurations.len()
    );
    let output = request::run_timeline(&WaterfallEngine::default(), &timeline_request)?;
    if args.state_only {
        return Ok(serde_json::to_value(&output.result.ending_state)?);
    }
    Ok(serde_json::to_value(output)?)
}

use clap::Args;
use log::debug;
use serde_json::Value;

use waterfall_core::engine::request::{self, RunRequest};
use waterfall_core::WaterfallEngine;

use crate::input;

/// Arguments for a sequence preview
#[derive(Args)]
pub struct SequenceArgs {
    /// Path to JSON or YAML request ({deal, config, inputs})
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_sequence(args: SequenceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let run_request: RunRequest = input::read_request(args.input.as_deref(), "sequence preview")?;
    debug!(
        "previewing deal {} period {} under '{}'",
        run_request.deal.deal_id, run_request.inputs.period, run_request.config.variant
    );
    let output = request::preview_sequence(&WaterfallEngine::default(), &run_request)?;
    Ok(serde_json::to_value(output)?)
}

use clap::Args;
use log::{debug, info};
use rust_decimal::Decimal;
use serde_json::Value;

use waterfall_core::engine::request::{self, RunRequest};
use waterfall_core::WaterfallEngine;

use crate::input;

/// Arguments for a single-period run
#[derive(Args)]
pub struct RunArgs {
    /// Path to JSON or YAML request ({deal, config, inputs})
    #[arg(long)]
    pub input: Option<String>,

    /// Override the period's collection amount
    #[arg(long)]
    pub collection: Option<Decimal>,

    /// Print only the payment records
    #[arg(long)]
    pub records_only: bool,
}

pub fn run_waterfall(args: RunArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut run_request: RunRequest = input::read_request(args.input.as_deref(), "waterfall run")?;
    if let Some(collection) = args.collection {
        info!(
            "collection amount overridden: {} -> {}",
            run_request.inputs.collection_amount, collection
        );
        run_request.inputs.collection_amount = collection;
    }
    debug!(
        "running deal {} period {} under '{}'",
        run_request.deal.deal_id, run_request.inputs.period, run_request.config.variant
    );
    let output = request::run_period(&WaterfallEngine::default(), &run_request)?;
    if args.records_only {
        return Ok(serde_json::to_value(output.result.records())?);
    }
    Ok(serde_json::to_value(output)?)
}

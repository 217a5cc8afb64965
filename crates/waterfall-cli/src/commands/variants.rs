use serde_json::Value;

use waterfall_core::engine::request;
use waterfall_core::VariantRegistry;

pub fn run_variants() -> Result<Value, Box<dyn std::error::Error>> {
    let variants = request::list_variants(&VariantRegistry::default());
    Ok(serde_json::to_value(variants)?)
}

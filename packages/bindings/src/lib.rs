use napi::Result as NapiResult;
use napi_derive::napi;

use waterfall_core::engine::request::{self, RunRequest, TimelineRequest};
use waterfall_core::{VariantRegistry, WaterfallEngine};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

#[napi]
pub fn run_waterfall(input_json: String) -> NapiResult<String> {
    let input: RunRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = request::run_period(&WaterfallEngine::default(), &input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn preview_sequence(input_json: String) -> NapiResult<String> {
    let input: RunRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        request::preview_sequence(&WaterfallEngine::default(), &input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn run_timeline(input_json: String) -> NapiResult<String> {
    let input: TimelineRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = request::run_timeline(&WaterfallEngine::default(), &input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[napi]
pub fn list_variants() -> NapiResult<String> {
    serde_json::to_string(&request::list_variants(&VariantRegistry::default())).map_err(to_napi_error)
}

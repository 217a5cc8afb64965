pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Short label for a serialized payment step (`{"type": "interest", "tranche": "A"}`
/// becomes `interest:A`). `None` for anything that is not a step.
pub fn step_label(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    let kind = map.get("type")?.as_str()?;
    let mut label = kind.to_string();
    for key in ["name", "tranche", "test"] {
        if let Some(Value::String(part)) = map.get(key) {
            label.push(':');
            label.push_str(part);
        }
    }
    Some(label)
}

/// Scalar rendering shared by the table and CSV writers.
pub fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(_) => step_label(value)
            .or_else(|| directive_label(value))
            .unwrap_or_else(|| serde_json::to_string(value).unwrap_or_default()),
    }
}

fn directive_label(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    let kind = map.get("kind")?.as_str()?;
    Some(match map.get("reason").and_then(|r| r.as_str()) {
        Some(reason) => format!("{}({})", kind, reason),
        None => kind.to_string(),
    })
}

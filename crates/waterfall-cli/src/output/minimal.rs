use serde_json::Value;

use super::scalar;

/// Print just the key answer from the output.
///
/// Executions print one `label paid` line per record, previews the step
/// labels in order; anything else falls back to a priority field.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Some(Value::Array(records)) = result_obj.get("records") {
        for r in records {
            let step = r.get("step").map(scalar).unwrap_or_default();
            let paid = r.get("amount_paid").map(scalar).unwrap_or_default();
            println!("{} {}", step, paid);
        }
        return;
    }

    if let Some(Value::Array(steps)) = result_obj.get("steps") {
        let labels: Vec<String> = steps
            .iter()
            .filter_map(|s| s.get("label").map(scalar))
            .collect();
        println!("{}", labels.join(" > "));
        return;
    }

    let priority_keys = ["execution_id", "ending_state", "id"];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", scalar(val));
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, scalar(val));
            return;
        }
    }

    if let Value::Array(items) = result_obj {
        for item in items {
            match item.get("id") {
                Some(id) => println!("{}", scalar(id)),
                None => println!("{}", scalar(item)),
            }
        }
        return;
    }

    println!("{}", scalar(result_obj));
}

use serde_json::Value;
use std::io;

use super::scalar;

/// Write output as CSV to stdout. Executions write one row per payment
/// record, previews one row per step.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result {
        Value::Object(map) => {
            if let Some(Value::Array(rows)) = map.get("records").or_else(|| map.get("steps")) {
                write_array_csv(&mut wtr, rows);
            } else if let Some(Value::Array(executions)) = map.get("executions") {
                write_execution_records(&mut wtr, executions);
            } else {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &scalar(val)]);
                }
            }
        }
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&scalar(result)]);
        }
    }

    let _ = wtr.flush();
}

/// All periods' records in one sheet, keyed by execution id.
fn write_execution_records(wtr: &mut csv::Writer<io::StdoutLock<'_>>, executions: &[Value]) {
    let mut rows = Vec::new();
    for exec in executions {
        let id = exec.get("execution_id").cloned().unwrap_or(Value::Null);
        if let Some(Value::Array(records)) = exec.get("records") {
            for record in records {
                if let Value::Object(fields) = record {
                    let mut row = serde_json::Map::new();
                    row.insert("execution_id".into(), id.clone());
                    row.extend(fields.clone());
                    rows.push(Value::Object(row));
                }
            }
        }
    }
    write_array_csv(wtr, &rows);
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(scalar).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&scalar(item)]);
        }
    }
}

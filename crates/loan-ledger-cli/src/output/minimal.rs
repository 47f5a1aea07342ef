use serde_json::Value;

use super::unwrap_envelope;

/// Print just the headline figure of the output.
///
/// Looks for well-known ledger fields in priority order, then falls back to
/// the first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = unwrap_envelope(value);

    let priority_keys = [
        "installment",
        "total_amount",
        "total_arrears",
        "arrears",
        "outstanding_balance",
        "loans_opened",
        "status",
    ];

    match result_obj {
        Value::Object(map) => {
            for key in &priority_keys {
                if let Some(val) = map.get(*key) {
                    if !val.is_null() {
                        println!("{}", format_minimal(val));
                        return;
                    }
                }
            }
            if let Some((key, val)) = map.iter().next() {
                println!("{}: {}", key, format_minimal(val));
            }
        }
        // Lists print their length.
        Value::Array(arr) => println!("{}", arr.len()),
        other => println!("{}", format_minimal(other)),
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

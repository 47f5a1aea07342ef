use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{format_scalar, unwrap_envelope, ROW_FIELDS};

/// Format output as tables using the tabled crate.
///
/// Scalar fields go into a Field/Value table; each row collection
/// (schedule entries, recovery records, scan results) gets its own table.
pub fn print_table(value: &Value) {
    match unwrap_envelope(value) {
        Value::Object(map) => print_object(map),
        Value::Array(arr) => print_rows(arr),
        other => println!("{}", format_scalar(other)),
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if is_row_collection(key, val) {
            continue;
        }
        match val {
            // Nested breakdowns (e.g. a schedule's pricing) are flattened one level.
            Value::Object(inner) => {
                for (inner_key, inner_val) in inner {
                    builder.push_record([format!("{key}.{inner_key}"), format_scalar(inner_val)]);
                }
            }
            _ => builder.push_record([key.clone(), format_scalar(val)]),
        }
    }
    println!("{}", Table::from(builder));

    for field in ROW_FIELDS {
        if let Some(Value::Array(rows)) = map.get(field) {
            println!("\n{}:", field);
            print_rows(rows);
        }
    }
}

fn is_row_collection(key: &str, value: &Value) -> bool {
    ROW_FIELDS.contains(&key) && matches!(value, Value::Array(_))
}

fn print_rows(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(headers.clone());

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_scalar).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_scalar(item));
        }
    }
}

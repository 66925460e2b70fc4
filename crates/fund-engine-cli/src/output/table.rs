use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{cell, ROW_FIELDS};

/// Scalar result fields as a Field/Value table, then one table per row
/// collection (tiers, cohorts, metrics...), then warnings.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(envelope) => match envelope.get("result") {
            Some(Value::Object(result)) => print_envelope(result, envelope),
            _ => print_fields(envelope),
        },
        Value::Array(rows) => print_rows(rows),
        _ => println!("{}", cell(value)),
    }
}

fn print_envelope(result: &Map<String, Value>, envelope: &Map<String, Value>) {
    print_fields(result);

    for name in ROW_FIELDS {
        let rows = result.get(name).or_else(|| envelope.get(name));
        if let Some(Value::Array(rows)) = rows {
            if rows.iter().any(Value::is_object) {
                println!("\n{}:", title(name));
                print_rows(rows);
            }
        }
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(methodology)) = envelope.get("methodology") {
        println!("\nMethodology: {}", methodology);
    }
}

/// Field/Value table of everything that is not a row collection.
fn print_fields(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if ROW_FIELDS.contains(&key.as_str()) && val.is_array() {
            continue;
        }
        builder.push_record([key.as_str(), &cell(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_rows(rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        for row in rows {
            println!("{}", cell(row));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for row in rows.iter().filter_map(Value::as_object) {
        builder.push_record(
            headers
                .iter()
                .map(|h| row.get(h.as_str()).map(cell).unwrap_or_default()),
        );
    }
    println!("{}", Table::from(builder));
}

fn title(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

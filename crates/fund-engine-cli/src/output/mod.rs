pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Result fields holding row collections, in the order they are rendered.
pub(crate) const ROW_FIELDS: [&str; 7] = [
    "tiers",
    "cohorts",
    "metrics",
    "breakdown",
    "allocations",
    "timeline",
    "results",
];

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Render a scalar for a single cell. Money and rates arrive as strings.
pub(crate) fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "N/A".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// First row collection found in the result object or at the envelope top level.
pub(crate) fn primary_rows<'a>(
    result: Option<&'a Map<String, Value>>,
    envelope: &'a Map<String, Value>,
) -> Option<(&'static str, &'a Vec<Value>)> {
    ROW_FIELDS.iter().find_map(|name| {
        result
            .and_then(|r| r.get(*name))
            .or_else(|| envelope.get(*name))
            .and_then(Value::as_array)
            .filter(|rows| rows.iter().all(Value::is_object) && !rows.is_empty())
            .map(|rows| (*name, rows))
    })
}

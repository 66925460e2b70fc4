use serde_json::Value;

/// Print the headline number of a result: NAV per share, vested fraction,
/// GP share of a distribution, remaining carry, IRR, HHI, or funds computed.
/// Falls back to the first result field.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = [
        "nav_per_share",
        "vested_fraction",
        "gp_amount",
        "remaining_carry",
        "irr",
        "hhi",
        "succeeded",
    ];

    if let Value::Object(map) = result_obj {
        // Null answers (undefined IRR) fall through to the next key
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        // Fall back to first field
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    // Not an object, just print directly
    println!("{}", format_minimal(result_obj));
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

use serde_json::{Map, Value};
use std::io;

use super::{cell, primary_rows};

/// CSV to stdout. Results carrying a row collection (waterfall tiers, cohorts,
/// concentration metrics, batch rows) are written as that table; anything
/// else becomes two-column field,value rows.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let written = match value {
        Value::Object(envelope) => {
            let result = envelope.get("result").and_then(Value::as_object);
            match primary_rows(result, envelope) {
                Some((_, rows)) => write_rows(&mut wtr, rows),
                None => write_fields(&mut wtr, result.unwrap_or(envelope)),
            }
        }
        Value::Array(rows) => write_rows(&mut wtr, rows),
        _ => wtr.write_record([cell(value)]),
    };

    if let Err(e) = written.and_then(|_| wtr.flush().map_err(csv::Error::from)) {
        eprintln!("CSV write error: {}", e);
    }
}

fn write_fields<W: io::Write>(wtr: &mut csv::Writer<W>, map: &Map<String, Value>) -> csv::Result<()> {
    wtr.write_record(["field", "value"])?;
    for (key, val) in map {
        wtr.write_record([key.as_str(), &cell(val)])?;
    }
    Ok(())
}

fn write_rows<W: io::Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) -> csv::Result<()> {
    let Some(Value::Object(first)) = rows.first() else {
        for row in rows {
            wtr.write_record([cell(row)])?;
        }
        return Ok(());
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    wtr.write_record(&headers)?;
    for row in rows.iter().filter_map(Value::as_object) {
        let record: Vec<String> = headers
            .iter()
            .map(|h| row.get(*h).map(cell).unwrap_or_default())
            .collect();
        wtr.write_record(&record)?;
    }
    Ok(())
}

use serde_json::Value;
use std::io::{self, Read};

/// Piped JSON on stdin, if any. An interactive terminal or blank input is
/// `None` so the caller can ask for `--input` instead of blocking.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    match buffer.trim() {
        "" => Ok(None),
        trimmed => serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|e| format!("Failed to parse stdin: {}", e).into()),
    }
}

pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Load a typed input from `--input <file.json>`, falling back to piped stdin.
pub fn read_input<T: DeserializeOwned>(
    path: Option<&str>,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        tracing::debug!(path, "reading input file");
        file::read_json(path)
    } else if let Some(data) = stdin::read_stdin()? {
        tracing::debug!("reading input from stdin");
        Ok(serde_json::from_value(data)?)
    } else {
        Err("--input <file.json> or stdin required".into())
    }
}

pub mod file;
pub mod stdin;

use log::debug;
use serde::de::DeserializeOwned;

/// Read a request from `--input <file>` or, failing that, piped stdin.
pub fn read_request<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        file::read_document(path)
    } else if let Some(data) = stdin::read_stdin()? {
        debug!("{} request read from stdin", what);
        Ok(serde_json::from_value(data)?)
    } else {
        Err(format!("--input <file.json|file.yaml> or stdin required for {}", what).into())
    }
}

use serde::de::DeserializeOwned;
use std::fs;

use crate::error::Result;

/// Reads `file_path` into a string, logging instead of failing. Handy for
/// the demo binary where a missing file just means "nothing to submit".
pub fn get_json_as_str(file_path: &str) -> Option<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Some(content),
        Err(e) => {
            log::error!("Could not read '{}': {}", file_path, e);
            None
        }
    }
}

/// Parses a JSON file into a given type `T`.
///
/// Errors are converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let data = fs::read_to_string(file_path)?;
    let parsed: T = serde_json::from_str(&data)?;
    Ok(parsed)
}

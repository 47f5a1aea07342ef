pub mod csv_in;
pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// JSON from `--input <file>`, else from piped stdin, else `None`.
pub fn read_json_input<T: DeserializeOwned>(path: Option<&str>) -> Result<Option<T>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Some(file::read_json(path)?)),
        None => stdin::read_stdin(),
    }
}

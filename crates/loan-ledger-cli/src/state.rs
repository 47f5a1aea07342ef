use std::fs;
use std::path::Path;

use loan_ledger_core::book::BookSnapshot;
use loan_ledger_core::{EngineConfig, LoanBook};

use crate::input;

/// Load the book persisted at `path`.
pub fn load_book(path: &str, config: &EngineConfig) -> Result<LoanBook, Box<dyn std::error::Error>> {
    let snapshot: BookSnapshot = input::file::read_json(path)?;
    Ok(LoanBook::restore(config.clone(), snapshot)?)
}

/// Load the book at `path`, or start an empty one if the file does not exist yet.
pub fn load_or_create_book(path: &str, config: &EngineConfig) -> Result<LoanBook, Box<dyn std::error::Error>> {
    if Path::new(path).exists() {
        load_book(path, config)
    } else {
        tracing::info!(path, "state file not found, starting an empty book");
        Ok(LoanBook::new(config.clone())?)
    }
}

/// Persist the book to `path`, replacing the previous file only once the
/// new contents are fully written.
pub fn save_book(path: &str, book: &LoanBook) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = book.snapshot()?;
    let json = serde_json::to_string_pretty(&snapshot)?;
    let tmp = format!("{path}.tmp");
    fs::write(&tmp, json).map_err(|e| format!("Failed to write '{}': {}", tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| format!("Failed to replace '{}': {}", path, e))?;
    Ok(())
}

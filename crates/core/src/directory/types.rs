//! Types for client directory lookups.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A client known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Canonical client code used in folder ids (e.g. "0001").
    pub code: String,
    pub display_name: String,
}

/// One row of the directory file.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryEntry {
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    /// Company tax id in any punctuation (only digits are kept).
    #[serde(default)]
    pub tax_id: Option<String>,
}

/// Errors loading the directory table.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read client directory {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse client directory: {0}")]
    Parse(String),
}

/// Read-only client lookup, shared across concurrent pipeline runs.
pub trait ClientDirectory: Send + Sync {
    /// Case-insensitive exact match on the company name.
    fn find_by_name(&self, name: &str) -> Option<Client>;

    /// Match on the client code.
    fn find_by_code(&self, code: &str) -> Option<Client>;

    /// Match on the tax id, ignoring punctuation.
    fn find_by_tax_id(&self, _tax_id: &str) -> Option<Client> {
        None
    }
}

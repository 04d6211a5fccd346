//! In-memory client table loaded from JSON.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use super::{Client, ClientDirectory, DirectoryEntry, DirectoryError};
use crate::config::is_numeric_code;

/// Directory backed by an immutable in-memory index.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    by_name: HashMap<String, Client>,
    by_code: HashMap<String, Client>,
    by_tax_id: HashMap<String, Client>,
}

fn name_key(name: &str) -> String {
    name.trim().to_uppercase()
}

fn tax_id_key(tax_id: &str) -> String {
    tax_id.chars().filter(|c| c.is_ascii_digit()).collect()
}

impl StaticDirectory {
    /// Directory with no clients.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the index from entries. Entries without a numeric code are
    /// skipped; on duplicate names, codes or tax ids the first entry wins.
    pub fn from_entries(entries: Vec<DirectoryEntry>) -> Self {
        let mut directory = Self::default();

        for entry in entries {
            let code = match entry.code.as_deref().map(str::trim) {
                Some(code) if !code.is_empty() => code.to_string(),
                _ => {
                    warn!(name = %entry.name, "Skipping directory entry without a client code");
                    continue;
                }
            };
            if !is_numeric_code(&code) {
                warn!(name = %entry.name, code = %code, "Skipping directory entry with a non-numeric client code");
                continue;
            }

            let client = Client {
                code: code.clone(),
                display_name: entry.name.trim().to_string(),
            };

            directory
                .by_name
                .entry(name_key(&entry.name))
                .or_insert_with(|| client.clone());
            directory
                .by_code
                .entry(code)
                .or_insert_with(|| client.clone());

            if let Some(tax_id) = entry.tax_id.as_deref() {
                let key = tax_id_key(tax_id);
                if !key.is_empty() {
                    directory.by_tax_id.entry(key).or_insert(client);
                }
            }
        }

        directory
    }

    /// Parse a JSON array of entries.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let entries: Vec<DirectoryEntry> =
            serde_json::from_str(json).map_err(|e| DirectoryError::Parse(e.to_string()))?;
        Ok(Self::from_entries(entries))
    }

    /// Load the table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let json = std::fs::read_to_string(path).map_err(|e| DirectoryError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let directory = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            clients = directory.len(),
            "Loaded client directory"
        );
        Ok(directory)
    }

    /// Number of distinct client codes.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

impl ClientDirectory for StaticDirectory {
    fn find_by_name(&self, name: &str) -> Option<Client> {
        if name.trim().is_empty() {
            return None;
        }
        self.by_name.get(&name_key(name)).cloned()
    }

    fn find_by_code(&self, code: &str) -> Option<Client> {
        self.by_code.get(code.trim()).cloned()
    }

    fn find_by_tax_id(&self, tax_id: &str) -> Option<Client> {
        let key = tax_id_key(tax_id);
        if key.is_empty() {
            return None;
        }
        self.by_tax_id.get(&key).cloned()
    }
}

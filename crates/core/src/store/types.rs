//! Consolidated case records and folder identifiers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::Payload;

/// Largest sequence that fits the five-digit folder suffix.
pub const MAX_SEQUENCE: u32 = 99_999;

static FOLDER_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d{5})$").expect("folder id pattern is valid")
});

/// Errors from the case store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("case not found: {0}")]
    NotFound(String),

    /// Concurrent allocation collided with another writer.
    #[error("allocation conflict: {0}")]
    Conflict(String),

    #[error("folder sequence exhausted for prefix {0}")]
    SequenceExhausted(String),

    #[error("invalid folder id: {0}")]
    InvalidFolderId(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Human-readable folder identifier: `<client>.<module>.<sequence:05>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderId {
    client_code: String,
    module_code: String,
    sequence: u32,
}

impl FolderId {
    pub fn new(client_code: &str, module_code: &str, sequence: u32) -> Result<Self, StoreError> {
        let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if !numeric(client_code) || !numeric(module_code) {
            return Err(StoreError::InvalidFolderId(format!(
                "{}.{}: codes must be numeric",
                client_code, module_code
            )));
        }
        if sequence == 0 {
            return Err(StoreError::InvalidFolderId(
                "sequence starts at 1".to_string(),
            ));
        }
        if sequence > MAX_SEQUENCE {
            return Err(StoreError::SequenceExhausted(prefix(client_code, module_code)));
        }
        Ok(Self {
            client_code: client_code.to_string(),
            module_code: module_code.to_string(),
            sequence,
        })
    }

    /// First id after `max_sequence` (the largest already allocated, if any).
    pub fn next_after(
        client_code: &str,
        module_code: &str,
        max_sequence: Option<u32>,
    ) -> Result<Self, StoreError> {
        let next = max_sequence.unwrap_or(0).saturating_add(1);
        Self::new(client_code, module_code, next)
    }

    pub fn client_code(&self) -> &str {
        &self.client_code
    }

    pub fn module_code(&self) -> &str {
        &self.module_code
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// `<client>.<module>.` prefix shared by every id in the same sequence.
    pub fn prefix(&self) -> String {
        prefix(&self.client_code, &self.module_code)
    }
}

fn prefix(client_code: &str, module_code: &str) -> String {
    format!("{}.{}.", client_code, module_code)
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{:05}",
            self.client_code, self.module_code, self.sequence
        )
    }
}

impl FromStr for FolderId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = FOLDER_ID_PATTERN
            .captures(s)
            .ok_or_else(|| StoreError::InvalidFolderId(s.to_string()))?;
        let sequence = caps[3]
            .parse::<u32>()
            .map_err(|_| StoreError::InvalidFolderId(s.to_string()))?;
        Self::new(&caps[1], &caps[2], sequence)
    }
}

/// Case classification labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub side: String,
    pub risk: String,
}

/// Classification values observed during one run; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationPatch {
    pub category: Option<String>,
    pub side: Option<String>,
    pub risk: Option<String>,
}

impl ClassificationPatch {
    /// Fill unset labels from `base`.
    pub fn resolve(&self, base: &Classification) -> Classification {
        Classification {
            category: self.category.clone().unwrap_or_else(|| base.category.clone()),
            side: self.side.clone().unwrap_or_else(|| base.side.clone()),
            risk: self.risk.clone().unwrap_or_else(|| base.risk.clone()),
        }
    }
}

/// Everything one pipeline run writes for a case.
#[derive(Debug, Clone)]
pub struct CaseUpdate {
    pub target_id: String,
    pub client_code: String,
    pub client_name: String,
    pub module_code: String,
    /// New aggregate, if any source reported one.
    pub aggregate_value: Option<f64>,
    /// Labels used when the record is created.
    pub initial_classification: Classification,
    /// Labels observed this run.
    pub classification: ClassificationPatch,
    /// Payload per source key; each replaces only its own key.
    pub payloads: BTreeMap<String, Payload>,
}

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub folder_id: String,
    /// True when this upsert created the record.
    pub created: bool,
}

/// The durable consolidated record for one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub target_id: String,
    pub folder_id: String,
    pub client_code: String,
    pub client_name: String,
    pub module_code: String,
    pub aggregate_value: Option<f64>,
    pub classification: Classification,
    pub per_source_payload: BTreeMap<String, Payload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseRecord {
    /// New record for a first-time upsert.
    pub fn create(update: &CaseUpdate, folder_id: &FolderId, now: DateTime<Utc>) -> Self {
        Self {
            target_id: update.target_id.clone(),
            folder_id: folder_id.to_string(),
            client_code: update.client_code.clone(),
            client_name: update.client_name.clone(),
            module_code: update.module_code.clone(),
            aggregate_value: update.aggregate_value,
            classification: update
                .classification
                .resolve(&update.initial_classification),
            per_source_payload: update.payloads.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a later update. Folder id, codes and `created_at` never change.
    pub fn apply(&mut self, update: &CaseUpdate, now: DateTime<Utc>) {
        self.client_name = update.client_name.clone();
        if update.aggregate_value.is_some() {
            self.aggregate_value = update.aggregate_value;
        }
        self.classification = update.classification.resolve(&self.classification);
        for (source, payload) in &update.payloads {
            self.per_source_payload
                .insert(source.clone(), payload.clone());
        }
        self.updated_at = now;
    }
}

/// Trait for consolidated-record storage.
///
/// `upsert` is the only write path. Implementations must make folder
/// allocation linearizable per `(client_code, module_code)`.
pub trait CaseStore: Send + Sync {
    /// Insert or merge the record for `update.target_id`, allocating a folder id
    /// on first insert. All writes of one call commit together or not at all.
    fn upsert(&self, update: &CaseUpdate) -> Result<UpsertOutcome, StoreError>;

    /// Get a record by target id.
    fn get(&self, target_id: &str) -> Result<Option<CaseRecord>, StoreError>;

    /// All records in one `(client_code, module_code)` sequence, by sequence.
    fn list_by_prefix(
        &self,
        client_code: &str,
        module_code: &str,
    ) -> Result<Vec<CaseRecord>, StoreError>;
}

//! Types for the pipeline orchestrator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::is_numeric_code;
use crate::source::{normalize_key, Credentials, SourceResult};
use crate::store::StoreError;

/// Errors returned by `run_pipeline`.
///
/// Per-source failures never show up here; they are reported inline in
/// `ConsolidatedSummary::sources_results`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Request rejected before any source was dispatched.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persisting the consolidated record failed. Nothing was written.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// One request to consolidate a case across sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Canonical case identifier.
    pub target_id: String,
    /// Source keys in reporting order. Duplicates are ignored.
    pub sources: Vec<String>,
    /// Report discovered related ids as follow-up candidates.
    #[serde(default)]
    pub fetch_related: bool,
    /// Credential bag per source key.
    #[serde(default)]
    pub credentials: HashMap<String, Credentials>,
    #[serde(default, alias = "client_code")]
    pub client_code_override: Option<String>,
    #[serde(default, alias = "module_code")]
    pub module_code_override: Option<String>,
}

impl PipelineRequest {
    pub fn new(target_id: impl Into<String>, sources: &[&str]) -> Self {
        Self {
            target_id: target_id.into(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            fetch_related: false,
            credentials: HashMap::new(),
            client_code_override: None,
            module_code_override: None,
        }
    }

    /// Check the request can be dispatched at all.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.target_id.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "target_id must not be empty".to_string(),
            ));
        }
        if self.sources.iter().all(|s| s.trim().is_empty()) {
            return Err(PipelineError::InvalidRequest(
                "at least one source is required".to_string(),
            ));
        }
        if let Some(code) = &self.client_code_override {
            if !is_numeric_code(code) {
                return Err(PipelineError::InvalidRequest(format!(
                    "client code override must be numeric, got '{}'",
                    code
                )));
            }
        }
        if let Some(code) = &self.module_code_override {
            if !is_numeric_code(code) {
                return Err(PipelineError::InvalidRequest(format!(
                    "module code override must be numeric, got '{}'",
                    code
                )));
            }
        }
        Ok(())
    }
}

/// What `run_pipeline` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedSummary {
    pub target_id: String,
    /// Folder of the consolidated record. `None` when no source succeeded
    /// and the case was never persisted before.
    pub folder_id: Option<String>,
    /// True when this run created the record.
    pub record_created: bool,
    /// One entry per requested source, in request order.
    pub sources_results: Vec<SourceResult>,
    /// Related ids reported by successful sources, sorted, without `target_id`.
    pub discovered_related: Vec<String>,
    /// Candidates for follow-up runs. Only filled when `fetch_related` is set;
    /// no run is started automatically.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_pipeline_triggered: Vec<String>,
    pub duration_ms: u64,
}

impl ConsolidatedSummary {
    pub fn succeeded_count(&self) -> usize {
        self.sources_results.iter().filter(|r| r.success).count()
    }

    /// Look up the result for a source key, ignoring case and padding.
    pub fn result(&self, source: &str) -> Option<&SourceResult> {
        let key = normalize_key(source);
        self.sources_results
            .iter()
            .find(|r| normalize_key(&r.source) == key)
    }
}

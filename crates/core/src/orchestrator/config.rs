//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::Classification;

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Client code used when no override is given and no party matches the directory.
    #[serde(default = "default_client_code")]
    pub default_client_code: String,

    /// Display name for the default client. When unset, the directory is
    /// consulted by code and the code itself is the last resort.
    #[serde(default)]
    pub default_client_name: Option<String>,

    /// Module code used when no override is given ("3" = litigation).
    #[serde(default = "default_module_code")]
    pub default_module_code: String,

    /// Payload field carrying the case value (last non-null wins).
    #[serde(default = "default_aggregate_field")]
    pub aggregate_field: String,

    /// Payload fields holding party names, checked in order against the directory.
    #[serde(default = "default_party_fields")]
    pub party_fields: Vec<String>,

    /// Per-source lookup ceiling (seconds).
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    /// Optional ceiling on the whole fan-out (seconds).
    #[serde(default)]
    pub batch_timeout_secs: Option<u64>,

    #[serde(default = "default_category")]
    pub default_category: String,

    #[serde(default = "default_side")]
    pub default_side: String,

    #[serde(default = "default_risk")]
    pub default_risk: String,
}

fn default_client_code() -> String {
    "0001".to_string()
}

fn default_module_code() -> String {
    "3".to_string()
}

fn default_aggregate_field() -> String {
    "value".to_string()
}

fn default_party_fields() -> Vec<String> {
    vec![
        "plaintiff".to_string(),
        "defendant".to_string(),
        "client".to_string(),
    ]
}

fn default_source_timeout() -> u64 {
    120
}

fn default_category() -> String {
    "civil".to_string()
}

fn default_side() -> String {
    "defendant".to_string()
}

fn default_risk() -> String {
    "possible".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_client_code: default_client_code(),
            default_client_name: None,
            default_module_code: default_module_code(),
            aggregate_field: default_aggregate_field(),
            party_fields: default_party_fields(),
            source_timeout_secs: default_source_timeout(),
            batch_timeout_secs: None,
            default_category: default_category(),
            default_side: default_side(),
            default_risk: default_risk(),
        }
    }
}

impl PipelineConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }

    /// Classification given to new records when no source reports one.
    pub fn default_classification(&self) -> Classification {
        Classification {
            category: self.default_category.clone(),
            side: self.default_side.clone(),
            risk: self.default_risk.clone(),
        }
    }
}

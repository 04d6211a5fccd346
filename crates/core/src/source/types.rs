//! Types shared by source adapters and the pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// A single extracted value inside a source payload.
///
/// Untagged so payloads read and write as plain JSON objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Numeric view of the value. Text holding a plain number also counts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PayloadValue::Number(n) => Some(*n),
            PayloadValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PayloadValue]> {
        match self {
            PayloadValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PayloadValue::Null)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        PayloadValue::Number(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        PayloadValue::Number(value as f64)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        PayloadValue::Bool(value)
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Text(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Text(value)
    }
}

/// Extracted fields from one source, keyed by field name.
pub type Payload = BTreeMap<String, PayloadValue>;

/// Opaque per-source credential bag.
pub type Credentials = HashMap<String, String>;

/// Input handed to an adapter for one lookup.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Case identifier to look up.
    pub target_id: String,
    /// Portal endpoint the adapter should use, when the source key carries one.
    pub endpoint: Option<String>,
    /// Credentials supplied for this source.
    pub credentials: Credentials,
}

/// Successful adapter output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFetch {
    /// Extracted fields.
    #[serde(default)]
    pub data: Payload,
    /// Related case identifiers found as a by-product.
    #[serde(default)]
    pub related: Vec<String>,
}

/// Outcome of exactly one source lookup, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    /// Source key as requested (normalized).
    pub source: String,
    pub success: bool,
    #[serde(default)]
    pub data: Payload,
    #[serde(default)]
    pub related_targets: Vec<String>,
    /// Present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceResult {
    pub fn succeeded(source: impl Into<String>, fetch: SourceFetch) -> Self {
        Self {
            source: source.into(),
            success: true,
            data: fetch.data,
            related_targets: fetch.related,
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            success: false,
            data: Payload::new(),
            related_targets: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Errors raised while executing a source lookup.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("source api error: {0}")]
    ApiError(String),

    #[error("timeout")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Failure reported by the source itself (e.g. case not found, login refused).
    #[error("{0}")]
    Rejected(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// A pluggable data source capability.
///
/// Implementations must be safe to call concurrently with other adapters and
/// should not block indefinitely; the pipeline also bounds each call.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &str;

    /// Look up one case.
    async fn fetch(&self, request: &FetchRequest) -> Result<SourceFetch, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_value_from_json_object() {
        let json = r#"{
            "value": 100,
            "plaintiff": "ACME LTDA",
            "sealed": false,
            "movements": [{"date": "2024-01-01"}],
            "court": {"code": "tjmg"},
            "judge": null
        }"#;
        let payload: Payload = serde_json::from_str(json).unwrap();

        assert_eq!(payload["value"], PayloadValue::Number(100.0));
        assert_eq!(payload["plaintiff"].as_str(), Some("ACME LTDA"));
        assert_eq!(payload["sealed"], PayloadValue::Bool(false));
        assert_eq!(payload["movements"].as_list().map(|l| l.len()), Some(1));
        assert!(matches!(payload["court"], PayloadValue::Map(_)));
        assert!(payload["judge"].is_null());
    }

    #[test]
    fn test_payload_value_as_f64() {
        assert_eq!(PayloadValue::Number(12.5).as_f64(), Some(12.5));
        assert_eq!(PayloadValue::from(" 42 ").as_f64(), Some(42.0));
        assert_eq!(PayloadValue::from("R$ 10,00").as_f64(), None);
        assert_eq!(PayloadValue::Bool(true).as_f64(), None);
        assert_eq!(PayloadValue::Null.as_f64(), None);
    }

    #[test]
    fn test_failed_result_serialization() {
        let result = SourceResult::failed("pje", "timeout");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["source"], "pje");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "timeout");
        assert!(json["data"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_succeeded_result_omits_error() {
        let mut data = Payload::new();
        data.insert("value".to_string(), PayloadValue::from(100i64));
        let result = SourceResult::succeeded(
            "esaj",
            SourceFetch {
                data,
                related: vec!["CASE-002".to_string()],
            },
        );

        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("error"));
        assert!(json.contains("CASE-002"));
    }

    #[test]
    fn test_source_error_display() {
        assert_eq!(SourceError::Timeout.to_string(), "timeout");
        assert_eq!(
            SourceError::Rejected("case not found".to_string()).to_string(),
            "case not found"
        );
        assert_eq!(
            SourceError::ConnectionFailed("refused".to_string()).to_string(),
            "connection failed: refused"
        );
    }
}

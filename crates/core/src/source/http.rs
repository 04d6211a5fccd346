//! Adapter that delegates extraction to a remote service over HTTP.
//!
//! The service receives `{target_id, endpoint, credentials}` as JSON and
//! answers `{success, data, related, error}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SystemServiceConfig;
use crate::metrics;

use super::{Credentials, FetchRequest, Payload, SourceAdapter, SourceError, SourceFetch};

#[derive(Debug, Serialize)]
struct ExtractionRequest<'a> {
    target_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a str>,
    credentials: &'a Credentials,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    success: bool,
    #[serde(default)]
    data: Payload,
    #[serde(default)]
    related: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP-backed source adapter for one system.
pub struct HttpSourceAdapter {
    name: String,
    client: Client,
    url: String,
}

impl HttpSourceAdapter {
    /// Create an adapter for `system` from its service configuration.
    pub fn new(system: &str, config: &SystemServiceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: system.to_string(),
            client,
            url: config.url.clone(),
        })
    }

    fn map_transport_error(e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_connect() {
            SourceError::ConnectionFailed(e.to_string())
        } else {
            SourceError::ApiError(e.to_string())
        }
    }
}

#[async_trait]
impl SourceAdapter for HttpSourceAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<SourceFetch, SourceError> {
        let start = Instant::now();
        debug!(system = %self.name, target_id = %request.target_id, "Calling extraction service");

        let body = ExtractionRequest {
            target_id: &request.target_id,
            endpoint: request.endpoint.as_deref(),
            credentials: &request.credentials,
        };

        let result = self.call(&body).await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&[self.name.as_str(), status])
            .inc();
        metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&[self.name.as_str()])
            .observe(start.elapsed().as_secs_f64());

        result
    }
}

impl HttpSourceAdapter {
    async fn call(&self, body: &ExtractionRequest<'_>) -> Result<SourceFetch, SourceError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SourceError::ApiError(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let reply: ExtractionResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        into_fetch(reply)
    }
}

fn into_fetch(reply: ExtractionResponse) -> Result<SourceFetch, SourceError> {
    if reply.success {
        Ok(SourceFetch {
            data: reply.data,
            related: reply.related,
        })
    } else {
        Err(SourceError::Rejected(
            reply.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PayloadValue;

    #[test]
    fn test_request_body_shape() {
        let mut credentials = Credentials::new();
        credentials.insert("user".to_string(), "alice".to_string());
        let body = ExtractionRequest {
            target_id: "0001234-56.2024.8.13.0024",
            endpoint: Some("https://pje.tjmg.jus.br/pje/login.seam"),
            credentials: &credentials,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["target_id"], "0001234-56.2024.8.13.0024");
        assert_eq!(json["endpoint"], "https://pje.tjmg.jus.br/pje/login.seam");
        assert_eq!(json["credentials"]["user"], "alice");
    }

    #[test]
    fn test_request_body_without_endpoint() {
        let credentials = Credentials::new();
        let body = ExtractionRequest {
            target_id: "X",
            endpoint: None,
            credentials: &credentials,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("endpoint"));
    }

    #[test]
    fn test_successful_reply_maps_to_fetch() {
        let reply: ExtractionResponse = serde_json::from_str(
            r#"{"success": true, "data": {"value": 250.5}, "related": ["CASE-9"]}"#,
        )
        .unwrap();

        let fetch = into_fetch(reply).unwrap();
        assert_eq!(fetch.data["value"], PayloadValue::Number(250.5));
        assert_eq!(fetch.related, vec!["CASE-9".to_string()]);
    }

    #[test]
    fn test_failed_reply_maps_to_rejected() {
        let reply: ExtractionResponse =
            serde_json::from_str(r#"{"success": false, "error": "login refused"}"#).unwrap();

        let err = into_fetch(reply).unwrap_err();
        assert_eq!(err, SourceError::Rejected("login refused".to_string()));
    }

    #[test]
    fn test_failed_reply_without_message() {
        let reply: ExtractionResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert_eq!(into_fetch(reply).unwrap_err().to_string(), "unknown error");
    }

    #[test]
    fn test_new_adapter_keeps_name() {
        let config = SystemServiceConfig {
            url: "http://localhost:9000/pje".to_string(),
            timeout_secs: 30,
        };
        let adapter = HttpSourceAdapter::new("pje", &config).unwrap();
        assert_eq!(adapter.name(), "pje");
    }
}

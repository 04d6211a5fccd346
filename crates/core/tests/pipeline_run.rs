//! Pipeline run integration tests.
//!
//! These tests drive the orchestrator with mock adapters against a real
//! SQLite store:
//! - Concurrent dispatch and request-order reporting
//! - Fault isolation (errors, panics, hangs)
//! - Consolidation, related-id discovery and idempotent folder allocation
//! - Persistence failures

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex_lite::Regex;
use tempfile::TempDir;

use caseflow_core::{
    orchestrator::{PipelineConfig, PipelineError, PipelineOrchestrator},
    source::{PayloadValue, SourceError, SourceRegistry},
    store::{CaseStore, SqliteCaseStore, StoreError},
    testing::{fixtures, MockCaseStore, MockSourceAdapter},
};

/// Test helper wiring mock adapters to an orchestrator backed by an on-disk store.
struct TestHarness {
    orchestrator: PipelineOrchestrator,
    store: Arc<SqliteCaseStore>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(adapters: &[(&str, MockSourceAdapter)]) -> Self {
        Self::with_config(adapters, PipelineConfig::default())
    }

    fn with_config(adapters: &[(&str, MockSourceAdapter)], config: PipelineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteCaseStore::new(&temp_dir.path().join("cases.db"))
                .expect("Failed to create case store"),
        );

        let mut registry = SourceRegistry::new();
        for (key, adapter) in adapters {
            registry.register_system(key, Arc::new(adapter.clone()));
        }

        let orchestrator = PipelineOrchestrator::new(
            config,
            Arc::new(registry),
            Arc::new(fixtures::client_directory()),
            Arc::clone(&store) as Arc<dyn CaseStore>,
        );

        Self {
            orchestrator,
            store,
            _temp_dir: temp_dir,
        }
    }
}

fn value(v: f64) -> PayloadValue {
    PayloadValue::Number(v)
}

#[tokio::test]
async fn test_example_scenario() {
    let a = MockSourceAdapter::succeeding(
        "a",
        fixtures::payload(&[("value", value(100.0))]),
        &["CASE-002"],
    );
    let b = MockSourceAdapter::failing("b", SourceError::Timeout);
    let harness = TestHarness::new(&[("a", a), ("b", b)]);

    let mut request = fixtures::request("CASE-001", &["A", "B"]);
    request.fetch_related = true;
    let summary = harness.orchestrator.run_pipeline(&request).await.unwrap();

    assert_eq!(summary.target_id, "CASE-001");
    assert_eq!(summary.sources_results.len(), 2);

    let first = &summary.sources_results[0];
    assert_eq!(first.source, "A");
    assert!(first.success);
    assert_eq!(first.data["value"], value(100.0));

    let second = &summary.sources_results[1];
    assert_eq!(second.source, "B");
    assert!(!second.success);
    assert_eq!(second.error.as_deref(), Some("timeout"));

    assert_eq!(summary.discovered_related, vec!["CASE-002"]);
    assert_eq!(summary.related_pipeline_triggered, vec!["CASE-002"]);
    assert!(summary.record_created);

    let record = harness.store.get("CASE-001").unwrap().unwrap();
    assert_eq!(record.aggregate_value, Some(100.0));
    assert_eq!(Some(record.folder_id), summary.folder_id);
    assert!(record.per_source_payload.contains_key("a"));
    assert!(!record.per_source_payload.contains_key("b"));
}

#[tokio::test]
async fn test_resolved_sources_run_concurrently() {
    let latency = Duration::from_millis(400);
    // One adapter behind three keys, so its peak concurrency covers them all.
    let shared = MockSourceAdapter::new("shared").with_latency(latency);
    let harness = TestHarness::new(&[
        ("pje", shared.clone()),
        ("esaj", shared.clone()),
        ("eproc", shared.clone()),
    ]);

    let request = fixtures::request("CASE-001", &["pje", "unknown-1", "esaj", "eproc", "unknown-2"]);
    let start = Instant::now();
    let summary = harness.orchestrator.run_pipeline(&request).await.unwrap();
    let elapsed = start.elapsed();

    let order: Vec<&str> = summary
        .sources_results
        .iter()
        .map(|r| r.source.as_str())
        .collect();
    assert_eq!(order, vec!["pje", "unknown-1", "esaj", "eproc", "unknown-2"]);

    for result in &summary.sources_results {
        if result.source.starts_with("unknown") {
            assert!(!result.success);
            assert!(result.error.as_deref().unwrap().contains("adapter not found"));
        } else {
            assert!(result.success, "{} should succeed", result.source);
        }
    }

    assert_eq!(shared.fetch_count().await, 3);
    assert_eq!(shared.peak_concurrency(), 3);
    // Roughly max(latencies), well under their sum.
    assert!(elapsed < latency * 2, "took {:?}", elapsed);
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let config = PipelineConfig {
        source_timeout_secs: 1,
        ..Default::default()
    };
    let slow_ok = MockSourceAdapter::succeeding(
        "slow",
        fixtures::payload(&[("value", value(42.0))]),
        &[],
    )
    .with_latency(Duration::from_millis(200));
    let harness = TestHarness::with_config(
        &[
            ("panics", MockSourceAdapter::panicking("panics")),
            (
                "errors",
                MockSourceAdapter::failing(
                    "errors",
                    SourceError::ConnectionFailed("refused".to_string()),
                ),
            ),
            ("hangs", MockSourceAdapter::hanging("hangs")),
            ("slow", slow_ok),
        ],
        config,
    );

    let request = fixtures::request("CASE-001", &["panics", "errors", "hangs", "slow"]);
    let summary = harness.orchestrator.run_pipeline(&request).await.unwrap();

    let errors: Vec<Option<&str>> = summary
        .sources_results
        .iter()
        .map(|r| r.error.as_deref())
        .collect();
    assert_eq!(
        errors,
        vec![
            Some("adapter panicked"),
            Some("connection failed: refused"),
            Some("timeout"),
            None,
        ]
    );
    assert_eq!(summary.succeeded_count(), 1);

    let record = harness.store.get("CASE-001").unwrap().unwrap();
    assert_eq!(record.aggregate_value, Some(42.0));
    assert_eq!(record.per_source_payload.len(), 1);
}

#[tokio::test]
async fn test_rerun_keeps_folder_and_refreshes_payload() {
    let adapter = MockSourceAdapter::succeeding(
        "pje",
        fixtures::payload(&[("value", value(100.0))]),
        &[],
    );
    let control = adapter.clone();
    let harness = TestHarness::new(&[("pje", adapter)]);
    let request = fixtures::request("CASE-001", &["pje"]);

    let first = harness.orchestrator.run_pipeline(&request).await.unwrap();
    control
        .set_response(fixtures::payload(&[("value", value(200.0))]), &[])
        .await;
    let second = harness.orchestrator.run_pipeline(&request).await.unwrap();

    assert!(first.record_created);
    assert!(!second.record_created);
    assert_eq!(first.folder_id, second.folder_id);

    let record = harness.store.get("CASE-001").unwrap().unwrap();
    assert_eq!(record.aggregate_value, Some(200.0));
    assert_eq!(record.per_source_payload["pje"]["value"], value(200.0));
}

#[tokio::test]
async fn test_rerun_of_one_source_keeps_the_others() {
    let pje = MockSourceAdapter::succeeding("pje", fixtures::payload(&[("value", value(1.0))]), &[]);
    let esaj = MockSourceAdapter::succeeding("esaj", fixtures::payload(&[("judge", "X".into())]), &[]);
    let harness = TestHarness::new(&[("pje", pje), ("esaj", esaj)]);

    harness
        .orchestrator
        .run_pipeline(&fixtures::request("CASE-001", &["pje", "esaj"]))
        .await
        .unwrap();
    harness
        .orchestrator
        .run_pipeline(&fixtures::request("CASE-001", &["pje"]))
        .await
        .unwrap();

    let record = harness.store.get("CASE-001").unwrap().unwrap();
    let sources: Vec<&String> = record.per_source_payload.keys().collect();
    assert_eq!(sources, vec!["esaj", "pje"]);
}

#[tokio::test]
async fn test_discovered_related_is_sorted_union_without_target() {
    let a = MockSourceAdapter::succeeding("a", fixtures::payload(&[]), &["CASE-009", "CASE-001"]);
    let b = MockSourceAdapter::succeeding("b", fixtures::payload(&[]), &["CASE-002", "CASE-009"]);
    let harness = TestHarness::new(&[("a", a), ("b", b)]);

    let summary = harness
        .orchestrator
        .run_pipeline(&fixtures::request("CASE-001", &["a", "b"]))
        .await
        .unwrap();

    assert_eq!(summary.discovered_related, vec!["CASE-002", "CASE-009"]);
    assert!(summary.related_pipeline_triggered.is_empty());
}

#[tokio::test]
async fn test_sequential_folders_have_expected_format() {
    let harness = TestHarness::new(&[("pje", MockSourceAdapter::new("pje"))]);
    let pattern = Regex::new(r"^\d+\.\d+\.\d{5}$").unwrap();

    let mut folders = Vec::new();
    for i in 1..=3 {
        let summary = harness
            .orchestrator
            .run_pipeline(&fixtures::request(&format!("CASE-{:03}", i), &["pje"]))
            .await
            .unwrap();
        folders.push(summary.folder_id.unwrap());
    }

    assert_eq!(folders, vec!["0001.3.00001", "0001.3.00002", "0001.3.00003"]);
    assert!(folders.iter().all(|f| pattern.is_match(f)));
}

#[tokio::test]
async fn test_persistence_unavailable_fails_the_run() {
    let store = Arc::new(MockCaseStore::new());
    let mut registry = SourceRegistry::new();
    registry.register_system("pje", Arc::new(MockSourceAdapter::new("pje")));
    let orchestrator = PipelineOrchestrator::new(
        PipelineConfig::default(),
        Arc::new(registry),
        Arc::new(fixtures::client_directory()),
        Arc::clone(&store) as Arc<dyn CaseStore>,
    );

    store.set_unavailable(true);
    let err = orchestrator
        .run_pipeline(&fixtures::request("CASE-001", &["pje"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Persistence(StoreError::Unavailable(_))
    ));

    store.set_unavailable(false);
    assert!(store.get("CASE-001").unwrap().is_none());
    assert_eq!(store.upsert_count(), 0);
}

#[tokio::test]
async fn test_failed_run_does_not_create_record() {
    let harness = TestHarness::new(&[(
        "pje",
        MockSourceAdapter::failing("pje", SourceError::Rejected("case not found".to_string())),
    )]);

    let summary = harness
        .orchestrator
        .run_pipeline(&fixtures::request("CASE-404", &["pje"]))
        .await
        .unwrap();

    assert_eq!(summary.sources_results[0].error.as_deref(), Some("case not found"));
    assert!(summary.folder_id.is_none());
    assert!(harness.store.get("CASE-404").unwrap().is_none());
}

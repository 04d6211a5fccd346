//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Pipeline runs (results, duration, discovered related cases)
//! - Source lookups (per source results and latency)
//! - Folder allocation (new folders, conflicts retried)
//! - External extraction services

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Pipeline runs total by result.
pub static PIPELINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("caseflow_pipeline_runs_total", "Total pipeline runs"),
        &["result"], // "persisted", "no_success", "invalid", "persistence_failed"
    )
    .unwrap()
});

/// Pipeline duration in seconds.
pub static PIPELINE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "caseflow_pipeline_duration_seconds",
            "Duration of a full pipeline run",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &[],
    )
    .unwrap()
});

/// Related cases discovered per run.
pub static RELATED_DISCOVERED: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "caseflow_related_discovered",
            "Number of related case ids discovered per run",
        )
        .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Source Metrics
// =============================================================================

/// Source lookups total by source and result.
pub static SOURCE_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("caseflow_source_fetches_total", "Total source lookups"),
        &["source", "result"], // "success", "failed", "timeout", "panicked", "not_found"
    )
    .unwrap()
});

/// Source lookup duration in seconds.
pub static SOURCE_FETCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "caseflow_source_fetch_duration_seconds",
            "Duration of individual source lookups",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Store Metrics
// =============================================================================

/// Folders allocated total.
pub static FOLDERS_ALLOCATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "caseflow_folders_allocated_total",
        "Total folder ids allocated for new cases",
    )
    .unwrap()
});

/// Allocation conflicts that were retried.
pub static ALLOCATION_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "caseflow_allocation_conflicts_total",
        "Total folder allocation conflicts retried",
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// Extraction service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "caseflow_external_service_duration_seconds",
            "Duration of extraction service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]),
        &["system"],
    )
    .unwrap()
});

/// Extraction service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "caseflow_external_service_requests_total",
            "Total extraction service requests",
        ),
        &["system", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Pipeline
        Box::new(PIPELINE_RUNS.clone()),
        Box::new(PIPELINE_DURATION.clone()),
        Box::new(RELATED_DISCOVERED.clone()),
        // Sources
        Box::new(SOURCE_FETCHES.clone()),
        Box::new(SOURCE_FETCH_DURATION.clone()),
        // Store
        Box::new(FOLDERS_ALLOCATED.clone()),
        Box::new(ALLOCATION_CONFLICTS.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        SOURCE_FETCHES.with_label_values(&["pje", "success"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "caseflow_source_fetches_total"));
    }
}

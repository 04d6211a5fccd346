//! Pipeline orchestrator implementation.
//!
//! One `run_pipeline` call:
//! - Dispatch: every resolvable source runs in its own task, all at once
//! - Join: waits for every task, then consolidates in request order
//! - Persist: a single `CaseStore::upsert`, off the async runtime

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{self, BoxFuture, FutureExt};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::is_numeric_code;
use crate::directory::{Client, ClientDirectory};
use crate::metrics;
use crate::source::{
    normalize_key, Credentials, FetchRequest, ResolvedSource, SourceError, SourceRegistry,
    SourceResult,
};
use crate::store::{CaseStore, CaseUpdate, UpsertOutcome};

use super::config::PipelineConfig;
use super::consolidate::{
    classification_patch, collect_payloads, collect_related, dedup_sources, last_number,
    party_names,
};
use super::types::{ConsolidatedSummary, PipelineError, PipelineRequest};

/// Consolidates one case across many sources and persists the result.
///
/// Cheap to share: every collaborator is behind an `Arc`, and concurrent
/// `run_pipeline` calls only meet at the store.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    registry: Arc<SourceRegistry>,
    directory: Arc<dyn ClientDirectory>,
    store: Arc<dyn CaseStore>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<SourceRegistry>,
        directory: Arc<dyn ClientDirectory>,
        store: Arc<dyn CaseStore>,
    ) -> Self {
        Self {
            config,
            registry,
            directory,
            store,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one request end to end.
    ///
    /// Fails only on an invalid request or when persistence fails; source
    /// failures are reported inside the summary.
    pub async fn run_pipeline(
        &self,
        request: &PipelineRequest,
    ) -> Result<ConsolidatedSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", run_id = %run_id, target_id = %request.target_id.trim());
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &PipelineRequest) -> Result<ConsolidatedSummary, PipelineError> {
        let start = Instant::now();

        if let Err(e) = request.validate() {
            warn!(error = %e, "Rejecting pipeline request");
            metrics::PIPELINE_RUNS.with_label_values(&["invalid"]).inc();
            return Err(e);
        }

        let target_id = request.target_id.trim().to_string();
        let sources = dedup_sources(&request.sources);
        info!(sources = ?sources, fetch_related = request.fetch_related, "Starting pipeline run");

        let results = self
            .dispatch(&target_id, &sources, &request.credentials)
            .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        let discovered_related = collect_related(&target_id, &results);
        metrics::RELATED_DISCOVERED
            .with_label_values(&[])
            .observe(discovered_related.len() as f64);

        let (folder_id, record_created) = if succeeded > 0 {
            let update = self.build_update(&target_id, request, &results);
            match self.persist(update).await {
                Ok(outcome) => {
                    if outcome.created {
                        info!(folder_id = %outcome.folder_id, "Created consolidated record");
                    } else {
                        debug!(folder_id = %outcome.folder_id, "Merged into existing record");
                    }
                    (Some(outcome.folder_id), outcome.created)
                }
                Err(e) => {
                    error!(error = %e, "Failed to persist consolidated record");
                    metrics::PIPELINE_RUNS
                        .with_label_values(&["persistence_failed"])
                        .inc();
                    observe_duration(start);
                    return Err(e);
                }
            }
        } else {
            warn!(
                sources = sources.len(),
                "No source succeeded, leaving the record untouched"
            );
            (self.existing_folder(&target_id).await, false)
        };

        let related_pipeline_triggered = if request.fetch_related {
            discovered_related.clone()
        } else {
            Vec::new()
        };

        let result_label = if succeeded > 0 { "persisted" } else { "no_success" };
        metrics::PIPELINE_RUNS
            .with_label_values(&[result_label])
            .inc();
        observe_duration(start);

        info!(
            succeeded,
            failed = results.len() - succeeded,
            discovered = discovered_related.len(),
            folder_id = folder_id.as_deref().unwrap_or("-"),
            "Pipeline run finished"
        );

        Ok(ConsolidatedSummary {
            target_id,
            folder_id,
            record_created,
            sources_results: results,
            discovered_related,
            related_pipeline_triggered,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Fan out to every source and join them all. Output follows `sources` order.
    async fn dispatch(
        &self,
        target_id: &str,
        sources: &[String],
        credentials: &HashMap<String, Credentials>,
    ) -> Vec<SourceResult> {
        let credentials: HashMap<String, &Credentials> = credentials
            .iter()
            .map(|(key, bag)| (normalize_key(key), bag))
            .collect();
        let timeout = self.config.source_timeout();
        let deadline = self
            .config
            .batch_timeout()
            .map(|ceiling| tokio::time::Instant::now() + ceiling);

        let units: Vec<BoxFuture<'static, SourceResult>> = sources
            .iter()
            .map(|label| match self.registry.resolve(label) {
                Ok(resolved) => {
                    let request = FetchRequest {
                        target_id: target_id.to_string(),
                        endpoint: resolved.endpoint.clone(),
                        credentials: credentials
                            .get(&resolved.key)
                            .map(|bag| (*bag).clone())
                            .unwrap_or_default(),
                    };
                    let key = resolved.key.clone();
                    let label = label.clone();
                    let handle = tokio::spawn(
                        fetch_source(label.clone(), resolved, request, timeout, deadline)
                            .in_current_span(),
                    );
                    async move {
                        match handle.await {
                            Ok(result) => result,
                            Err(e) => {
                                let reason = if e.is_panic() {
                                    "adapter panicked"
                                } else {
                                    "adapter task cancelled"
                                };
                                error!(source = %key, "Source lookup aborted: {}", reason);
                                metrics::SOURCE_FETCHES
                                    .with_label_values(&[key.as_str(), "panicked"])
                                    .inc();
                                SourceResult::failed(label, reason)
                            }
                        }
                    }
                    .boxed()
                }
                Err(e) => {
                    let key = normalize_key(label);
                    warn!(source = %key, "No adapter for source");
                    metrics::SOURCE_FETCHES
                        .with_label_values(&[key.as_str(), "not_found"])
                        .inc();
                    future::ready(SourceResult::failed(label.clone(), e.to_string())).boxed()
                }
            })
            .collect();

        future::join_all(units).await
    }

    fn build_update(
        &self,
        target_id: &str,
        request: &PipelineRequest,
        results: &[SourceResult],
    ) -> CaseUpdate {
        let client = self.resolve_client(request, results);
        let module_code = request
            .module_code_override
            .clone()
            .unwrap_or_else(|| self.config.default_module_code.clone());

        CaseUpdate {
            target_id: target_id.to_string(),
            client_code: client.code,
            client_name: client.display_name,
            module_code,
            aggregate_value: last_number(results, &self.config.aggregate_field),
            initial_classification: self.config.default_classification(),
            classification: classification_patch(results),
            payloads: collect_payloads(results),
        }
    }

    /// Override first, then the first party that matches the directory, then the default.
    fn resolve_client(&self, request: &PipelineRequest, results: &[SourceResult]) -> Client {
        if let Some(code) = &request.client_code_override {
            let display_name = self
                .directory
                .find_by_code(code)
                .map(|c| c.display_name)
                .unwrap_or_else(|| code.clone());
            debug!(client_code = %code, "Using client override");
            return Client {
                code: code.clone(),
                display_name,
            };
        }

        for name in party_names(results, &self.config.party_fields) {
            let found = self
                .directory
                .find_by_name(&name)
                .or_else(|| self.directory.find_by_tax_id(&name));
            match found {
                Some(client) if is_numeric_code(&client.code) => {
                    debug!(party = %name, client_code = %client.code, "Matched party to client");
                    return client;
                }
                Some(client) => {
                    warn!(
                        party = %name,
                        client_code = %client.code,
                        "Ignoring directory match with a non-numeric client code"
                    );
                }
                None => {}
            }
        }

        let code = self.config.default_client_code.clone();
        let display_name = self
            .config
            .default_client_name
            .clone()
            .or_else(|| self.directory.find_by_code(&code).map(|c| c.display_name))
            .unwrap_or_else(|| code.clone());
        debug!(client_code = %code, "No party matched the directory, using default client");
        Client { code, display_name }
    }

    async fn persist(&self, update: CaseUpdate) -> Result<UpsertOutcome, PipelineError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.upsert(&update))
            .await
            .map_err(|e| PipelineError::Internal(format!("persistence task failed: {}", e)))?
            .map_err(PipelineError::from)
    }

    /// Folder of an already persisted record, for runs that write nothing.
    async fn existing_folder(&self, target_id: &str) -> Option<String> {
        let store = Arc::clone(&self.store);
        let target_id = target_id.to_string();
        match tokio::task::spawn_blocking(move || store.get(&target_id)).await {
            Ok(Ok(record)) => record.map(|r| r.folder_id),
            Ok(Err(e)) => {
                warn!(error = %e, "Could not read existing record");
                None
            }
            Err(e) => {
                warn!(error = %e, "Record lookup task failed");
                None
            }
        }
    }
}

/// One isolated source lookup, bounded by the per-source timeout and the batch deadline.
/// The result is reported under `label`, the caller's spelling of the source.
async fn fetch_source(
    label: String,
    source: ResolvedSource,
    request: FetchRequest,
    timeout: Duration,
    deadline: Option<tokio::time::Instant>,
) -> SourceResult {
    let budget = match deadline {
        Some(deadline) => timeout.min(deadline.saturating_duration_since(tokio::time::Instant::now())),
        None => timeout,
    };

    debug!(source = %source.key, system = %source.system, "Dispatching source lookup");
    let start = Instant::now();
    let outcome = tokio::time::timeout(budget, source.adapter.fetch(&request)).await;
    metrics::SOURCE_FETCH_DURATION
        .with_label_values(&[source.key.as_str()])
        .observe(start.elapsed().as_secs_f64());

    match outcome {
        Ok(Ok(fetch)) => {
            debug!(
                source = %source.key,
                fields = fetch.data.len(),
                related = fetch.related.len(),
                "Source lookup succeeded"
            );
            metrics::SOURCE_FETCHES
                .with_label_values(&[source.key.as_str(), "success"])
                .inc();
            SourceResult::succeeded(label, fetch)
        }
        Ok(Err(e)) => {
            warn!(source = %source.key, error = %e, "Source lookup failed");
            metrics::SOURCE_FETCHES
                .with_label_values(&[source.key.as_str(), "failed"])
                .inc();
            SourceResult::failed(label, e.to_string())
        }
        Err(_) => {
            warn!(source = %source.key, budget_ms = budget.as_millis() as u64, "Source lookup timed out");
            metrics::SOURCE_FETCHES
                .with_label_values(&[source.key.as_str(), "timeout"])
                .inc();
            SourceResult::failed(label, SourceError::Timeout.to_string())
        }
    }
}

fn observe_duration(start: Instant) {
    metrics::PIPELINE_DURATION
        .with_label_values(&[])
        .observe(start.elapsed().as_secs_f64());
}

//! Pipeline orchestrator.
//!
//! Fans one case lookup out to many sources concurrently, joins every
//! result, consolidates them and persists a single record:
//! - **Dispatch**: one isolated task per source, bounded by timeouts
//! - **Consolidation**: related ids, payloads, aggregate value, classification
//! - **Identity**: client from override, directory match, or default
//! - **Persistence**: one atomic upsert allocating the folder id on first sight

mod config;
mod consolidate;
mod runner;
mod types;

pub use config::PipelineConfig;
pub use runner::PipelineOrchestrator;
pub use types::{ConsolidatedSummary, PipelineError, PipelineRequest};

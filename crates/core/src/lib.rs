pub mod config;
pub mod directory;
pub mod metrics;
pub mod orchestrator;
pub mod source;
pub mod store;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use directory::{Client, ClientDirectory, DirectoryError, StaticDirectory};
pub use orchestrator::{
    ConsolidatedSummary, PipelineConfig, PipelineError, PipelineOrchestrator, PipelineRequest,
};
pub use source::{
    create_registry, FetchRequest, HttpSourceAdapter, Payload, PayloadValue, SourceAdapter,
    SourceError, SourceFetch, SourceRegistry, SourceResult,
};
pub use store::{CaseRecord, CaseStore, FolderId, SqliteCaseStore, StoreError, UpsertOutcome};

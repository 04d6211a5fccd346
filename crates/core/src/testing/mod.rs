//! Testing utilities and mock implementations.
//!
//! Mocks for the source adapter and case store traits, so pipelines can be
//! exercised end to end without extraction services or a database.
//!
//! # Example
//!
//! ```rust,ignore
//! use caseflow_core::testing::{fixtures, MockCaseStore, MockSourceAdapter};
//!
//! let adapter = MockSourceAdapter::succeeding("pje", fixtures::payload(&[]), &[]);
//! let store = Arc::new(MockCaseStore::new());
//!
//! // Register the adapter, build the orchestrator, run a request...
//! store.set_unavailable(true); // next upsert fails
//! ```

mod mock_adapter;
mod mock_store;

pub use mock_adapter::{MockSourceAdapter, RecordedFetch};
pub use mock_store::MockCaseStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::directory::{DirectoryEntry, StaticDirectory};
    use crate::orchestrator::PipelineRequest;
    use crate::source::{Payload, PayloadValue};

    /// Build a payload from field/value pairs.
    pub fn payload(fields: &[(&str, PayloadValue)]) -> Payload {
        fields
            .iter()
            .map(|(field, value)| (field.to_string(), value.clone()))
            .collect()
    }

    /// Create a request with defaults for everything but the target and sources.
    pub fn request(target_id: &str, sources: &[&str]) -> PipelineRequest {
        PipelineRequest::new(target_id, sources)
    }

    /// Directory entries used across tests.
    pub fn client_entries() -> Vec<DirectoryEntry> {
        vec![
            DirectoryEntry {
                code: Some("0001".to_string()),
                name: "Borrachas Vipal S.A.".to_string(),
                tax_id: Some("92.723.082/0001-00".to_string()),
            },
            DirectoryEntry {
                code: Some("0345".to_string()),
                name: "Borrachas Vipal Nordeste S.A.".to_string(),
                tax_id: Some("04.201.227/0001-07".to_string()),
            },
            DirectoryEntry {
                code: Some("0702".to_string()),
                name: "Vipal Recapagem Ltda".to_string(),
                tax_id: None,
            },
        ]
    }

    /// A small client directory.
    pub fn client_directory() -> StaticDirectory {
        StaticDirectory::from_entries(client_entries())
    }
}

//! Consolidated-record persistence.
//!
//! Every write goes through `CaseStore::upsert`, which creates the record and
//! allocates its folder id the first time a case is seen and merges into it
//! afterwards.

mod sqlite;
mod types;

pub use sqlite::SqliteCaseStore;
pub use types::*;

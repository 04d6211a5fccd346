//! Pluggable data sources.
//!
//! A `SourceAdapter` performs one lookup against an external provider. The
//! `SourceRegistry` maps source keys (system names or venue codes) to
//! adapters.

mod http;
mod registry;
mod types;

pub use http::HttpSourceAdapter;
pub use registry::{normalize_key, RegistryError, ResolvedSource, SourceRegistry, VenueAlias};
pub use types::*;

use std::sync::Arc;

use tracing::info;

use crate::config::RegistryConfig;

/// Build a registry from configuration, creating one HTTP adapter per configured system.
pub fn create_registry(config: &RegistryConfig) -> Result<SourceRegistry, SourceError> {
    let mut registry = if config.include_builtin_venues {
        SourceRegistry::with_builtin_venues()
    } else {
        SourceRegistry::new()
    };

    for (system, service) in &config.systems {
        let adapter = HttpSourceAdapter::new(system, service)?;
        registry.register_system(system, Arc::new(adapter));
        info!(system = %system, url = %service.url, "Registered source system");
    }

    for (code, venue) in &config.venues {
        registry.register_venue(code, &venue.system, &venue.endpoint);
    }

    Ok(registry)
}

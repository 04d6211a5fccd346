//! Source key resolution.
//!
//! A source key is either a venue code (a court or agency, resolving to the
//! system that serves it plus that venue's portal endpoint) or the name of a
//! system directly.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::SourceAdapter;

/// Venue code -> (system, portal endpoint) for the courts and agencies we know.
const BUILTIN_VENUES: &[(&str, &str, &str)] = &[
    // State courts
    ("tjmg", "pje", "https://pje.tjmg.jus.br/pje/login.seam"),
    ("tjsp", "esaj", "https://esaj.tjsp.jus.br/cpopg/open.do"),
    ("tjrs", "eproc", "https://eproc1g.tjrs.jus.br/eproc/"),
    ("tjsc", "eproc", "https://eproc1g.tjsc.jus.br/eproc/"),
    ("tjpr", "projudi", "https://projudi.tjpr.jus.br/projudi/"),
    ("tjgo", "projudi", "https://projudi.tjgo.jus.br/projudi/"),
    ("tjal", "esaj", "https://www2.tjal.jus.br/cpopg/open.do"),
    ("tjms", "esaj", "https://esaj.tjms.jus.br/cpopg/open.do"),
    ("tjam", "esaj", "https://consultasaj.tjam.jus.br/cpopg/open.do"),
    ("tjac", "esaj", "https://esaj.tjac.jus.br/cpopg/open.do"),
    // Federal courts
    ("trf1", "pje", "https://pje1g.trf1.jus.br/pje/login.seam"),
    ("trf2", "eproc", "https://eproc.trf2.jus.br/eproc/"),
    ("trf3", "pje", "https://pje1g.trf3.jus.br/pje/login.seam"),
    ("trf4", "eproc", "https://eproc.trf4.jus.br/eproc/"),
    ("trf5", "pje", "https://pje.trf5.jus.br/pje/login.seam"),
    // Labour courts
    ("trt1", "pje", "https://pje.trt1.jus.br/primeirograu/login.seam"),
    ("trt2", "pje", "https://pje.trt2.jus.br/primeirograu/login.seam"),
    ("trt3", "pje", "https://pje.trt3.jus.br/primeirograu/login.seam"),
    ("trt4", "pje", "https://pje.trt4.jus.br/primeirograu/login.seam"),
    ("trt5", "pje", "https://pje.trt5.jus.br/primeirograu/login.seam"),
    ("trt15", "pje", "https://pje.trt15.jus.br/primeirograu/login.seam"),
    // National systems
    ("domicilio", "dje", "https://domicilio.pdpj.jus.br/"),
    ("diario_nacional", "djen", "https://comunica.pje.jus.br/"),
    // Administrative agencies
    ("comprot", "comprot", "https://comprot.fazenda.gov.br/comprotegov/site/index.html"),
    ("antt", "antt", "https://appweb1.antt.gov.br/spmi/Site/Login.aspx"),
    ("ridigital", "ridigital", "https://ridigital.org.br/"),
    ("procon_nacional", "proconsumidor", "https://proconsumidor.mj.gov.br/"),
    ("consumidor_gov", "consumidor_gov", "https://www.consumidor.gov.br/"),
    ("sei_sp", "sei", "https://sei.sp.gov.br/sei/"),
    ("sei_mg", "sei", "https://www.sei.mg.gov.br/sei/"),
    ("sei_federal", "sei", "https://sei.economia.gov.br/sei/"),
];

/// Errors from source resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("adapter not found: {0}")]
    AdapterNotFound(String),
}

/// A venue alias: which system serves the venue and where its portal lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueAlias {
    pub system: String,
    pub endpoint: String,
}

struct RegisteredSystem {
    adapter: Arc<dyn SourceAdapter>,
    default_endpoint: Option<String>,
}

/// A resolved source key, ready to dispatch.
#[derive(Clone)]
pub struct ResolvedSource {
    /// Normalized source key.
    pub key: String,
    /// System whose adapter serves the key.
    pub system: String,
    /// Endpoint override for this key, if any.
    pub endpoint: Option<String>,
    pub adapter: Arc<dyn SourceAdapter>,
}

impl fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("key", &self.key)
            .field("system", &self.system)
            .field("endpoint", &self.endpoint)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

/// Maps source keys to adapters. Built once and shared read-only.
#[derive(Default)]
pub struct SourceRegistry {
    systems: HashMap<String, RegisteredSystem>,
    venues: HashMap<String, VenueAlias>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut systems: Vec<_> = self.systems.keys().collect();
        systems.sort();
        f.debug_struct("SourceRegistry")
            .field("systems", &systems)
            .field("venues", &self.venues.len())
            .finish()
    }
}

/// Canonical form of a source key.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

impl SourceRegistry {
    /// Empty registry: no systems, no venues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in venue table.
    pub fn with_builtin_venues() -> Self {
        let mut registry = Self::new();
        for (code, system, endpoint) in BUILTIN_VENUES {
            registry.register_venue(code, system, endpoint);
        }
        registry
    }

    /// Register the adapter serving a system.
    pub fn register_system(&mut self, name: &str, adapter: Arc<dyn SourceAdapter>) {
        self.insert_system(name, adapter, None);
    }

    /// Register a system together with the endpoint used when it is addressed directly.
    pub fn register_system_with_endpoint(
        &mut self,
        name: &str,
        adapter: Arc<dyn SourceAdapter>,
        endpoint: &str,
    ) {
        self.insert_system(name, adapter, Some(endpoint.to_string()));
    }

    fn insert_system(
        &mut self,
        name: &str,
        adapter: Arc<dyn SourceAdapter>,
        default_endpoint: Option<String>,
    ) {
        self.systems.insert(
            normalize_key(name),
            RegisteredSystem {
                adapter,
                default_endpoint,
            },
        );
    }

    /// Add or replace a venue alias.
    pub fn register_venue(&mut self, code: &str, system: &str, endpoint: &str) {
        self.venues.insert(
            normalize_key(code),
            VenueAlias {
                system: normalize_key(system),
                endpoint: endpoint.to_string(),
            },
        );
    }

    /// Venue alias for a code, if any.
    pub fn venue(&self, code: &str) -> Option<&VenueAlias> {
        self.venues.get(&normalize_key(code))
    }

    /// Resolve a source key. Venue aliases win over system names.
    pub fn resolve(&self, source_key: &str) -> Result<ResolvedSource, RegistryError> {
        let key = normalize_key(source_key);

        if let Some(venue) = self.venues.get(&key) {
            return match self.systems.get(&venue.system) {
                Some(system) => {
                    debug!(source = %key, system = %venue.system, "Resolved venue alias");
                    Ok(ResolvedSource {
                        key,
                        system: venue.system.clone(),
                        endpoint: Some(venue.endpoint.clone()),
                        adapter: Arc::clone(&system.adapter),
                    })
                }
                None => {
                    warn!(
                        source = %key,
                        system = %venue.system,
                        "No adapter registered for the system serving this venue"
                    );
                    Err(RegistryError::AdapterNotFound(key))
                }
            };
        }

        match self.systems.get(&key) {
            Some(system) => Ok(ResolvedSource {
                system: key.clone(),
                key,
                endpoint: system.default_endpoint.clone(),
                adapter: Arc::clone(&system.adapter),
            }),
            None => Err(RegistryError::AdapterNotFound(key)),
        }
    }

    /// Every key that currently resolves, sorted.
    pub fn supported_sources(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self.systems.keys().cloned().collect();
        keys.extend(
            self.venues
                .iter()
                .filter(|(_, venue)| self.systems.contains_key(&venue.system))
                .map(|(code, _)| code.clone()),
        );
        keys.into_iter().collect()
    }
}

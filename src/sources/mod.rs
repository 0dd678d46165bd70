//! Source adapters translate vendor webhook payloads into `Event`s.

pub mod grafana;

use crate::core::Source;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

pub use grafana::GrafanaSource;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid payload: {0}")]
    Parse(String),
}

/// Registered source adapters, keyed by source name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in adapter registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GrafanaSource));
        registry
    }

    /// Registers an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.sources
            .get(name)
            .ok_or_else(|| SourceError::UnknownSource(name.to_string()))
    }

    /// Registered source names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

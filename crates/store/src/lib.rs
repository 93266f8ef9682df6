//! KPI Store - document and smart-property access for the KPI engine
//!
//! Defines the narrow interfaces the query engine consumes:
//! - **DocumentStore**: per-channel, per-day raw documents and connected channels
//! - **SmartPropertyStore**: custom property rules and materialized entity tags
//!
//! Two backends implement both traits:
//! - **Memory**: in-process maps, for tests and embedding
//! - **Local**: JSON files on disk, for development and the CLI
//!
//! # Usage
//!
//! ```ignore
//! use kpi_store::{StoreConfig, StoreHandles};
//!
//! let handles = StoreHandles::from_config(&StoreConfig::local("data/"))?;
//! let channels = handles.documents.list_connected_channels(1).await?;
//! ```

pub mod backend;
pub mod config;
pub mod document;
pub mod error;

// Re-exports
pub use backend::local::{LocalStore, SmartPropertiesFile};
pub use backend::memory::MemoryStore;
pub use backend::{DocumentStore, SmartPropertyStore};
pub use config::{ResolvedStoreConfig, StoreBackendType, StoreConfig};
pub use document::{
    DateRange, RawDocument, RuleFilter, SmartPropertyRule, SmartPropertyTag, date_from_timestamp,
    date_to_timestamp,
};
pub use error::StoreError;

use std::sync::Arc;

/// Shared handles to both store interfaces, backed by one backend
#[derive(Clone)]
pub struct StoreHandles {
    /// Raw document access
    pub documents: Arc<dyn DocumentStore>,
    /// Smart-property access
    pub smart_properties: Arc<dyn SmartPropertyStore>,
}

impl StoreHandles {
    /// Wrap a backend implementing both interfaces
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: DocumentStore + SmartPropertyStore + 'static,
    {
        Self {
            documents: store.clone(),
            smart_properties: store,
        }
    }

    /// Open the configured backend
    pub fn from_resolved_config(config: &ResolvedStoreConfig) -> Result<Self, StoreError> {
        match config.backend {
            StoreBackendType::Memory => Ok(Self::new(Arc::new(MemoryStore::new()))),
            StoreBackendType::Local => {
                let path = config.path.as_ref().ok_or_else(|| {
                    StoreError::Config("path required for local backend".to_string())
                })?;
                Ok(Self::new(Arc::new(LocalStore::new(path))))
            }
        }
    }

    /// Open a backend from unresolved config
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let resolved = ResolvedStoreConfig::from_config(config)?;
        Self::from_resolved_config(&resolved)
    }

    /// Backend name for logging
    pub fn backend_name(&self) -> &'static str {
        self.documents.name()
    }
}

impl std::fmt::Debug for StoreHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandles")
            .field("backend", &self.backend_name())
            .finish()
    }
}

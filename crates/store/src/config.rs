//! Store configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Store configuration (`[store]` section)
///
/// ```toml
/// [store]
/// backend = "local"
/// path = "data/channels"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend type (memory, local)
    pub backend: Option<String>,

    /// Root directory of the local backend
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Create config for the local JSON backend
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Some("local".to_string()),
            path: Some(path.into()),
        }
    }

    /// Create config for the in-memory backend
    pub fn memory() -> Self {
        Self {
            backend: Some("memory".to_string()),
            path: None,
        }
    }
}

/// Store backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendType {
    /// In-process store, empty on start
    Memory,
    /// Directory of JSON files
    Local,
}

/// Resolved store configuration
#[derive(Debug, Clone)]
pub struct ResolvedStoreConfig {
    /// Backend type
    pub backend: StoreBackendType,

    /// Root directory (for local backend)
    pub path: Option<PathBuf>,
}

impl ResolvedStoreConfig {
    /// Resolve the backend, inferring it from the configured fields when unset
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend = match config.backend.as_deref() {
            Some("memory") => StoreBackendType::Memory,
            Some("local") | Some("json") => StoreBackendType::Local,
            Some(other) => {
                return Err(StoreError::Config(format!("unknown backend: {}", other)));
            }
            None => {
                if config.path.is_some() {
                    StoreBackendType::Local
                } else {
                    return Err(StoreError::Config(
                        "no store backend configured. Options:\n  \
                         1. backend = \"local\" with path = \"data/\"\n  \
                         2. backend = \"memory\""
                            .to_string(),
                    ));
                }
            }
        };

        if backend == StoreBackendType::Local && config.path.is_none() {
            return Err(StoreError::Config(
                "path required for local backend".to_string(),
            ));
        }

        Ok(Self {
            backend,
            path: config.path.clone(),
        })
    }
}

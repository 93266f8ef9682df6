//! Local backend reading channel documents from JSON files
//!
//! # File Organization
//!
//! ```text
//! {base_path}/
//! └── {project_id}/
//!     ├── smart_properties.json
//!     ├── google_ads/
//!     │   └── 2021-02/
//!     │       └── campaigns.json
//!     └── facebook_ads/
//!         └── insights.json
//! ```
//!
//! Every `*.json` file below a channel directory holds an array of documents.
//! A channel counts as connected when its directory exists.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::backend::{DocumentStore, SmartPropertyStore};
use crate::document::{DateRange, RawDocument, SmartPropertyRule, SmartPropertyTag};
use crate::error::StoreError;

/// Name of the per-project smart-property file
pub const SMART_PROPERTIES_FILE: &str = "smart_properties.json";

/// Contents of `smart_properties.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmartPropertiesFile {
    /// Rule definitions in evaluation order
    #[serde(default)]
    pub rules: Vec<SmartPropertyRule>,

    /// Materialized entity tags
    #[serde(default)]
    pub tags: Vec<SmartPropertyTag>,
}

/// Size and modification time identifying one version of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

/// Parsed smart-property file with the version it was read from
#[derive(Debug)]
struct CachedProperties {
    stamp: FileStamp,
    contents: Arc<SmartPropertiesFile>,
}

/// Store backed by a directory of JSON files
#[derive(Debug, Clone)]
pub struct LocalStore {
    /// Root directory holding one subdirectory per project
    base_path: PathBuf,
    /// Parsed smart-property files by project, reread when the file changes
    smart_properties: Arc<RwLock<HashMap<u64, CachedProperties>>>,
}

impl LocalStore {
    /// Create a new local store
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            smart_properties: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Root directory
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn project_dir(&self, project_id: u64) -> PathBuf {
        self.base_path.join(project_id.to_string())
    }

    /// Discover all document files for a channel
    fn discover_files(&self, project_id: u64, channel: &str) -> Result<Vec<PathBuf>, StoreError> {
        let pattern = format!(
            "{}/{}/{}/**/*.json",
            self.base_path.display(),
            project_id,
            channel
        );

        let files: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();

        tracing::debug!(
            channel = channel,
            file_count = files.len(),
            "discovered document files"
        );

        Ok(files)
    }

    fn read_documents(path: &Path) -> Result<Vec<RawDocument>, StoreError> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            StoreError::Malformed(format!("{}: {}", path.display(), e))
        })
    }

    /// Smart-property file of a project, parsed at most once per version
    fn smart_properties(&self, project_id: u64) -> Result<Arc<SmartPropertiesFile>, StoreError> {
        let path = self.project_dir(project_id).join(SMART_PROPERTIES_FILE);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.smart_properties.write().remove(&project_id);
                return Ok(Arc::default());
            }
            Err(e) => return Err(e.into()),
        };
        let stamp = FileStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        };

        if let Some(cached) = self.smart_properties.read().get(&project_id)
            && cached.stamp == stamp
        {
            return Ok(Arc::clone(&cached.contents));
        }

        let contents = fs::read_to_string(&path)?;
        let parsed: SmartPropertiesFile = serde_json::from_str(&contents).map_err(|e| {
            StoreError::Malformed(format!("{}: {}", path.display(), e))
        })?;
        let parsed = Arc::new(parsed);

        tracing::debug!(
            project_id = project_id,
            rules = parsed.rules.len(),
            tags = parsed.tags.len(),
            "loaded smart properties file"
        );

        self.smart_properties.write().insert(
            project_id,
            CachedProperties {
                stamp,
                contents: Arc::clone(&parsed),
            },
        );
        Ok(parsed)
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn fetch(
        &self,
        project_id: u64,
        channel: &str,
        type_alias: &str,
        range: DateRange,
    ) -> Result<Vec<RawDocument>, StoreError> {
        let mut documents = Vec::new();

        for file in self.discover_files(project_id, channel)? {
            documents.extend(
                Self::read_documents(&file)?
                    .into_iter()
                    .filter(|d| d.type_alias == type_alias && range.contains_timestamp(d.timestamp)),
            );
        }

        Ok(documents)
    }

    async fn list_connected_channels(&self, project_id: u64) -> Result<Vec<String>, StoreError> {
        let dir = self.project_dir(project_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut channels = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                channels.push(name.to_string());
            }
        }
        channels.sort();

        Ok(channels)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[async_trait]
impl SmartPropertyStore for LocalStore {
    async fn get_rules(
        &self,
        project_id: u64,
        object_type: &str,
    ) -> Result<Vec<SmartPropertyRule>, StoreError> {
        Ok(self
            .smart_properties(project_id)?
            .rules
            .iter()
            .filter(|r| r.object_type == object_type)
            .cloned()
            .collect())
    }

    async fn get_tag(
        &self,
        project_id: u64,
        object_type: &str,
        entity_id: &str,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        Ok(self
            .smart_properties(project_id)?
            .tags
            .iter()
            .find(|t| t.object_type == object_type && t.entity_id == entity_id)
            .map(|t| t.properties.clone()))
    }
}

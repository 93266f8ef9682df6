//! In-memory store
//!
//! Holds documents, connected channels and smart-property data in process.
//! Used by tests and by callers that materialize documents themselves.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::backend::{DocumentStore, SmartPropertyStore};
use crate::document::{DateRange, RawDocument, SmartPropertyRule};
use crate::error::StoreError;

/// Thread-safe in-memory document and smart-property store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// (project, channel) -> documents
    documents: HashMap<(u64, String), Vec<RawDocument>>,
    /// project -> channels in connection order
    connected: HashMap<u64, Vec<String>>,
    /// (project, object type) -> rules in definition order
    rules: HashMap<(u64, String), Vec<SmartPropertyRule>>,
    /// (project, object type, entity) -> custom property values
    tags: HashMap<(u64, String, String), BTreeMap<String, String>>,
    /// (project, channel) pairs whose source is down
    unavailable: HashSet<(u64, String)>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a channel as connected for a project
    pub fn connect_channel(&self, project_id: u64, channel: &str) {
        let mut inner = self.inner.write();
        let channels = inner.connected.entry(project_id).or_default();
        if !channels.iter().any(|c| c == channel) {
            channels.push(channel.to_string());
        }
    }

    /// Insert a document; the channel becomes connected
    pub fn insert_document(&self, project_id: u64, channel: &str, document: RawDocument) {
        self.connect_channel(project_id, channel);
        self.inner
            .write()
            .documents
            .entry((project_id, channel.to_string()))
            .or_default()
            .push(document);
    }

    /// Add a smart-property rule after the existing rules of its object type
    pub fn add_rule(&self, project_id: u64, rule: SmartPropertyRule) {
        self.inner
            .write()
            .rules
            .entry((project_id, rule.object_type.clone()))
            .or_default()
            .push(rule);
    }

    /// Set materialized custom property values for an entity
    pub fn set_tag(
        &self,
        project_id: u64,
        object_type: &str,
        entity_id: &str,
        properties: BTreeMap<String, String>,
    ) {
        self.inner.write().tags.insert(
            (project_id, object_type.to_string(), entity_id.to_string()),
            properties,
        );
    }

    /// Make fetches for a channel fail with a connection error
    pub fn mark_unavailable(&self, project_id: u64, channel: &str) {
        self.inner
            .write()
            .unavailable
            .insert((project_id, channel.to_string()));
    }

    /// Number of documents held for a channel
    pub fn document_count(&self, project_id: u64, channel: &str) -> usize {
        self.inner
            .read()
            .documents
            .get(&(project_id, channel.to_string()))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(
        &self,
        project_id: u64,
        channel: &str,
        type_alias: &str,
        range: DateRange,
    ) -> Result<Vec<RawDocument>, StoreError> {
        let inner = self.inner.read();
        let key = (project_id, channel.to_string());

        if inner.unavailable.contains(&key) {
            return Err(StoreError::Connection(format!(
                "{} source unavailable for project {}",
                channel, project_id
            )));
        }

        let documents: Vec<RawDocument> = inner
            .documents
            .get(&key)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.type_alias == type_alias && range.contains_timestamp(d.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(
            channel = channel,
            type_alias = type_alias,
            documents = documents.len(),
            "fetched documents from memory"
        );

        Ok(documents)
    }

    async fn list_connected_channels(&self, project_id: u64) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .connected
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl SmartPropertyStore for MemoryStore {
    async fn get_rules(
        &self,
        project_id: u64,
        object_type: &str,
    ) -> Result<Vec<SmartPropertyRule>, StoreError> {
        Ok(self
            .inner
            .read()
            .rules
            .get(&(project_id, object_type.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_tag(
        &self,
        project_id: u64,
        object_type: &str,
        entity_id: &str,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        Ok(self
            .inner
            .read()
            .tags
            .get(&(project_id, object_type.to_string(), entity_id.to_string()))
            .cloned())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

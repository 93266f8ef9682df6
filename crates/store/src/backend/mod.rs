//! Store traits and backends

pub mod local;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::document::{DateRange, RawDocument, SmartPropertyRule};
use crate::error::StoreError;

/// Source of raw per-channel documents
///
/// Implemented by the in-memory and local file backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch documents of one report kind for a project and day range
    async fn fetch(
        &self,
        project_id: u64,
        channel: &str,
        type_alias: &str,
        range: DateRange,
    ) -> Result<Vec<RawDocument>, StoreError>;

    /// Channels with data configured for the project
    async fn list_connected_channels(&self, project_id: u64) -> Result<Vec<String>, StoreError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Read-only access to smart-property definitions and materialized tags
#[async_trait]
pub trait SmartPropertyStore: Send + Sync {
    /// Rules for an object type, in definition order
    async fn get_rules(
        &self,
        project_id: u64,
        object_type: &str,
    ) -> Result<Vec<SmartPropertyRule>, StoreError>;

    /// Materialized custom property values for an entity, if any
    async fn get_tag(
        &self,
        project_id: u64,
        object_type: &str,
        entity_id: &str,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError>;
}

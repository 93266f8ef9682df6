//! KPI Engine - channel analytics queries
//!
//! Answers KPI query groups over advertising and organic-search channels.
//! Each sub-query selects a channel (or the union of all ad channels),
//! filters and groups that channel's daily documents, optionally buckets
//! them by day, week or month, and returns a header/row table.
//!
//! # Overview
//!
//! - **Registry**: channels, object hierarchies, dimensions and metrics
//! - **Predicates**: filters compiled into OR-of-AND groups
//! - **Smart properties**: operator-defined tags on campaigns and ad groups
//! - **Executor**: per-channel typed pipeline from documents to a partial table
//! - **Merger**: concurrent channel fan-out and deterministic union
//! - **Legacy**: the older `channel_v1` query format
//! - **Filter values**: distinct property values offered as filter operands
//!
//! # Usage
//!
//! ```ignore
//! use kpi_engine::{KpiEngine, KpiQuery, KpiQueryGroup};
//! use kpi_store::{MemoryStore, StoreHandles};
//!
//! let engine = KpiEngine::new(StoreHandles::new(Arc::new(MemoryStore::new())));
//! let group = KpiQueryGroup::new(vec![
//!     KpiQuery::new("google_ads_metrics", &["impressions"]).with_range(from, to),
//! ]);
//! let tables = engine.execute_query_group(1, "req-1", &group).await?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod filter_values;
pub mod legacy;
pub mod merger;
pub mod predicate;
pub mod query;
pub mod registry;
pub mod result;
pub mod smart_property;
pub mod timerange;

#[cfg(test)]
mod filter_values_test;
#[cfg(test)]
mod registry_test;

// Re-exports for convenience
pub use config::{Config, EngineConfig, LogConfig, LogLevel};
pub use error::{QueryError, Result};
pub use legacy::{ChannelGroupQueryV1, ChannelQueryV1, legacy_headers};
pub use legacy::transform as transform_legacy_query;
pub use query::{
    Condition, DataType, Granularity, KpiFilter, KpiGroupBy, KpiQuery, KpiQueryGroup, LogicalOp,
    NONE_VALUE,
};
pub use registry::Registry;
pub use result::ResultTable;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use kpi_store::{DateRange, DocumentStore, SmartPropertyStore, StoreHandles};

use crate::merger::{QueryContext, prepare_query};
use crate::smart_property::SmartPropertyOverlay;

/// HTTP-style status of a successful execution
pub const STATUS_OK: u16 = 200;

/// Query engine over a document store
#[derive(Clone)]
pub struct KpiEngine {
    registry: Arc<Registry>,
    documents: Arc<dyn DocumentStore>,
    smart_properties: Arc<dyn SmartPropertyStore>,
    config: EngineConfig,
}

impl std::fmt::Debug for KpiEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpiEngine")
            .field("backend", &self.documents.name())
            .field("config", &self.config)
            .finish()
    }
}

impl KpiEngine {
    /// Create an engine with the standard registry and default settings
    pub fn new(stores: StoreHandles) -> Self {
        Self {
            registry: Arc::new(Registry::standard()),
            documents: stores.documents,
            smart_properties: stores.smart_properties,
            config: EngineConfig::default(),
        }
    }

    /// Use the given settings
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom channel registry
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Channel registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a query group under the configured timeout
    ///
    /// Returns one table per sub-query, in order.
    pub async fn execute_query_group(
        &self,
        project_id: u64,
        request_id: &str,
        group: &KpiQueryGroup,
    ) -> Result<Vec<ResultTable>> {
        self.execute_query_group_with_timeout(project_id, request_id, group, self.config.query_timeout())
            .await
    }

    /// Execute a query group under a caller-supplied timeout
    pub async fn execute_query_group_with_timeout(
        &self,
        project_id: u64,
        request_id: &str,
        group: &KpiQueryGroup,
        timeout: Duration,
    ) -> Result<Vec<ResultTable>> {
        tracing::info!(
            project_id = project_id,
            request_id = request_id,
            queries = group.queries.len(),
            "executing kpi query group"
        );

        let result = tokio::time::timeout(timeout, self.run_group(project_id, group)).await;

        match result {
            Ok(Ok(tables)) => Ok(tables),
            Ok(Err(e)) => {
                tracing::info!(
                    project_id = project_id,
                    request_id = request_id,
                    status = e.status_code(),
                    error = %e,
                    "kpi query group failed"
                );
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    project_id = project_id,
                    request_id = request_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "kpi query group timed out"
                );
                Err(QueryError::Timeout(timeout))
            }
        }
    }

    /// Execute a query group and report an HTTP-style status
    ///
    /// Failures yield no tables and the error's status code.
    pub async fn execute_query_group_with_status(
        &self,
        project_id: u64,
        request_id: &str,
        group: &KpiQueryGroup,
    ) -> (Vec<ResultTable>, u16) {
        match self.execute_query_group(project_id, request_id, group).await {
            Ok(tables) => (tables, STATUS_OK),
            Err(e) => (Vec::new(), e.status_code()),
        }
    }

    /// Translate and execute a legacy query group
    pub async fn execute_legacy_query_group(
        &self,
        project_id: u64,
        request_id: &str,
        group: &ChannelGroupQueryV1,
    ) -> Result<Vec<ResultTable>> {
        let canonical = transform_legacy_query(group)?;
        self.execute_query_group(project_id, request_id, &canonical).await
    }

    /// Distinct values of a property over the configured lookback window
    ///
    /// The window ends today (UTC) and spans `filter_values_lookback_days`.
    pub async fn filter_values(
        &self,
        project_id: u64,
        display_category: &str,
        object_type: &str,
        property: &str,
    ) -> Result<Vec<String>> {
        let end = Utc::now().date_naive();
        let start = end
            .checked_sub_days(Days::new(self.config.filter_values_lookback_days.into()))
            .unwrap_or(NaiveDate::MIN);
        self.filter_values_in(
            project_id,
            display_category,
            object_type,
            property,
            DateRange::new(start, end),
        )
        .await
    }

    /// Distinct values of a property over an explicit date range
    pub async fn filter_values_in(
        &self,
        project_id: u64,
        display_category: &str,
        object_type: &str,
        property: &str,
        range: DateRange,
    ) -> Result<Vec<String>> {
        let timeout = self.config.query_timeout();
        let listing = async {
            let overlay = SmartPropertyOverlay::load(
                Arc::clone(&self.smart_properties),
                project_id,
                &self.registry,
                [object_type],
            )
            .await?;
            let ctx = self.context(project_id, overlay);
            filter_values::filter_values(&ctx, display_category, object_type, property, range)
                .await
        };

        tokio::time::timeout(timeout, listing)
            .await
            .map_err(|_| QueryError::Timeout(timeout))?
    }

    fn context(&self, project_id: u64, overlay: SmartPropertyOverlay) -> QueryContext {
        QueryContext {
            registry: Arc::clone(&self.registry),
            documents: Arc::clone(&self.documents),
            overlay: Arc::new(overlay),
            project_id,
            default_timezone: self.config.default_timezone.clone(),
        }
    }

    async fn run_group(&self, project_id: u64, group: &KpiQueryGroup) -> Result<Vec<ResultTable>> {
        group.validate()?;
        let queries = group.effective_queries();

        let object_types = queries.iter().flat_map(|q| {
            q.filters
                .iter()
                .map(|f| f.object_type.as_str())
                .chain(q.group_by.iter().map(|g| g.object_type.as_str()))
        });
        let overlay = SmartPropertyOverlay::load(
            Arc::clone(&self.smart_properties),
            project_id,
            &self.registry,
            object_types,
        )
        .await?;
        let ctx = self.context(project_id, overlay);

        // Compile every sub-query before the first fetch
        let mut prepared = Vec::with_capacity(queries.len());
        for query in &queries {
            prepared.push(prepare_query(&ctx, query).await?);
        }

        let mut tables = Vec::with_capacity(prepared.len());
        for query in prepared {
            tables.push(query.run(&ctx).await?);
        }
        Ok(tables)
    }
}

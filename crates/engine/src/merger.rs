//! Sub-query execution across channels
//!
//! A display category selects one channel or the all-channels union. Each
//! selected channel runs as its own task; results merge in channel order.

use std::sync::Arc;

use kpi_store::DocumentStore;
use tokio::task::JoinSet;

use crate::error::{QueryError, Result};
use crate::executor::Compiled;
use crate::query::KpiQuery;
use crate::registry::{ALL_CHANNELS_ID, AllChannelsSpec, ChannelSelector, Registry};
use crate::result::{MetricColumn, PartialTable, ResultTable};
use crate::smart_property::SmartPropertyOverlay;
use crate::timerange::TimeRange;

/// Shared, read-only inputs of one sub-query execution
#[derive(Clone)]
pub struct QueryContext {
    /// Channel catalog
    pub registry: Arc<Registry>,
    /// Document source
    pub documents: Arc<dyn DocumentStore>,
    /// Smart-property definitions for the project
    pub overlay: Arc<SmartPropertyOverlay>,
    /// Project to query
    pub project_id: u64,
    /// Timezone used when a query has none
    pub default_timezone: String,
}

/// A sub-query with every channel compiled, nothing fetched yet
#[derive(Debug)]
pub struct PreparedQuery {
    query: KpiQuery,
    range: TimeRange,
    channels: Vec<Compiled>,
}

impl PreparedQuery {
    /// Channels that will run
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.plan().channel.id)
    }

    /// Run the channels and render the merged table
    pub async fn run(self, ctx: &QueryContext) -> Result<ResultTable> {
        let Self {
            query,
            range,
            channels,
        } = self;

        let mut table = if channels.is_empty() {
            empty_table(&query, &range)
        } else {
            run_channels(ctx, channels).await?
        };
        table.join_grid()?;

        Ok(table.render(&query.display_category, &range.timezone()))
    }
}

/// Resolve the time range and compile every selected channel
pub async fn prepare_query(ctx: &QueryContext, query: &KpiQuery) -> Result<PreparedQuery> {
    let range = TimeRange::new(query.from, query.to, &query.timezone, &ctx.default_timezone)?;

    let channels = match ctx.registry.select(&query.display_category)? {
        ChannelSelector::Single(channel) => {
            vec![Compiled::compile(channel, query, &range, &ctx.overlay)?]
        }
        ChannelSelector::All(all) => compile_members(ctx, &all, query, &range).await?,
    };

    Ok(PreparedQuery {
        query: query.clone(),
        range,
        channels,
    })
}

/// Execute one effective sub-query
pub async fn execute_query(ctx: &QueryContext, query: &KpiQuery) -> Result<ResultTable> {
    prepare_query(ctx, query).await?.run(ctx).await
}

/// Compile the all-channels query for every connected member
///
/// Members lacking a requested dimension are skipped. When every member is
/// skipped, the first member's error is returned.
async fn compile_members(
    ctx: &QueryContext,
    all: &AllChannelsSpec,
    query: &KpiQuery,
    range: &TimeRange,
) -> Result<Vec<Compiled>> {
    all.check_metrics(&query.metrics)?;

    let connected = ctx
        .documents
        .list_connected_channels(ctx.project_id)
        .await
        .map_err(|e| QueryError::source(ALL_CHANNELS_ID, e))?;

    let mut compiled = Vec::new();
    let mut first_error = None;

    for channel in all.members.iter().filter(|c| connected.iter().any(|id| id == c.id)) {
        match Compiled::compile(Arc::clone(channel), query, range, &ctx.overlay) {
            Ok(c) => compiled.push(c),
            Err(e @ QueryError::UnknownDimension { .. }) => {
                tracing::warn!(
                    channel = channel.id,
                    error = %e,
                    "skipping channel without requested dimension"
                );
                first_error.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    match first_error {
        Some(e) if compiled.is_empty() => Err(e),
        _ => Ok(compiled),
    }
}

/// Run compiled channels concurrently and merge their tables in order
async fn run_channels(ctx: &QueryContext, compiled: Vec<Compiled>) -> Result<PartialTable> {
    let count = compiled.len();
    let mut tasks = JoinSet::new();

    for (index, channel) in compiled.into_iter().enumerate() {
        let documents = Arc::clone(&ctx.documents);
        let overlay = Arc::clone(&ctx.overlay);
        let project_id = ctx.project_id;
        tasks.spawn(async move {
            let result = channel.run(documents.as_ref(), &overlay, project_id).await;
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<PartialTable>>> = (0..count).map(|_| None).collect();

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                tasks.abort_all();
                return Err(QueryError::TaskFailed(e.to_string()));
            }
        };
        slots[index] = Some(result);

        if let Some(failed) = first_error(&slots)
            && let Some(Err(e)) = slots[failed].take()
        {
            tasks.abort_all();
            return Err(e);
        }
    }

    let mut tables = slots.into_iter().flatten();
    let mut merged = match tables.next() {
        Some(first) => first?,
        None => return Err(QueryError::TaskFailed("no channel results".to_string())),
    };
    for table in tables {
        merged.merge(table?);
    }

    tracing::debug!(channels = count, rows = merged.rows.len(), "channel results merged");
    Ok(merged)
}

/// Index of the first failed channel once every earlier channel finished
fn first_error(slots: &[Option<Result<PartialTable>>]) -> Option<usize> {
    for (index, slot) in slots.iter().enumerate() {
        match slot {
            None => return None,
            Some(Err(_)) => return Some(index),
            Some(Ok(_)) => {}
        }
    }
    None
}

fn empty_table(query: &KpiQuery, range: &TimeRange) -> PartialTable {
    let metrics = query
        .metrics
        .iter()
        .map(|name| MetricColumn {
            name: name.clone(),
            ratio_multiplier: None,
        })
        .collect();
    let buckets = query
        .granularity()
        .ok()
        .flatten()
        .map(|g| range.buckets(g));

    PartialTable::new(
        query.group_by.iter().map(|g| g.header()).collect(),
        metrics,
        buckets,
    )
}

#[cfg(test)]
#[path = "merger_test.rs"]
mod merger_test;

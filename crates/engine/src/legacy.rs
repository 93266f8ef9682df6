//! Legacy channel query format
//!
//! Older dashboards send `channel_v1` query groups using long field names
//! and per-channel object vocabularies. They are translated into the
//! canonical model before execution; results can be relabelled with the
//! legacy column names.

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::query::{
    CHANNELS_CATEGORY, Condition, KPI_CLASS, KpiFilter, KpiGroupBy, KpiQuery,
    KpiQueryGroup, LogicalOp, property_header, string_or_empty,
};
use crate::result::ResultTable;

/// Class of legacy channel query groups
pub const LEGACY_CLASS: &str = "channel_v1";

/// Legacy channel identifiers and their display categories
const CHANNEL_CATEGORIES: &[(&str, &str)] = &[
    ("google_ads", "google_ads_metrics"),
    ("facebook_ads", "facebook_metrics"),
    ("linkedin_ads", "linkedin_metrics"),
    ("search_console", "google_organic_metrics"),
    ("bing_ads", "bing_ads_metrics"),
    ("all_ads", "all_channels_metrics"),
];

/// A legacy query group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelGroupQueryV1 {
    /// Query class, `channel_v1`
    #[serde(rename = "cl", default)]
    pub class: String,

    /// Channel sub-queries
    #[serde(default)]
    pub query_group: Vec<ChannelQueryV1>,
}

/// A legacy channel sub-query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelQueryV1 {
    /// Legacy channel identifier (`google_ads`, `all_ads`, ...)
    pub channel: String,

    /// Metric names
    #[serde(default)]
    pub select_metrics: Vec<String>,

    /// Filters
    #[serde(default)]
    pub filters: Vec<ChannelFilterV1>,

    /// Group-bys
    #[serde(default)]
    pub group_by: Vec<ChannelGroupByV1>,

    /// Granularity; a string, `null` or `false`
    #[serde(default, deserialize_with = "string_or_empty")]
    pub gbt: String,

    /// IANA timezone
    #[serde(default)]
    pub time_zone: String,

    /// Range start, epoch seconds
    #[serde(default)]
    pub fr: i64,

    /// Range end, epoch seconds
    #[serde(default)]
    pub to: i64,
}

/// A legacy filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFilterV1 {
    /// Object name (`campaign`, `ad_set`, ...)
    pub name: String,
    /// Property of the object
    pub property: String,
    /// Condition
    pub condition: String,
    /// Comparison value
    #[serde(default)]
    pub value: String,
    /// `AND` or `OR`
    #[serde(default)]
    pub logical_operator: String,
}

/// A legacy group-by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelGroupByV1 {
    /// Object name
    pub name: String,
    /// Property of the object
    pub property: String,
}

/// Translate a legacy query group into the canonical model
pub fn transform(group: &ChannelGroupQueryV1) -> Result<KpiQueryGroup> {
    if !group.class.is_empty() && group.class != LEGACY_CLASS {
        return Err(QueryError::InvalidQuery(format!(
            "unsupported legacy query class: {}",
            group.class
        )));
    }

    let queries = group
        .query_group
        .iter()
        .map(transform_query)
        .collect::<Result<Vec<_>>>()?;

    Ok(KpiQueryGroup {
        class: KPI_CLASS.to_string(),
        queries,
        global_filters: Vec::new(),
        global_group_by: Vec::new(),
    })
}

fn transform_query(query: &ChannelQueryV1) -> Result<KpiQuery> {
    let filters = query
        .filters
        .iter()
        .map(transform_filter)
        .collect::<Result<Vec<_>>>()?;

    let group_by = query
        .group_by
        .iter()
        .map(|g| KpiGroupBy::new(object_type(&g.name), g.property.clone()))
        .collect();

    Ok(KpiQuery {
        category: CHANNELS_CATEGORY.to_string(),
        display_category: display_category(&query.channel)?.to_string(),
        metrics: query.select_metrics.iter().map(|m| metric_name(m)).collect(),
        filters,
        group_by,
        group_by_timestamp: query.gbt.clone(),
        timezone: query.time_zone.clone(),
        from: query.fr,
        to: query.to,
    })
}

fn transform_filter(filter: &ChannelFilterV1) -> Result<KpiFilter> {
    let condition = Condition::parse(&filter.condition)?;
    Ok(KpiFilter {
        logical_op: LogicalOp::parse(&filter.logical_operator),
        ..KpiFilter::new(
            object_type(&filter.name),
            filter.property.clone(),
            condition,
            filter.value.clone(),
        )
    })
}

/// Display category of a legacy channel
pub fn display_category(channel: &str) -> Result<&'static str> {
    CHANNEL_CATEGORIES
        .iter()
        .find(|(legacy, _)| *legacy == channel)
        .map(|(_, category)| *category)
        .ok_or_else(|| QueryError::UnknownChannel(channel.to_string()))
}

/// Canonical object type of a legacy object name
pub fn object_type(name: &str) -> String {
    match name {
        "ad_set" | "adset" => "ad_group".to_string(),
        other => other.to_string(),
    }
}

/// Canonical metric name of a legacy metric
pub fn metric_name(name: &str) -> String {
    match name {
        "conversion" => "conversions".to_string(),
        "cost" => "spend".to_string(),
        other => other.to_string(),
    }
}

/// Relabel a result with the legacy column names of its query
///
/// Group columns become `{name}_{property}` with the legacy object name and
/// metric columns the metric names as requested.
pub fn legacy_headers(query: &ChannelQueryV1, table: &ResultTable) -> Result<Vec<String>> {
    let category = display_category(&query.channel)?;

    Ok(table
        .headers
        .iter()
        .map(|header| {
            let group = query
                .group_by
                .iter()
                .find(|g| property_header(&object_type(&g.name), &g.property) == *header);
            if let Some(g) = group {
                return format!("{}_{}", g.name, g.property);
            }
            query
                .select_metrics
                .iter()
                .find(|m| format!("{}_{}", category, metric_name(m)) == *header)
                .cloned()
                .unwrap_or_else(|| header.clone())
        })
        .collect())
}

#[cfg(test)]
#[path = "legacy_test.rs"]
mod legacy_test;

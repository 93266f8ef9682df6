//! Tests for multi-channel execution

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kpi_store::{
    DateRange, MemoryStore, RawDocument, SmartPropertyRule, SmartPropertyStore, StoreError,
};
use serde_json::{Value, json};

use super::*;
use crate::query::{Condition, KpiFilter, KpiGroupBy};

const PROJECT: u64 = 3;
const FROM: i64 = 1612314000;
const TO: i64 = 1612746000;

// =============================================================================
// Test Helpers
// =============================================================================

/// Document store whose channels fail or stall on demand
struct ScriptedStore {
    inner: MemoryStore,
    failing: Vec<(&'static str, Duration)>,
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn fetch(
        &self,
        project_id: u64,
        channel: &str,
        type_alias: &str,
        range: DateRange,
    ) -> std::result::Result<Vec<RawDocument>, StoreError> {
        if let Some((_, delay)) = self.failing.iter().find(|(c, _)| *c == channel) {
            tokio::time::sleep(*delay).await;
            return Err(StoreError::Connection(format!("{} is down", channel)));
        }
        self.inner.fetch(project_id, channel, type_alias, range).await
    }

    async fn list_connected_channels(
        &self,
        project_id: u64,
    ) -> std::result::Result<Vec<String>, StoreError> {
        self.inner.list_connected_channels(project_id).await
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[async_trait]
impl SmartPropertyStore for ScriptedStore {
    async fn get_rules(
        &self,
        project_id: u64,
        object_type: &str,
    ) -> std::result::Result<Vec<SmartPropertyRule>, StoreError> {
        self.inner.get_rules(project_id, object_type).await
    }

    async fn get_tag(
        &self,
        project_id: u64,
        object_type: &str,
        entity_id: &str,
    ) -> std::result::Result<Option<BTreeMap<String, String>>, StoreError> {
        self.inner.get_tag(project_id, object_type, entity_id).await
    }
}

/// One campaign-level document per ad channel with distinct magnitudes
fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_document(
        PROJECT,
        "google_ads",
        RawDocument::new(
            "g1",
            "campaign_performance_report",
            20210205,
            json!({"campaign_id": "g1", "campaign_name": "Brand", "impressions": 10000, "clicks": 100, "cost": 5_000_000}),
        ),
    );
    store.insert_document(
        PROJECT,
        "facebook_ads",
        RawDocument::new(
            "f1",
            "campaign_insights",
            20210205,
            json!({"campaign_id": "f1", "campaign_name": "Brand", "impressions": "1000", "clicks": "10", "spend": "2.5"}),
        ),
    );
    store.insert_document(
        PROJECT,
        "linkedin_ads",
        RawDocument::new(
            "l1",
            "campaign_group_insights",
            20210205,
            json!({"campaign_group_id": "l1", "campaign_group_name": "Brand", "impressions": 100, "clicks": 1, "costInLocalCurrency": "1.5"}),
        ),
    );
    store
}

fn context<S>(store: Arc<S>) -> QueryContext
where
    S: DocumentStore + SmartPropertyStore + 'static,
{
    QueryContext {
        registry: Arc::new(Registry::standard()),
        documents: store.clone(),
        overlay: Arc::new(SmartPropertyOverlay::empty(store, PROJECT)),
        project_id: PROJECT,
        default_timezone: "UTC".to_string(),
    }
}

fn all_channels(metrics: &[&str]) -> KpiQuery {
    KpiQuery::new("all_channels_metrics", metrics).with_range(FROM, TO)
}

// =============================================================================
// All channels
// =============================================================================

#[tokio::test]
async fn test_all_channels_totals() {
    let ctx = context(Arc::new(seeded_store()));

    let table = execute_query(&ctx, &all_channels(&["impressions", "spend"]))
        .await
        .unwrap();

    assert_eq!(
        table.headers,
        vec!["all_channels_metrics_impressions", "all_channels_metrics_spend"]
    );
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0][0], json!(11100.0));
    assert_eq!(table.rows[0][1], json!(9.0));
}

#[tokio::test]
async fn test_all_channels_by_channel_name() {
    let ctx = context(Arc::new(seeded_store()));
    let query = all_channels(&["impressions"]).with_group_by(KpiGroupBy::new("channel", "name"));

    let table = execute_query(&ctx, &query).await.unwrap();

    assert_eq!(table.headers, vec!["channel_name", "all_channels_metrics_impressions"]);
    let labels: Vec<&Value> = table.rows.iter().map(|r| &r[0]).collect();
    assert_eq!(labels, vec!["Facebook Ads", "Google Ads", "LinkedIn Ads"]);
}

#[tokio::test]
async fn test_all_channels_channel_name_filter() {
    let ctx = context(Arc::new(seeded_store()));
    let query = all_channels(&["impressions"]).with_filter(KpiFilter::new(
        "channel",
        "name",
        Condition::Equals,
        "Facebook Ads",
    ));

    let table = execute_query(&ctx, &query).await.unwrap();
    assert_eq!(table.rows, vec![vec![json!(1000.0)]]);
}

#[tokio::test]
async fn test_all_channels_skips_channels_without_dimension() {
    let ctx = context(Arc::new(seeded_store()));
    let query = all_channels(&["impressions"]).with_group_by(KpiGroupBy::new("keyword", "name"));

    let prepared = prepare_query(&ctx, &query).await.unwrap();
    assert_eq!(prepared.channels().collect::<Vec<_>>(), vec!["google_ads"]);
}

#[tokio::test]
async fn test_all_channels_dimension_missing_everywhere() {
    let ctx = context(Arc::new(seeded_store()));
    let query =
        all_channels(&["impressions"]).with_group_by(KpiGroupBy::new("company", "domain"));

    let err = prepare_query(&ctx, &query).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnknownDimension { ref channel, .. } if channel == "google_ads"
    ));
}

#[tokio::test]
async fn test_all_channels_rejects_uncommon_metric() {
    let ctx = context(Arc::new(seeded_store()));

    let err = prepare_query(&ctx, &all_channels(&["conversions"]))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownMetric { .. }));
}

#[tokio::test]
async fn test_all_channels_only_connected_members() {
    let store = MemoryStore::new();
    store.connect_channel(PROJECT, "linkedin_ads");
    store.connect_channel(PROJECT, "search_console");
    let ctx = context(Arc::new(store));

    let prepared = prepare_query(&ctx, &all_channels(&["clicks"])).await.unwrap();
    assert_eq!(prepared.channels().collect::<Vec<_>>(), vec!["linkedin_ads"]);
}

#[tokio::test]
async fn test_all_channels_nothing_connected() {
    let ctx = context(Arc::new(MemoryStore::new()));

    let table = execute_query(&ctx, &all_channels(&["clicks"])).await.unwrap();
    assert_eq!(table.headers, vec!["all_channels_metrics_clicks"]);
    assert_eq!(table.rows, vec![vec![json!(0)]]);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_channel_failure_fails_query() {
    let store = seeded_store();
    store.mark_unavailable(PROJECT, "facebook_ads");
    let ctx = context(Arc::new(store));

    let err = execute_query(&ctx, &all_channels(&["impressions"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::SourceUnavailable { ref channel, .. } if channel == "facebook_ads"
    ));
}

#[tokio::test]
async fn test_first_error_in_channel_order() {
    let store = ScriptedStore {
        inner: seeded_store(),
        failing: vec![
            ("google_ads", Duration::from_millis(50)),
            ("linkedin_ads", Duration::ZERO),
        ],
    };
    let ctx = context(Arc::new(store));

    let err = execute_query(&ctx, &all_channels(&["impressions"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::SourceUnavailable { ref channel, .. } if channel == "google_ads"
    ));
}

#[tokio::test]
async fn test_single_channel_query() {
    let ctx = context(Arc::new(seeded_store()));
    let query = KpiQuery::new("linkedin_metrics", &["spend", "cost_per_click"])
        .with_range(FROM, TO)
        .with_group_by(KpiGroupBy::new("campaign", "name"));

    let table = execute_query(&ctx, &query).await.unwrap();
    assert_eq!(
        table.headers,
        vec![
            "campaign_name",
            "linkedin_metrics_spend",
            "linkedin_metrics_cost_per_click"
        ]
    );
    assert_eq!(table.rows, vec![vec![json!("Brand"), json!(1.5), json!(1.5)]]);
}

//! Tests for filter value listing

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use kpi_store::{
    DateRange, MemoryStore, RawDocument, SmartPropertyRule, StoreError, StoreHandles,
    date_to_timestamp,
};
use serde_json::{Value, json};

use crate::filter_values::FILTER_VALUES_LIMIT;
use crate::{KpiEngine, QueryError};

const PROJECT: u64 = 4;

// =============================================================================
// Test Helpers
// =============================================================================

fn engine(store: MemoryStore) -> KpiEngine {
    KpiEngine::new(StoreHandles::new(Arc::new(store)))
}

fn february() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
        NaiveDate::from_ymd_opt(2021, 2, 28).unwrap(),
    )
}

fn google_campaign(id: &str, name: Value, timestamp: u32) -> RawDocument {
    RawDocument::new(
        id,
        "campaign_performance_report",
        timestamp,
        json!({"campaign_id": id, "campaign_name": name, "impressions": 1}),
    )
}

fn rule(name: &str, value: &str, source: &str) -> SmartPropertyRule {
    SmartPropertyRule {
        object_type: "campaign".to_string(),
        name: name.to_string(),
        value: value.to_string(),
        source: source.to_string(),
        filters: Vec::new(),
    }
}

// =============================================================================
// Native dimensions
// =============================================================================

#[tokio::test]
async fn test_native_values_distinct_and_ordered() {
    let store = MemoryStore::new();
    store.insert_document(PROJECT, "google_ads", google_campaign("1", json!("Brand"), 20210204));
    store.insert_document(PROJECT, "google_ads", google_campaign("1", json!("Brand"), 20210205));
    store.insert_document(PROJECT, "google_ads", google_campaign("2", json!("Generic"), 20210205));
    store.insert_document(PROJECT, "google_ads", google_campaign("3", json!(""), 20210205));
    store.insert_document(PROJECT, "google_ads", google_campaign("4", Value::Null, 20210205));
    store.insert_document(PROJECT, "google_ads", google_campaign("5", json!("Retired"), 20210305));
    let engine = engine(store);

    let names = engine
        .filter_values_in(PROJECT, "google_ads_metrics", "campaign", "name", february())
        .await
        .unwrap();
    assert_eq!(names, vec!["Brand", "Generic"]);

    let ids = engine
        .filter_values_in(PROJECT, "google_ads_metrics", "campaign", "id", february())
        .await
        .unwrap();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_values_capped_per_channel() {
    let store = MemoryStore::new();
    for id in 0..FILTER_VALUES_LIMIT + 5 {
        let id = id.to_string();
        store.insert_document(PROJECT, "google_ads", google_campaign(&id, json!(&id), 20210204));
    }

    let ids = engine(store)
        .filter_values_in(PROJECT, "google_ads_metrics", "campaign", "id", february())
        .await
        .unwrap();
    assert_eq!(ids.len(), FILTER_VALUES_LIMIT);
    assert_eq!(ids.first().map(String::as_str), Some("0"));
    assert_eq!(ids.last().map(String::as_str), Some("4999"));
}

#[tokio::test]
async fn test_default_window_ends_today() {
    let today = Utc::now().date_naive();
    let old = today.checked_sub_days(Days::new(200)).unwrap();

    let store = MemoryStore::new();
    store.insert_document(
        PROJECT,
        "google_ads",
        google_campaign("1", json!("Current"), date_to_timestamp(today)),
    );
    store.insert_document(
        PROJECT,
        "google_ads",
        google_campaign("2", json!("Stale"), date_to_timestamp(old)),
    );

    let names = engine(store)
        .filter_values(PROJECT, "google_ads_metrics", "campaign", "name")
        .await
        .unwrap();
    assert_eq!(names, vec!["Current"]);
}

// =============================================================================
// Channel name and smart properties
// =============================================================================

#[tokio::test]
async fn test_channel_name_values() {
    let store = MemoryStore::new();
    store.connect_channel(PROJECT, "facebook_ads");
    store.connect_channel(PROJECT, "google_ads");
    let engine = engine(store);

    let single = engine
        .filter_values_in(PROJECT, "google_ads_metrics", "channel", "name", february())
        .await
        .unwrap();
    assert_eq!(single, vec!["Google Ads"]);

    let all = engine
        .filter_values_in(PROJECT, "all_channels_metrics", "channel", "name", february())
        .await
        .unwrap();
    assert_eq!(all, vec!["Facebook Ads", "Google Ads"]);
}

#[tokio::test]
async fn test_smart_property_values_by_source() {
    let store = MemoryStore::new();
    store.connect_channel(PROJECT, "google_ads");
    store.add_rule(PROJECT, rule("region", "NA", "all"));
    store.add_rule(PROJECT, rule("region", "EU", "google_ads"));
    store.add_rule(PROJECT, rule("region", "APAC", "facebook_ads"));
    store.add_rule(PROJECT, rule("region", "NA", "google_ads"));
    let engine = engine(store);

    let google = engine
        .filter_values_in(PROJECT, "google_ads_metrics", "campaign", "campaign_region", february())
        .await
        .unwrap();
    assert_eq!(google, vec!["EU", "NA"]);

    let all = engine
        .filter_values_in(PROJECT, "all_channels_metrics", "campaign", "region", february())
        .await
        .unwrap();
    assert_eq!(all, vec!["NA"]);

    // Organic search has no campaigns
    let err = engine
        .filter_values_in(PROJECT, "google_organic_metrics", "campaign", "region", february())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownDimension { .. }));
}

// =============================================================================
// All channels
// =============================================================================

#[tokio::test]
async fn test_all_channels_union_of_connected_members() {
    let store = MemoryStore::new();
    store.insert_document(PROJECT, "google_ads", google_campaign("1", json!("Brand"), 20210204));
    store.insert_document(
        PROJECT,
        "facebook_ads",
        RawDocument::new(
            "f1",
            "campaign_insights",
            20210205,
            json!({"campaign_id": "f1", "campaign_name": "Awareness"}),
        ),
    );
    store.insert_document(
        PROJECT,
        "facebook_ads",
        RawDocument::new(
            "f2",
            "campaign_insights",
            20210205,
            json!({"campaign_id": "f2", "campaign_name": "Brand"}),
        ),
    );
    let engine = engine(store);

    let names = engine
        .filter_values_in(PROJECT, "all_channels_metrics", "campaign", "name", february())
        .await
        .unwrap();
    assert_eq!(names, vec!["Awareness", "Brand"]);

    // Google stores keywords but has no keyword documents; Bing is not connected
    let keywords = engine
        .filter_values_in(PROJECT, "all_channels_metrics", "keyword", "name", february())
        .await
        .unwrap();
    assert!(keywords.is_empty());
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_unknown_names_are_caller_errors() {
    let engine = engine(MemoryStore::new());

    let err = engine
        .filter_values_in(PROJECT, "google_ads_metrics", "campaign", "budget", february())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownDimension { .. }));
    assert_eq!(err.status_code(), 400);

    let err = engine
        .filter_values_in(PROJECT, "all_channels_metrics", "company", "domain", february())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownDimension { .. }));

    let err = engine
        .filter_values_in(PROJECT, "tiktok_metrics", "campaign", "name", february())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownChannel(_)));
}

#[tokio::test]
async fn test_store_failure_is_source_unavailable() {
    let store = MemoryStore::new();
    store.insert_document(PROJECT, "google_ads", google_campaign("1", json!("Brand"), 20210204));
    store.mark_unavailable(PROJECT, "google_ads");

    let err = engine(store)
        .filter_values_in(PROJECT, "google_ads_metrics", "campaign", "name", february())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::SourceUnavailable { ref channel, source: StoreError::Connection(_) }
            if channel == "google_ads"
    ));
    assert_eq!(err.status_code(), 503);
}

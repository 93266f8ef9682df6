//! Tests for the in-memory store

use super::*;
use chrono::NaiveDate;
use serde_json::json;

fn range(start: u32, end: u32) -> DateRange {
    let date = |ts: u32| {
        NaiveDate::from_ymd_opt((ts / 10_000) as i32, (ts / 100) % 100, ts % 100).unwrap()
    };
    DateRange::new(date(start), date(end))
}

fn campaign_doc(id: &str, timestamp: u32, impressions: &str) -> RawDocument {
    RawDocument::new(
        id,
        "campaign_performance_report",
        timestamp,
        json!({ "campaign_id": id, "impressions": impressions }),
    )
}

#[tokio::test]
async fn test_fetch_filters_by_type_and_range() {
    let store = MemoryStore::new();
    store.insert_document(1, "google_ads", campaign_doc("1", 20210205, "1001"));
    store.insert_document(1, "google_ads", campaign_doc("2", 20210210, "1002"));
    store.insert_document(
        1,
        "google_ads",
        RawDocument::new("3", "ad_group_performance_report", 20210205, json!({})),
    );

    let docs = store
        .fetch(1, "google_ads", "campaign_performance_report", range(20210203, 20210208))
        .await
        .unwrap();

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "1");
}

#[tokio::test]
async fn test_fetch_isolates_projects() {
    let store = MemoryStore::new();
    store.insert_document(1, "google_ads", campaign_doc("1", 20210205, "10"));

    let docs = store
        .fetch(2, "google_ads", "campaign_performance_report", range(20210101, 20211231))
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn test_connected_channels_keep_insert_order() {
    let store = MemoryStore::new();
    store.insert_document(1, "linkedin_ads", campaign_doc("1", 20210205, "10"));
    store.insert_document(1, "google_ads", campaign_doc("1", 20210205, "10"));
    store.connect_channel(1, "linkedin_ads");

    let channels = store.list_connected_channels(1).await.unwrap();
    assert_eq!(channels, vec!["linkedin_ads", "google_ads"]);
    assert!(store.list_connected_channels(9).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unavailable_channel_errors() {
    let store = MemoryStore::new();
    store.insert_document(1, "facebook_ads", campaign_doc("1", 20210205, "10"));
    store.mark_unavailable(1, "facebook_ads");

    let err = store
        .fetch(1, "facebook_ads", "campaign_performance_report", range(20210101, 20211231))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Connection(_)));
}

#[tokio::test]
async fn test_rules_and_tags() {
    let store = MemoryStore::new();
    store.add_rule(
        1,
        SmartPropertyRule {
            object_type: "campaign".to_string(),
            name: "region".to_string(),
            value: "NA".to_string(),
            source: "all".to_string(),
            filters: vec![],
        },
    );
    store.set_tag(
        1,
        "campaign",
        "42",
        BTreeMap::from([("region".to_string(), "EU".to_string())]),
    );

    let rules = store.get_rules(1, "campaign").await.unwrap();
    assert_eq!(rules.len(), 1);
    assert!(store.get_rules(1, "ad_group").await.unwrap().is_empty());

    let tag = store.get_tag(1, "campaign", "42").await.unwrap().unwrap();
    assert_eq!(tag.get("region").map(String::as_str), Some("EU"));
    assert!(store.get_tag(1, "campaign", "43").await.unwrap().is_none());
}

#[test]
fn test_document_count() {
    let store = MemoryStore::new();
    assert_eq!(store.document_count(1, "google_ads"), 0);
    store.insert_document(1, "google_ads", campaign_doc("1", 20210205, "10"));
    assert_eq!(store.document_count(1, "google_ads"), 1);
}

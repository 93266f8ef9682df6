//! Tests for the channel registry

use crate::error::QueryError;
use crate::query::DataType;
use crate::registry::{ALL_CHANNELS_CATEGORY, ChannelSelector, Component, FieldRef, Registry};

fn channel(display_category: &str) -> std::sync::Arc<crate::registry::ChannelSpec> {
    match Registry::standard().select(display_category).unwrap() {
        ChannelSelector::Single(spec) => spec,
        ChannelSelector::All(_) => panic!("expected a single channel"),
    }
}

#[test]
fn test_select_channels() {
    let registry = Registry::standard();
    assert_eq!(channel("google_ads_metrics").id, "google_ads");
    assert_eq!(channel("facebook_metrics").id, "facebook_ads");
    assert_eq!(channel("linkedin_metrics").id, "linkedin_ads");
    assert_eq!(channel("google_organic_metrics").id, "search_console");
    assert_eq!(channel("bing_ads_metrics").id, "bing_ads");
    assert_eq!(
        channel("linkedin_company_engagements").id,
        "linkedin_company_engagements"
    );

    match registry.select(ALL_CHANNELS_CATEGORY).unwrap() {
        ChannelSelector::All(all) => {
            let ids: Vec<&str> = all.members.iter().map(|c| c.id).collect();
            assert_eq!(
                ids,
                vec!["google_ads", "facebook_ads", "linkedin_ads", "bing_ads"]
            );
        }
        ChannelSelector::Single(_) => panic!("expected all channels"),
    }

    assert!(matches!(
        registry.select("bing_metrics"),
        Err(QueryError::UnknownChannel(_))
    ));
}

#[test]
fn test_resolve_dimensions() {
    let google = channel("google_ads_metrics");
    assert_eq!(
        google.resolve("keyword", "name").unwrap(),
        FieldRef::Raw("criteria")
    );
    assert_eq!(google.resolve("channel", "name").unwrap(), FieldRef::Channel);

    let linkedin = channel("linkedin_metrics");
    assert_eq!(
        linkedin.resolve("campaign", "name").unwrap(),
        FieldRef::Raw("campaign_group_name")
    );
    assert_eq!(
        linkedin.resolve("ad_group", "name").unwrap(),
        FieldRef::Raw("campaign_name")
    );

    let facebook = channel("facebook_metrics");
    assert_eq!(
        facebook.resolve("ad_group", "id").unwrap(),
        FieldRef::Raw("adset_id")
    );
    assert_eq!(facebook.dimension("ad_group", "id").unwrap().data_type, DataType::Categorical);

    let err = facebook.resolve("keyword", "name").unwrap_err();
    assert!(matches!(err, QueryError::UnknownDimension { .. }));
    assert!(err.is_caller_error());
}

#[test]
fn test_resolve_metrics() {
    let google = channel("google_ads_metrics");

    let spend = google.resolve_metric("spend").unwrap();
    match spend.numerator {
        Component::Field { field, scale } => {
            assert_eq!(field, "cost");
            assert!((scale - 1e-6).abs() < 1e-12);
        }
        other => panic!("unexpected component {other:?}"),
    }
    assert!(spend.denominator.is_none());

    let cpc = google.resolve_metric("cost_per_click").unwrap();
    assert_eq!(cpc.numerator.field(), "cost");
    assert_eq!(cpc.denominator.unwrap().field(), "clicks");

    let ctr = google.resolve_metric("click_through_rate").unwrap();
    assert_eq!(ctr.multiplier, 100.0);

    let linkedin = channel("linkedin_metrics");
    assert_eq!(
        linkedin.resolve_metric("spend").unwrap().numerator.field(),
        "costInLocalCurrency"
    );

    let organic = channel("google_organic_metrics");
    assert!(matches!(
        organic.resolve_metric("spend"),
        Err(QueryError::UnknownMetric { .. })
    ));
}

#[test]
fn test_lowest_level() {
    let google = channel("google_ads_metrics");

    let level = google.lowest_level(["channel"]).unwrap();
    assert_eq!(level.type_alias, "campaign_performance_report");

    let level = google.lowest_level(["ad_group", "campaign"]).unwrap();
    assert_eq!(level.type_alias, "ad_group_performance_report");

    let level = google.lowest_level(["campaign", "keyword"]).unwrap();
    assert_eq!(level.type_alias, "keyword_performance_report");

    let err = google.lowest_level(["ad", "keyword"]).unwrap_err();
    assert!(matches!(err, QueryError::InvalidQuery(_)));

    let linkedin = channel("linkedin_metrics");
    assert_eq!(
        linkedin.lowest_level(["campaign"]).unwrap().type_alias,
        "campaign_group_insights"
    );
}

#[test]
fn test_all_channels_metrics() {
    let registry = Registry::standard();
    let all = registry.all_channels();
    assert!(all.check_metrics(&["impressions".to_string(), "spend".to_string()]).is_ok());

    let err = all
        .check_metrics(&["click_through_rate".to_string()])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "unknown metric click_through_rate for channel all_channels"
    );
}

#[test]
fn test_every_ratio_component_resolves() {
    for channel in Registry::standard().channels() {
        for metric in &channel.metrics {
            assert!(
                channel.resolve_metric(metric.name).is_ok(),
                "{} {}",
                channel.id,
                metric.name
            );
        }
    }
}

// =============================================================================
// Channel catalog
// =============================================================================

#[test]
fn test_bing_ads_channel() {
    let bing = channel("bing_ads_metrics");
    assert_eq!(bing.label, "Bing Ads");
    assert!(bing.smart_source);

    assert_eq!(bing.resolve("campaign", "type").unwrap(), FieldRef::Raw("campaign_type"));
    assert_eq!(
        bing.resolve("ad_group", "bid_strategy_type").unwrap(),
        FieldRef::Raw("ad_group_bid_strategy_type")
    );
    assert_eq!(bing.resolve("keyword", "name").unwrap(), FieldRef::Raw("keyword_name"));
    assert_eq!(
        bing.lowest_level(["campaign", "keyword"]).unwrap().type_alias,
        "keyword_performance_report"
    );

    let spend = bing.resolve_metric("spend").unwrap();
    assert_eq!(spend.numerator, Component::Field { field: "spend", scale: 1.0 });
    assert!(bing.resolve_metric("cost_per_conversion").is_ok());
    assert!(matches!(
        bing.resolve_metric("reach"),
        Err(QueryError::UnknownMetric { .. })
    ));
}

#[test]
fn test_facebook_reach_metrics() {
    let facebook = channel("facebook_metrics");

    let link_clicks = facebook.resolve_metric("link_clicks").unwrap();
    assert_eq!(link_clicks.numerator.field(), "inline_link_clicks");

    let frequency = facebook.resolve_metric("frequency").unwrap();
    assert_eq!(frequency.numerator.field(), "impressions");
    assert_eq!(frequency.denominator.unwrap().field(), "reach");
    assert_eq!(frequency.multiplier, 1.0);

    let ctr = facebook.resolve_metric("link_click_through_rate").unwrap();
    assert_eq!(ctr.denominator.unwrap().field(), "impressions");
    assert_eq!(ctr.multiplier, 100.0);
}

#[test]
fn test_position_averages() {
    let organic = channel("google_organic_metrics");
    let doc = |position: Option<f64>, impressions: f64| {
        move |field: &str| match field {
            "position" => position,
            "impressions" => Some(impressions),
            _ => None,
        }
    };

    let avg = organic.resolve_metric("position_avg").unwrap();
    let denominator = avg.denominator.unwrap();
    assert_eq!(avg.numerator.evaluate(doc(Some(4.0), 10.0)), 4.0);
    assert_eq!(denominator.evaluate(doc(Some(4.0), 10.0)), 1.0);
    assert_eq!(denominator.evaluate(doc(None, 10.0)), 0.0);

    let weighted = organic.resolve_metric("position_impression_weighted_avg").unwrap();
    let denominator = weighted.denominator.unwrap();
    assert_eq!(weighted.numerator.evaluate(doc(Some(2.5), 100.0)), 250.0);
    assert_eq!(denominator.evaluate(doc(Some(2.5), 100.0)), 100.0);
}

#[test]
fn test_search_share_guards() {
    let google = channel("google_ads_metrics");
    let metric = google.resolve_metric("search_impression_share").unwrap();
    let numerator = metric.numerator;
    let denominator = metric.denominator.unwrap();
    assert_eq!(metric.multiplier, 1.0);

    let doc = |share: Option<f64>| {
        move |field: &str| match field {
            "search_impression_share" => share,
            "impressions" => Some(40.0),
            "total_search_impression" => Some(100.0),
            _ => None,
        }
    };

    // Reported share counts on both sides
    assert_eq!(numerator.evaluate(doc(Some(0.4))), 40.0);
    assert_eq!(denominator.evaluate(doc(Some(0.4))), 100.0);

    // Zero share only contributes to the total
    assert_eq!(numerator.evaluate(doc(Some(0.0))), 0.0);
    assert_eq!(denominator.evaluate(doc(Some(0.0))), 100.0);

    // Unreported share contributes nothing
    assert_eq!(numerator.evaluate(doc(None)), 0.0);
    assert_eq!(denominator.evaluate(doc(None)), 0.0);

    let clicks = google.resolve_metric("search_click_share").unwrap();
    assert_eq!(clicks.numerator.field(), "clicks");
    assert_eq!(clicks.denominator.unwrap().field(), "total_search_click");

    assert_eq!(
        google.resolve_metric("conversion_value").unwrap().numerator.field(),
        "conversion_value"
    );
}

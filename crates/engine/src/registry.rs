//! Channel registry
//!
//! Static catalog of the channels the engine can query: display categories,
//! object hierarchies with their document type aliases, canonical dimensions
//! mapped to raw document fields, and canonical metrics mapped to formulas.

use std::sync::Arc;

use crate::error::{QueryError, Result};
use crate::query::{CHANNEL_OBJECT, DataType};

/// Display category of the virtual all-channels view
pub const ALL_CHANNELS_CATEGORY: &str = "all_channels_metrics";

/// Channel identifier used in errors raised by the all-channels view
pub const ALL_CHANNELS_ID: &str = "all_channels";

/// Object types that can carry smart properties
pub const SMART_OBJECTS: &[&str] = &["campaign", "ad_group"];

/// Where a dimension value comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    /// A raw document field
    Raw(&'static str),
    /// The channel label
    Channel,
    /// A smart property of the entity identified by `id_field`
    Smart {
        /// Object type carrying the property
        object_type: String,
        /// Custom property name
        name: String,
        /// Raw field holding the entity id
        id_field: &'static str,
    },
}

/// One level of a channel's object hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLevel {
    /// Canonical object type
    pub object_type: &'static str,
    /// Document type alias stored for this level
    pub type_alias: &'static str,
    /// Raw field holding the entity id
    pub id_field: &'static str,
    /// Depth in the hierarchy, 0 for the top level
    pub depth: u8,
}

/// A canonical dimension mapped to a raw field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    /// Canonical object type
    pub object_type: &'static str,
    /// Canonical property name
    pub property: &'static str,
    /// Raw document field
    pub field: &'static str,
    /// Declared value type
    pub data_type: DataType,
}

/// How a metric is computed from documents
#[derive(Debug, Clone, PartialEq)]
pub enum MetricFormula {
    /// Sum of a raw field times `scale`
    Sum {
        /// Raw document field
        field: &'static str,
        /// Factor applied to each value
        scale: f64,
    },
    /// `numerator * multiplier / denominator` over two summed metrics
    Ratio {
        /// Component metric in the numerator
        numerator: &'static str,
        /// Component metric in the denominator
        denominator: &'static str,
        /// Factor applied to the quotient
        multiplier: f64,
    },
    /// Mean of a raw field over the documents carrying it
    Average {
        /// Raw document field
        field: &'static str,
    },
    /// Mean of a raw field weighted by another
    WeightedAverage {
        /// Raw document field
        field: &'static str,
        /// Raw weight field
        weight: &'static str,
    },
    /// Share of a total, over documents reporting the share
    ///
    /// Numerators count only where `share` is present and non-zero;
    /// denominators wherever `share` is present.
    Share {
        /// Raw field carrying the reported share
        share: &'static str,
        /// Raw numerator field
        numerator: &'static str,
        /// Raw total field
        denominator: &'static str,
    },
}

/// A canonical metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDef {
    /// Canonical metric name
    pub name: &'static str,
    /// Formula
    pub formula: MetricFormula,
}

/// Per-document contribution to an accumulated sum
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Component {
    /// A raw field times `scale`
    Field {
        /// Raw document field
        field: &'static str,
        /// Factor applied to each value
        scale: f64,
    },
    /// The product of two raw fields
    Product {
        /// Raw document field
        field: &'static str,
        /// Raw field multiplied in
        weight: &'static str,
    },
    /// One for each document carrying the field
    Count {
        /// Raw document field
        field: &'static str,
    },
    /// A raw field, counted only where `guard` is present
    Guarded {
        /// Raw document field
        field: &'static str,
        /// Raw field that must be present
        guard: &'static str,
        /// Also require a non-zero guard
        nonzero: bool,
    },
}

impl Component {
    /// Raw field the component reads
    pub fn field(&self) -> &'static str {
        match *self {
            Self::Field { field, .. }
            | Self::Product { field, .. }
            | Self::Count { field }
            | Self::Guarded { field, .. } => field,
        }
    }

    /// Contribution of one document
    ///
    /// `value` returns a field's numeric value, or `None` when the document
    /// lacks it.
    pub fn evaluate(&self, value: impl Fn(&str) -> Option<f64>) -> f64 {
        match *self {
            Self::Field { field, scale } => value(field).unwrap_or(0.0) * scale,
            Self::Product { field, weight } => {
                value(field).unwrap_or(0.0) * value(weight).unwrap_or(0.0)
            }
            Self::Count { field } => {
                if value(field).is_some() {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Guarded {
                field,
                guard,
                nonzero,
            } => match value(guard) {
                Some(g) if !(nonzero && g == 0.0) => value(field).unwrap_or(0.0),
                _ => 0.0,
            },
        }
    }
}

/// A metric reduced to raw components, ready for accumulation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetric {
    /// Canonical metric name
    pub name: String,
    /// Numerator component
    pub numerator: Component,
    /// Denominator component, for ratios
    pub denominator: Option<Component>,
    /// Factor applied to the quotient
    pub multiplier: f64,
}

/// A queryable channel
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    /// Channel identifier, also the store's channel name
    pub id: &'static str,
    /// Display category selecting this channel
    pub display_category: &'static str,
    /// Value of the synthetic `channel_name` dimension
    pub label: &'static str,
    /// Whether smart-property rules may target this channel
    pub smart_source: bool,
    /// Object hierarchy, top level first
    pub levels: Vec<ObjectLevel>,
    /// Canonical dimensions
    pub dimensions: Vec<Dimension>,
    /// Canonical metrics
    pub metrics: Vec<MetricDef>,
}

impl ChannelSpec {
    /// Look up a native dimension
    pub fn dimension(&self, object_type: &str, property: &str) -> Option<&Dimension> {
        self.dimensions
            .iter()
            .find(|d| d.object_type == object_type && d.property == property)
    }

    /// Resolve a native or synthetic dimension
    pub fn resolve(&self, object_type: &str, property: &str) -> Result<FieldRef> {
        if object_type == CHANNEL_OBJECT && property == "name" {
            return Ok(FieldRef::Channel);
        }
        self.dimension(object_type, property)
            .map(|d| FieldRef::Raw(d.field))
            .ok_or_else(|| QueryError::unknown_dimension(self.id, object_type, property))
    }

    /// Whether the property is a native dimension of the object
    pub fn is_native(&self, object_type: &str, property: &str) -> bool {
        (object_type == CHANNEL_OBJECT && property == "name")
            || self.dimension(object_type, property).is_some()
    }

    /// Hierarchy level of an object type
    pub fn level(&self, object_type: &str) -> Option<&ObjectLevel> {
        self.levels.iter().find(|l| l.object_type == object_type)
    }

    /// Look up a metric definition
    pub fn metric(&self, name: &str) -> Option<&MetricDef> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Resolve a metric into its raw components
    pub fn resolve_metric(&self, name: &str) -> Result<ResolvedMetric> {
        let def = self
            .metric(name)
            .ok_or_else(|| QueryError::unknown_metric(self.id, name))?;

        let (numerator, denominator, multiplier) = match def.formula {
            MetricFormula::Sum { field, scale } => (Component::Field { field, scale }, None, 1.0),
            MetricFormula::Ratio {
                numerator,
                denominator,
                multiplier,
            } => (
                self.component(numerator)?,
                Some(self.component(denominator)?),
                multiplier,
            ),
            MetricFormula::Average { field } => (
                Component::Field { field, scale: 1.0 },
                Some(Component::Count { field }),
                1.0,
            ),
            MetricFormula::WeightedAverage { field, weight } => (
                Component::Product { field, weight },
                Some(Component::Field {
                    field: weight,
                    scale: 1.0,
                }),
                1.0,
            ),
            MetricFormula::Share {
                share,
                numerator,
                denominator,
            } => (
                Component::Guarded {
                    field: numerator,
                    guard: share,
                    nonzero: true,
                },
                Some(Component::Guarded {
                    field: denominator,
                    guard: share,
                    nonzero: false,
                }),
                1.0,
            ),
        };

        Ok(ResolvedMetric {
            name: name.to_string(),
            numerator,
            denominator,
            multiplier,
        })
    }

    fn component(&self, metric: &str) -> Result<Component> {
        match self.metric(metric).map(|m| &m.formula) {
            Some(MetricFormula::Sum { field, scale }) => Ok(Component::Field {
                field: *field,
                scale: *scale,
            }),
            _ => Err(QueryError::InvalidQuery(format!(
                "ratio component {} of channel {} is not a summed metric",
                metric, self.id
            ))),
        }
    }

    /// Lowest hierarchy level among the referenced object types
    ///
    /// The synthetic channel object and unknown objects are ignored. With no
    /// hierarchy object referenced, the top level is used. Two different
    /// objects at the lowest depth are never stored together.
    pub fn lowest_level<'a>(
        &self,
        object_types: impl IntoIterator<Item = &'a str>,
    ) -> Result<&ObjectLevel> {
        let mut lowest: Option<&ObjectLevel> = None;

        for object_type in object_types {
            let Some(level) = self.level(object_type) else {
                continue;
            };
            lowest = match lowest {
                None => Some(level),
                Some(current) if level.depth > current.depth => Some(level),
                Some(current)
                    if level.depth == current.depth && level.object_type != current.object_type =>
                {
                    return Err(QueryError::InvalidQuery(format!(
                        "{} and {} cannot be combined in one {} query",
                        current.object_type, level.object_type, self.id
                    )));
                }
                Some(current) => Some(current),
            };
        }

        lowest.or_else(|| self.levels.first()).ok_or_else(|| {
            QueryError::InvalidQuery(format!("channel {} has no object levels", self.id))
        })
    }
}

/// Channels selected by a display category
#[derive(Debug, Clone)]
pub enum ChannelSelector {
    /// One channel
    Single(Arc<ChannelSpec>),
    /// The all-channels union
    All(Arc<AllChannelsSpec>),
}

/// The virtual all-channels view
#[derive(Debug, Clone)]
pub struct AllChannelsSpec {
    /// Member channels, in output order
    pub members: Vec<Arc<ChannelSpec>>,
    /// Metrics every member supports
    pub metrics: Vec<&'static str>,
}

impl AllChannelsSpec {
    /// Fail unless every metric is common to all members
    pub fn check_metrics(&self, metrics: &[String]) -> Result<()> {
        match metrics
            .iter()
            .find(|m| !self.metrics.contains(&m.as_str()))
        {
            Some(metric) => Err(QueryError::unknown_metric(ALL_CHANNELS_ID, metric)),
            None => Ok(()),
        }
    }
}

/// Catalog of queryable channels
#[derive(Debug, Clone)]
pub struct Registry {
    channels: Vec<Arc<ChannelSpec>>,
    all_channels: Arc<AllChannelsSpec>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

impl Registry {
    /// Build a registry from channels and the all-channels members
    pub fn new(channels: Vec<ChannelSpec>, members: &[&str], common_metrics: Vec<&'static str>) -> Self {
        let channels: Vec<Arc<ChannelSpec>> = channels.into_iter().map(Arc::new).collect();
        let members = channels
            .iter()
            .filter(|c| members.contains(&c.id))
            .cloned()
            .collect();

        Self {
            channels,
            all_channels: Arc::new(AllChannelsSpec {
                members,
                metrics: common_metrics,
            }),
        }
    }

    /// The built-in channel catalog
    pub fn standard() -> Self {
        Self::new(
            vec![
                google_ads(),
                facebook_ads(),
                linkedin_ads(),
                linkedin_company_engagements(),
                search_console(),
                bing_ads(),
            ],
            &["google_ads", "facebook_ads", "linkedin_ads", "bing_ads"],
            vec!["impressions", "clicks", "spend"],
        )
    }

    /// All concrete channels
    pub fn channels(&self) -> &[Arc<ChannelSpec>] {
        &self.channels
    }

    /// Look up a channel by identifier
    pub fn channel(&self, id: &str) -> Option<&Arc<ChannelSpec>> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// The all-channels view
    pub fn all_channels(&self) -> &Arc<AllChannelsSpec> {
        &self.all_channels
    }

    /// Select channels by display category
    pub fn select(&self, display_category: &str) -> Result<ChannelSelector> {
        if display_category == ALL_CHANNELS_CATEGORY {
            return Ok(ChannelSelector::All(Arc::clone(&self.all_channels)));
        }
        self.channels
            .iter()
            .find(|c| c.display_category == display_category)
            .map(|c| ChannelSelector::Single(Arc::clone(c)))
            .ok_or_else(|| QueryError::UnknownChannel(display_category.to_string()))
    }
}

// =============================================================================
// Catalog
// =============================================================================

fn dim(object_type: &'static str, property: &'static str, field: &'static str) -> Dimension {
    Dimension {
        object_type,
        property,
        field,
        data_type: DataType::Categorical,
    }
}

fn level(
    object_type: &'static str,
    type_alias: &'static str,
    id_field: &'static str,
    depth: u8,
) -> ObjectLevel {
    ObjectLevel {
        object_type,
        type_alias,
        id_field,
        depth,
    }
}

fn sum(name: &'static str, field: &'static str) -> MetricDef {
    scaled(name, field, 1.0)
}

fn scaled(name: &'static str, field: &'static str, scale: f64) -> MetricDef {
    MetricDef {
        name,
        formula: MetricFormula::Sum { field, scale },
    }
}

fn ratio(
    name: &'static str,
    numerator: &'static str,
    denominator: &'static str,
    multiplier: f64,
) -> MetricDef {
    MetricDef {
        name,
        formula: MetricFormula::Ratio {
            numerator,
            denominator,
            multiplier,
        },
    }
}

fn average(name: &'static str, field: &'static str) -> MetricDef {
    MetricDef {
        name,
        formula: MetricFormula::Average { field },
    }
}

fn weighted_average(name: &'static str, field: &'static str, weight: &'static str) -> MetricDef {
    MetricDef {
        name,
        formula: MetricFormula::WeightedAverage { field, weight },
    }
}

fn share(
    name: &'static str,
    share: &'static str,
    numerator: &'static str,
    denominator: &'static str,
) -> MetricDef {
    MetricDef {
        name,
        formula: MetricFormula::Share {
            share,
            numerator,
            denominator,
        },
    }
}

fn google_ads() -> ChannelSpec {
    ChannelSpec {
        id: "google_ads",
        display_category: "google_ads_metrics",
        label: "Google Ads",
        smart_source: true,
        levels: vec![
            level("campaign", "campaign_performance_report", "campaign_id", 0),
            level("ad_group", "ad_group_performance_report", "ad_group_id", 1),
            level("keyword", "keyword_performance_report", "keyword_id", 2),
            level("ad", "ad_performance_report", "ad_id", 2),
        ],
        dimensions: vec![
            dim("campaign", "id", "campaign_id"),
            dim("campaign", "name", "campaign_name"),
            dim("campaign", "status", "campaign_status"),
            dim("ad_group", "id", "ad_group_id"),
            dim("ad_group", "name", "ad_group_name"),
            dim("ad_group", "status", "ad_group_status"),
            dim("keyword", "id", "keyword_id"),
            dim("keyword", "name", "criteria"),
            dim("keyword", "match_type", "keyword_match_type"),
            dim("ad", "id", "ad_id"),
        ],
        metrics: vec![
            sum("impressions", "impressions"),
            sum("clicks", "clicks"),
            sum("conversions", "conversions"),
            sum("conversion_value", "conversion_value"),
            scaled("spend", "cost", 1.0 / 1_000_000.0),
            ratio("click_through_rate", "clicks", "impressions", 100.0),
            ratio("conversion_rate", "conversions", "clicks", 100.0),
            ratio("cost_per_click", "spend", "clicks", 1.0),
            ratio("cost_per_conversion", "spend", "conversions", 1.0),
            share(
                "search_impression_share",
                "search_impression_share",
                "impressions",
                "total_search_impression",
            ),
            share(
                "search_click_share",
                "search_click_share",
                "clicks",
                "total_search_click",
            ),
            share(
                "search_top_impression_share",
                "search_top_impression_share",
                "top_impressions",
                "total_top_impressions",
            ),
            share(
                "search_absolute_top_impression_share",
                "search_absolute_top_impression_share",
                "absolute_top_impressions",
                "total_top_impressions",
            ),
            share(
                "search_budget_lost_absolute_top_impression_share",
                "search_budget_lost_absolute_top_impression_share",
                "absolute_top_impression_lost_due_to_budget",
                "total_top_impressions",
            ),
            share(
                "search_budget_lost_impression_share",
                "search_budget_lost_impression_share",
                "impression_lost_due_to_budget",
                "total_search_impression",
            ),
            share(
                "search_budget_lost_top_impression_share",
                "search_budget_lost_top_impression_share",
                "top_impression_lost_due_to_budget",
                "total_top_impressions",
            ),
            share(
                "search_rank_lost_absolute_top_impression_share",
                "search_rank_lost_absolute_top_impression_share",
                "absolute_top_impression_lost_due_to_rank",
                "total_top_impressions",
            ),
            share(
                "search_rank_lost_impression_share",
                "search_rank_lost_impression_share",
                "impression_lost_due_to_rank",
                "total_search_impression",
            ),
            share(
                "search_rank_lost_top_impression_share",
                "search_rank_lost_top_impression_share",
                "top_impression_lost_due_to_rank",
                "total_top_impressions",
            ),
        ],
    }
}

fn facebook_ads() -> ChannelSpec {
    ChannelSpec {
        id: "facebook_ads",
        display_category: "facebook_metrics",
        label: "Facebook Ads",
        smart_source: true,
        levels: vec![
            level("campaign", "campaign_insights", "campaign_id", 0),
            level("ad_group", "ad_set_insights", "adset_id", 1),
            level("ad", "ad_insights", "ad_id", 2),
        ],
        dimensions: vec![
            dim("campaign", "id", "campaign_id"),
            dim("campaign", "name", "campaign_name"),
            dim("ad_group", "id", "adset_id"),
            dim("ad_group", "name", "adset_name"),
            dim("ad", "id", "ad_id"),
            dim("ad", "name", "ad_name"),
        ],
        metrics: vec![
            sum("impressions", "impressions"),
            sum("clicks", "clicks"),
            sum("spend", "spend"),
            sum("conversions", "conversions"),
            sum("reach", "reach"),
            sum("link_clicks", "inline_link_clicks"),
            ratio("click_through_rate", "clicks", "impressions", 100.0),
            ratio("cost_per_click", "spend", "clicks", 1.0),
            ratio("cost_per_thousand_impressions", "spend", "impressions", 1000.0),
            ratio("frequency", "impressions", "reach", 1.0),
            ratio("link_click_through_rate", "link_clicks", "impressions", 100.0),
            ratio("cost_per_link_click", "spend", "link_clicks", 1.0),
        ],
    }
}

fn linkedin_ads() -> ChannelSpec {
    ChannelSpec {
        id: "linkedin_ads",
        display_category: "linkedin_metrics",
        label: "LinkedIn Ads",
        smart_source: true,
        levels: vec![
            level("campaign", "campaign_group_insights", "campaign_group_id", 0),
            level("ad_group", "campaign_insights", "campaign_id", 1),
            level("ad", "creative_insights", "creative_id", 2),
        ],
        dimensions: vec![
            dim("campaign", "id", "campaign_group_id"),
            dim("campaign", "name", "campaign_group_name"),
            dim("campaign", "status", "campaign_group_status"),
            dim("ad_group", "id", "campaign_id"),
            dim("ad_group", "name", "campaign_name"),
            dim("ad_group", "status", "campaign_status"),
            dim("ad", "id", "creative_id"),
        ],
        metrics: vec![
            sum("impressions", "impressions"),
            sum("clicks", "clicks"),
            sum("conversions", "conversions"),
            sum("spend", "costInLocalCurrency"),
            ratio("click_through_rate", "clicks", "impressions", 100.0),
            ratio("cost_per_click", "spend", "clicks", 1.0),
            ratio("conversion_rate", "conversions", "clicks", 100.0),
        ],
    }
}

fn linkedin_company_engagements() -> ChannelSpec {
    ChannelSpec {
        id: "linkedin_company_engagements",
        display_category: "linkedin_company_engagements",
        label: "LinkedIn Company Engagements",
        smart_source: false,
        levels: vec![level("company", "member_company_insights", "vanityName", 0)],
        dimensions: vec![
            dim("company", "vanity_name", "vanityName"),
            dim("company", "localized_name", "localizedName"),
            dim("company", "domain", "localizedWebsite"),
            dim("company", "preferred_country", "preferredCountry"),
            dim("company", "headquarters", "companyHeadquarters"),
        ],
        metrics: vec![
            sum("impressions", "impressions"),
            sum("clicks", "clicks"),
            sum("spend", "costInLocalCurrency"),
            ratio("click_through_rate", "clicks", "impressions", 100.0),
        ],
    }
}

fn search_console() -> ChannelSpec {
    ChannelSpec {
        id: "search_console",
        display_category: "google_organic_metrics",
        label: "Search Console",
        smart_source: false,
        levels: vec![level("organic_property", "organic_performance_report", "page", 0)],
        dimensions: vec![
            dim("organic_property", "page", "page"),
            dim("organic_property", "query", "query"),
            dim("organic_property", "country", "country"),
            dim("organic_property", "device", "device"),
        ],
        metrics: vec![
            sum("impressions", "impressions"),
            sum("clicks", "clicks"),
            ratio("click_through_rate", "clicks", "impressions", 100.0),
            average("position_avg", "position"),
            weighted_average("position_impression_weighted_avg", "position", "impressions"),
        ],
    }
}

fn bing_ads() -> ChannelSpec {
    ChannelSpec {
        id: "bing_ads",
        display_category: "bing_ads_metrics",
        label: "Bing Ads",
        smart_source: true,
        levels: vec![
            level("campaign", "campaign_performance_report", "campaign_id", 0),
            level("ad_group", "ad_group_performance_report", "ad_group_id", 1),
            level("keyword", "keyword_performance_report", "keyword_id", 2),
        ],
        dimensions: vec![
            dim("campaign", "id", "campaign_id"),
            dim("campaign", "name", "campaign_name"),
            dim("campaign", "status", "campaign_status"),
            dim("campaign", "type", "campaign_type"),
            dim("ad_group", "id", "ad_group_id"),
            dim("ad_group", "name", "ad_group_name"),
            dim("ad_group", "status", "ad_group_status"),
            dim("ad_group", "bid_strategy_type", "ad_group_bid_strategy_type"),
            dim("keyword", "id", "keyword_id"),
            dim("keyword", "name", "keyword_name"),
            dim("keyword", "status", "keyword_status"),
            dim("keyword", "match_type", "keyword_match_type"),
        ],
        metrics: vec![
            sum("impressions", "impressions"),
            sum("clicks", "clicks"),
            sum("spend", "spend"),
            sum("conversions", "conversions"),
            ratio("click_through_rate", "clicks", "impressions", 100.0),
            ratio("cost_per_click", "spend", "clicks", 1.0),
            ratio("conversion_rate", "conversions", "clicks", 100.0),
            ratio("cost_per_conversion", "spend", "conversions", 1.0),
        ],
    }
}

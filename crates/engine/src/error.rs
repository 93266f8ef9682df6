//! Query engine error types

use std::time::Duration;

use kpi_store::StoreError;
use thiserror::Error;

/// Query engine errors
#[derive(Debug, Error)]
pub enum QueryError {
    /// Display category or legacy channel not in the registry
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Dimension not registered for the channel
    #[error("unknown dimension {object_type}.{property} for channel {channel}")]
    UnknownDimension {
        /// Channel identifier
        channel: String,
        /// Object type of the dimension
        object_type: String,
        /// Property name of the dimension
        property: String,
    },

    /// Metric not registered for the channel
    #[error("unknown metric {metric} for channel {channel}")]
    UnknownMetric {
        /// Channel identifier
        channel: String,
        /// Requested metric
        metric: String,
    },

    /// Invalid time range or timezone
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    /// Malformed filter or group-by
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Structurally invalid query
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Channel documents could not be read
    #[error("source unavailable for {channel}: {source}")]
    SourceUnavailable {
        /// Channel (or store) that failed
        channel: String,
        /// Underlying store error
        source: StoreError,
    },

    /// Query group did not finish in time
    #[error("query timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Aggregated time bucket missing from the grid
    #[error("time bucket {bucket} does not match the grid")]
    BucketMismatch {
        /// Bucket start date
        bucket: String,
    },

    /// Channel task panicked or was cancelled
    #[error("channel task failed: {0}")]
    TaskFailed(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl QueryError {
    /// Errors caused by the request itself; never retried
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownChannel(_)
                | Self::UnknownDimension { .. }
                | Self::UnknownMetric { .. }
                | Self::InvalidTimeRange(_)
                | Self::InvalidFilter(_)
                | Self::InvalidQuery(_)
        )
    }

    /// HTTP-style status code reported to callers
    pub fn status_code(&self) -> u16 {
        match self {
            _ if self.is_caller_error() => 400,
            Self::SourceUnavailable { .. } => 503,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }

    pub(crate) fn unknown_dimension(channel: &str, object_type: &str, property: &str) -> Self {
        Self::UnknownDimension {
            channel: channel.to_string(),
            object_type: object_type.to_string(),
            property: property.to_string(),
        }
    }

    pub(crate) fn unknown_metric(channel: &str, metric: &str) -> Self {
        Self::UnknownMetric {
            channel: channel.to_string(),
            metric: metric.to_string(),
        }
    }

    pub(crate) fn source(channel: &str, source: StoreError) -> Self {
        Self::SourceUnavailable {
            channel: channel.to_string(),
            source,
        }
    }
}

/// Result type for query engine operations
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(QueryError::unknown_metric("google_ads", "reach").status_code(), 400);
        assert_eq!(
            QueryError::InvalidTimeRange("from > to".to_string()).status_code(),
            400
        );
        assert_eq!(
            QueryError::source("facebook_ads", StoreError::Connection("down".to_string()))
                .status_code(),
            503
        );
        assert_eq!(QueryError::Timeout(Duration::from_millis(5)).status_code(), 504);
        assert_eq!(
            QueryError::BucketMismatch {
                bucket: "2021-02-05".to_string()
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_display() {
        let err = QueryError::unknown_dimension("google_ads", "company", "domain");
        assert_eq!(
            err.to_string(),
            "unknown dimension company.domain for channel google_ads"
        );
        assert_eq!(
            QueryError::Timeout(Duration::from_millis(250)).to_string(),
            "query timed out after 250ms"
        );
    }
}

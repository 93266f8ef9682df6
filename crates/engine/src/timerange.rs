//! Query time ranges and time-bucket grids
//!
//! Ranges arrive as inclusive epoch seconds and are interpreted in the
//! query's timezone. Buckets are calendar days, Sunday-based weeks, or
//! calendar months, identified by their first local day.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use kpi_store::DateRange;

use crate::error::{QueryError, Result};
use crate::query::Granularity;

/// Output format of `datetime` cells
pub const BUCKET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// An inclusive time range in a timezone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    /// Start of the range (inclusive)
    pub from: DateTime<Tz>,
    /// End of the range (inclusive)
    pub to: DateTime<Tz>,
}

impl TimeRange {
    /// Create a range from epoch seconds
    ///
    /// An empty timezone falls back to `default_timezone`.
    pub fn new(from: i64, to: i64, timezone: &str, default_timezone: &str) -> Result<Self> {
        if to < from {
            return Err(QueryError::InvalidTimeRange(format!(
                "from {} is after to {}",
                from, to
            )));
        }

        let name = if timezone.trim().is_empty() {
            default_timezone
        } else {
            timezone
        };
        let tz = parse_timezone(name)?;

        Ok(Self {
            from: epoch(from)?.with_timezone(&tz),
            to: epoch(to)?.with_timezone(&tz),
        })
    }

    /// Timezone of the range
    pub fn timezone(&self) -> Tz {
        self.from.timezone()
    }

    /// Local day of the start
    pub fn start_date(&self) -> NaiveDate {
        self.from.date_naive()
    }

    /// Local day of the end
    pub fn end_date(&self) -> NaiveDate {
        self.to.date_naive()
    }

    /// Inclusive range of local reporting days to fetch
    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start_date(), self.end_date())
    }

    /// Number of local days covered (inclusive)
    pub fn days(&self) -> i64 {
        (self.end_date() - self.start_date()).num_days() + 1
    }

    /// Bucket starts covering the range
    pub fn buckets(&self, granularity: Granularity) -> Vec<NaiveDate> {
        buckets(self.start_date(), self.end_date(), granularity)
    }
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| QueryError::InvalidTimeRange(format!("unknown timezone: {}", name)))
}

fn epoch(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        QueryError::InvalidTimeRange(format!("timestamp out of range: {}", seconds))
    })
}

/// First day of the bucket containing `date`
pub fn truncate(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Date => date,
        Granularity::Week => {
            let days_from_sunday = date.weekday().num_days_from_sunday();
            date.checked_sub_days(Days::new(days_from_sunday as u64))
                .unwrap_or(date)
        }
        Granularity::Month => date.with_day(1).unwrap_or(date),
    }
}

fn next_bucket(bucket: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::Date => bucket.checked_add_days(Days::new(1)),
        Granularity::Week => bucket.checked_add_days(Days::new(7)),
        Granularity::Month => bucket.checked_add_months(Months::new(1)),
    }
}

/// Bucket starts from the bucket containing `start` to the one containing `end`
pub fn buckets(start: NaiveDate, end: NaiveDate, granularity: Granularity) -> Vec<NaiveDate> {
    let last = truncate(end, granularity);
    let mut current = Some(truncate(start, granularity));
    let mut result = Vec::new();

    while let Some(bucket) = current
        && bucket <= last
    {
        result.push(bucket);
        current = next_bucket(bucket, granularity);
    }

    result
}

/// Local midnight of a bucket day
///
/// Days whose midnight falls in a DST gap start at the first valid hour.
pub fn bucket_start(bucket: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    let midnight = bucket.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            bucket
                .and_hms_opt(1, 0, 0)
                .and_then(|t| tz.from_local_datetime(&t).earliest())
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}

/// Format a bucket as `YYYY-MM-DDTHH:MM:SS±HH:MM`
pub fn format_bucket(bucket: NaiveDate, tz: &Tz) -> String {
    bucket_start(bucket, tz).format(BUCKET_FORMAT).to_string()
}

use std::collections::BTreeMap;

use network_client::domain::UsageRecord;
use serde::Serialize;
use time::{Duration, OffsetDateTime, Time, UtcOffset};

use super::stats::{check_percentile, compute_percentile};
use crate::error::AnalyticsError;

/// The hourly bucket with the highest utilization percentile for a site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusyHour {
    pub site_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub hour: OffsetDateTime,
    pub utilization_pct: f64,
    pub samples: usize,
}

/// Truncates a timestamp to the start of its UTC hour.
///
/// Records written with different offsets for the same instant share a bucket,
/// matching `date_trunc('hour', timestamptz)` in a UTC session.
pub fn truncate_to_hour(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc.replace_time(Time::MIDNIGHT) + Duration::hours(i64::from(utc.hour()))
}

type HourBuckets = BTreeMap<OffsetDateTime, Vec<f64>>;

/// Busy hour of `site_id`: records are bucketed by hour, the `percentile` of
/// utilization is computed per bucket and the highest bucket wins. Ties go to
/// the earliest hour.
pub fn compute_busy_hour<'a, I>(
    records: I,
    site_id: &str,
    percentile: f64,
) -> Result<BusyHour, AnalyticsError>
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    check_percentile(percentile)?;

    let mut buckets = HourBuckets::new();
    for r in records.into_iter().filter(|r| r.site_id == site_id) {
        buckets
            .entry(truncate_to_hour(r.timestamp))
            .or_default()
            .push(r.utilization_pct);
    }

    busiest_bucket(site_id, &buckets, percentile)
}

/// Busy hour for every site present in `records`, ordered by site id.
pub fn busy_hours_by_site<'a, I>(
    records: I,
    percentile: f64,
) -> Result<Vec<BusyHour>, AnalyticsError>
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    check_percentile(percentile)?;

    let mut by_site: BTreeMap<&str, HourBuckets> = BTreeMap::new();
    for r in records {
        by_site
            .entry(r.site_id.as_str())
            .or_default()
            .entry(truncate_to_hour(r.timestamp))
            .or_default()
            .push(r.utilization_pct);
    }

    by_site
        .iter()
        .map(|(site_id, buckets)| busiest_bucket(site_id, buckets, percentile))
        .collect()
}

fn busiest_bucket(
    site_id: &str,
    buckets: &HourBuckets,
    percentile: f64,
) -> Result<BusyHour, AnalyticsError> {
    let mut best: Option<BusyHour> = None;

    // BTreeMap iterates hours in ascending order, so only a strictly greater
    // value may replace the current best.
    for (hour, values) in buckets {
        let value = compute_percentile(values, percentile)?;
        if best.as_ref().map_or(true, |b| value > b.utilization_pct) {
            best = Some(BusyHour {
                site_id: site_id.to_string(),
                hour: *hour,
                utilization_pct: value,
                samples: values.len(),
            });
        }
    }

    best.ok_or_else(|| AnalyticsError::empty(format!("no records for site '{site_id}'")))
}

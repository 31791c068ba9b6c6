use std::{cmp::Ordering, collections::HashMap};

use network_client::domain::{Tech, UsageRecord};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::stats::Mean;
use crate::error::AnalyticsError;

/// Inclusive hour-of-day window.
///
/// When `start_hour > end_hour` the window crosses midnight: 22..=2 covers
/// 22, 23, 0, 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHourWindow")]
pub struct HourWindow {
    start_hour: u8,
    end_hour: u8,
}

#[derive(Deserialize)]
struct RawHourWindow {
    start_hour: u8,
    end_hour: u8,
}

impl TryFrom<RawHourWindow> for HourWindow {
    type Error = AnalyticsError;

    fn try_from(raw: RawHourWindow) -> Result<Self, Self::Error> {
        Self::new(raw.start_hour, raw.end_hour)
    }
}

impl HourWindow {
    pub fn new(start_hour: u8, end_hour: u8) -> Result<Self, AnalyticsError> {
        for hour in [start_hour, end_hour] {
            if hour > 23 {
                return Err(AnalyticsError::range(format!("hour {hour} outside [0, 23]")));
            }
        }
        Ok(Self { start_hour, end_hour })
    }

    pub fn start_hour(&self) -> u8 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u8 {
        self.end_hour
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start_hour > self.end_hour
    }

    pub fn contains(&self, hour: u8) -> bool {
        if self.crosses_midnight() {
            hour >= self.start_hour || hour <= self.end_hour
        } else {
            (self.start_hour..=self.end_hour).contains(&hour)
        }
    }

    pub fn contains_ts(&self, ts: OffsetDateTime) -> bool {
        self.contains(ts.hour())
    }
}

impl Default for HourWindow {
    /// Evening prime time, 19:00 through 23:59.
    fn default() -> Self {
        Self {
            start_hour: 19,
            end_hour: 23,
        }
    }
}

/// Mean utilization of one cell inside a prime-time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellCongestion {
    pub cell_id: String,
    pub site_id: String,
    pub mean_utilization_pct: f64,
    pub samples: usize,
}

/// Cells ranked by mean utilization over the records whose hour lies in
/// `start_hour..=end_hour` (wrapping past midnight when `start_hour > end_hour`).
pub fn compute_prime_time_congestion<'a, I>(
    records: I,
    start_hour: u8,
    end_hour: u8,
) -> Result<Vec<CellCongestion>, AnalyticsError>
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    let window = HourWindow::new(start_hour, end_hour)?;
    Ok(rank_cells_in_window(records, window))
}

/// Same ranking as [`compute_prime_time_congestion`] for an already validated window.
///
/// Highest mean first; equal means are ordered by cell id.
pub fn rank_cells_in_window<'a, I>(records: I, window: HourWindow) -> Vec<CellCongestion>
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    let mut per_cell: HashMap<&str, (&str, Mean)> = HashMap::new();
    for r in records.into_iter().filter(|r| window.contains_ts(r.timestamp)) {
        per_cell
            .entry(r.cell_id.as_str())
            .or_insert_with(|| (r.site_id.as_str(), Mean::default()))
            .1
            .push(r.utilization_pct);
    }

    let mut ranking: Vec<CellCongestion> = per_cell
        .into_iter()
        .filter_map(|(cell_id, (site_id, mean))| {
            Some(CellCongestion {
                cell_id: cell_id.to_string(),
                site_id: site_id.to_string(),
                mean_utilization_pct: mean.value()?,
                samples: mean.count(),
            })
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.mean_utilization_pct
            .total_cmp(&a.mean_utilization_pct)
            .then_with(|| a.cell_id.cmp(&b.cell_id))
    });
    ranking
}

/// The `n` most congested cells in `window`.
pub fn top_congested_cells<'a, I>(records: I, window: HourWindow, n: usize) -> Vec<CellCongestion>
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    let mut ranking = rank_cells_in_window(records, window);
    ranking.truncate(n);
    ranking
}

/// A single measurement that crossed the congestion threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CongestedRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub region: Option<String>,
    pub city: Option<String>,
    pub site_id: String,
    pub cell_id: String,
    pub tech: Tech,
    pub utilization_pct: f64,
    pub latency_ms: f64,
}

impl From<&UsageRecord> for CongestedRecord {
    fn from(r: &UsageRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            region: r.region.clone(),
            city: r.city.clone(),
            site_id: r.site_id.clone(),
            cell_id: r.cell_id.clone(),
            tech: r.tech,
            utilization_pct: r.utilization_pct,
            latency_ms: r.latency_ms,
        }
    }
}

/// Records with utilization at or above `threshold_pct`, worst first
/// (utilization, then latency, both descending). With a `window`, only records
/// inside it are kept.
pub fn congested_records<'a, I>(
    records: I,
    window: Option<HourWindow>,
    threshold_pct: f64,
) -> Result<Vec<CongestedRecord>, AnalyticsError>
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    if !(0.0..=100.0).contains(&threshold_pct) {
        return Err(AnalyticsError::range(format!(
            "congestion threshold {threshold_pct} outside [0, 100]"
        )));
    }

    let mut rows: Vec<CongestedRecord> = records
        .into_iter()
        .filter(|r| window.map_or(true, |w| w.contains_ts(r.timestamp)))
        .filter(|r| r.utilization_pct >= threshold_pct)
        .map(CongestedRecord::from)
        .collect();

    rows.sort_by(|a, b| match b.utilization_pct.total_cmp(&a.utilization_pct) {
        Ordering::Equal => b.latency_ms.total_cmp(&a.latency_ms),
        other => other,
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::usage;
    use time::macros::datetime;

    #[test]
    fn window_bounds_are_validated() {
        assert!(HourWindow::new(0, 23).is_ok());
        assert!(matches!(HourWindow::new(19, 24), Err(AnalyticsError::InvalidRange(_))));
        assert!(matches!(HourWindow::new(30, 2), Err(AnalyticsError::InvalidRange(_))));
    }

    #[test]
    fn plain_window_is_inclusive() {
        let w = HourWindow::new(19, 23).unwrap();
        assert!(!w.contains(18));
        assert!(w.contains(19));
        assert!(w.contains(23));
        assert!(!w.contains(0));
    }

    #[test]
    fn reversed_window_wraps_past_midnight() {
        let w = HourWindow::new(22, 2).unwrap();
        assert!(w.crosses_midnight());
        for h in [22, 23, 0, 1, 2] {
            assert!(w.contains(h), "hour {h} should be inside");
        }
        for h in [3, 12, 21] {
            assert!(!w.contains(h), "hour {h} should be outside");
        }
    }

    #[test]
    fn cells_are_ranked_by_mean_descending() {
        let records = vec![
            usage("S1", "C1", datetime!(2025-08-22 19:00 UTC), 40.0),
            usage("S1", "C1", datetime!(2025-08-22 20:00 UTC), 60.0),
            usage("S1", "C2", datetime!(2025-08-22 21:00 UTC), 90.0),
            usage("S2", "C3", datetime!(2025-08-22 23:00 UTC), 70.0),
            // outside the window
            usage("S2", "C3", datetime!(2025-08-22 12:00 UTC), 0.0),
        ];

        let ranking = compute_prime_time_congestion(&records, 19, 23).unwrap();
        let order: Vec<_> = ranking.iter().map(|c| c.cell_id.as_str()).collect();
        assert_eq!(order, ["C2", "C3", "C1"]);
        assert_eq!(ranking[2].mean_utilization_pct, 50.0);
        assert_eq!(ranking[2].samples, 2);
        assert_eq!(ranking[1].site_id, "S2");
    }

    #[test]
    fn equal_means_are_ordered_by_cell_id() {
        let records = vec![
            usage("S1", "C9", datetime!(2025-08-22 19:00 UTC), 50.0),
            usage("S1", "C1", datetime!(2025-08-22 20:00 UTC), 50.0),
        ];
        let ranking = compute_prime_time_congestion(&records, 19, 23).unwrap();
        assert_eq!(ranking[0].cell_id, "C1");
    }

    #[test]
    fn records_outside_window_give_empty_ranking() {
        let records = vec![
            usage("S1", "C1", datetime!(2025-08-22 08:00 UTC), 99.0),
            usage("S1", "C2", datetime!(2025-08-22 18:59 UTC), 99.0),
        ];
        assert!(compute_prime_time_congestion(&records, 19, 23).unwrap().is_empty());
    }

    #[test]
    fn single_record_mean_is_its_value() {
        let records = vec![usage("S1", "C1", datetime!(2025-08-22 19:30 UTC), 37.25)];
        let ranking = compute_prime_time_congestion(&records, 19, 23).unwrap();
        assert_eq!(ranking[0].mean_utilization_pct, 37.25);
    }

    #[test]
    fn midnight_window_picks_up_early_morning_records() {
        let records = vec![
            usage("S1", "C1", datetime!(2025-08-22 01:00 UTC), 80.0),
            usage("S1", "C2", datetime!(2025-08-22 12:00 UTC), 95.0),
        ];
        let ranking = compute_prime_time_congestion(&records, 22, 2).unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].cell_id, "C1");
    }

    #[test]
    fn bad_hours_are_invalid_range() {
        assert!(matches!(
            compute_prime_time_congestion(&Vec::<UsageRecord>::new(), 19, 99),
            Err(AnalyticsError::InvalidRange(_))
        ));
    }

    #[test]
    fn top_n_truncates_ranking() {
        let records: Vec<_> = (0..5)
            .map(|i| {
                let ts = datetime!(2025-08-22 20:00 UTC);
                usage("S1", &format!("C{i}"), ts, 10.0 * i as f64)
            })
            .collect();
        let top = top_congested_cells(&records, HourWindow::default(), 2);
        let order: Vec<_> = top.iter().map(|c| c.cell_id.as_str()).collect();
        assert_eq!(order, ["C4", "C3"]);
    }

    #[test]
    fn congested_records_are_sorted_worst_first() {
        let mut slow = usage("S1", "C2", datetime!(2025-08-22 21:00 UTC), 85.0);
        slow.latency_ms = 80.0;
        let records = vec![
            usage("S1", "C1", datetime!(2025-08-22 20:00 UTC), 85.0),
            slow,
            usage("S1", "C3", datetime!(2025-08-22 22:00 UTC), 95.0),
            usage("S1", "C4", datetime!(2025-08-22 22:00 UTC), 79.9),
            usage("S1", "C5", datetime!(2025-08-22 10:00 UTC), 99.0),
        ];

        let rows = congested_records(&records, Some(HourWindow::default()), 80.0).unwrap();
        let order: Vec<_> = rows.iter().map(|r| r.cell_id.as_str()).collect();
        assert_eq!(order, ["C3", "C2", "C1"]);

        let rows = congested_records(&records, None, 80.0).unwrap();
        let order: Vec<_> = rows.iter().map(|r| r.cell_id.as_str()).collect();
        assert_eq!(order, ["C5", "C3", "C2", "C1"]);
    }

    #[test]
    fn congestion_threshold_must_be_a_percentage() {
        assert!(matches!(
            congested_records(&Vec::<UsageRecord>::new(), None, 120.0),
            Err(AnalyticsError::InvalidRange(_))
        ));
    }
}

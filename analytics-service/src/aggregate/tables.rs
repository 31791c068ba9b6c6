use std::{collections::BTreeMap, fmt, str::FromStr};

use network_client::domain::{Tech, UsageRecord};
use serde::Serialize;
use time::Date;

use super::{
    busy_hour::{busy_hours_by_site, BusyHour},
    prime_time::{congested_records, top_congested_cells, CellCongestion, CongestedRecord},
    stats::{compute_percentile, Mean},
};
use crate::{config::AnalysisConfig, error::AnalyticsError};

const KPI_PERCENTILE: f64 = 0.95;

/// Headline numbers for a selection of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub rows: usize,
    pub p95_utilization_pct: f64,
    pub peak_utilization_pct: f64,
    pub mean_latency_ms: f64,
    pub mean_users_active: f64,
}

pub fn kpis(records: &[&UsageRecord]) -> Result<Kpis, AnalyticsError> {
    let utilization: Vec<f64> = records.iter().map(|r| r.utilization_pct).collect();
    let p95 = compute_percentile(&utilization, KPI_PERCENTILE)?;
    let peak = utilization.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let latency: Mean = records.iter().map(|r| r.latency_ms).collect();
    let users: Mean = records.iter().map(|r| f64::from(r.users_active)).collect();

    Ok(Kpis {
        rows: records.len(),
        p95_utilization_pct: p95,
        peak_utilization_pct: peak,
        mean_latency_ms: latency.value().unwrap_or_default(),
        mean_users_active: users.value().unwrap_or_default(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteHourRow {
    pub site_id: String,
    pub hour: u8,
    pub mean_utilization_pct: f64,
    pub p95_utilization_pct: f64,
    pub mean_latency_ms: f64,
    pub mean_users_active: f64,
    pub samples: usize,
}

/// The hour of day with the highest p95 utilization for a site, across all days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusyHourOfDayRow {
    pub site_id: String,
    pub hour: u8,
    pub p95_utilization_pct: f64,
    pub mean_utilization_pct: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteDayRow {
    pub site_id: String,
    pub date: Date,
    pub mean_utilization_pct: f64,
    pub peak_utilization_pct: f64,
    pub mean_latency_ms: f64,
    pub mean_users_active: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourOfDayRow {
    pub hour: u8,
    pub tech: Tech,
    pub mean_utilization_pct: f64,
}

#[derive(Default)]
struct GroupStats {
    utilization: Vec<f64>,
    latency: Mean,
    users: Mean,
}

impl GroupStats {
    fn push(&mut self, r: &UsageRecord) {
        self.utilization.push(r.utilization_pct);
        self.latency.push(r.latency_ms);
        self.users.push(f64::from(r.users_active));
    }

    fn mean_utilization(&self) -> f64 {
        self.utilization.iter().copied().collect::<Mean>().value().unwrap_or_default()
    }

    fn peak_utilization(&self) -> f64 {
        self.utilization.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Per site and hour of day: mean and p95 utilization, mean latency and users.
pub fn site_hour(records: &[&UsageRecord]) -> Result<Vec<SiteHourRow>, AnalyticsError> {
    let mut groups: BTreeMap<(&str, u8), GroupStats> = BTreeMap::new();
    for r in records {
        groups.entry((r.site_id.as_str(), r.timestamp.hour())).or_default().push(r);
    }

    groups
        .into_iter()
        .map(|((site_id, hour), g)| {
            Ok(SiteHourRow {
                site_id: site_id.to_string(),
                hour,
                mean_utilization_pct: g.mean_utilization(),
                p95_utilization_pct: compute_percentile(&g.utilization, KPI_PERCENTILE)?,
                mean_latency_ms: g.latency.value().unwrap_or_default(),
                mean_users_active: g.users.value().unwrap_or_default(),
                samples: g.utilization.len(),
            })
        })
        .collect()
}

/// Picks each site's busiest hour of day from `site_hour` rows. Rows must be
/// ordered by site then hour, as [`site_hour`] returns them; ties keep the
/// earliest hour.
pub fn busy_hour_of_day(rows: &[SiteHourRow]) -> Vec<BusyHourOfDayRow> {
    let mut out: Vec<BusyHourOfDayRow> = Vec::new();

    for row in rows {
        match out.last_mut() {
            Some(best) if best.site_id == row.site_id => {
                if row.p95_utilization_pct > best.p95_utilization_pct {
                    *best = BusyHourOfDayRow::from(row);
                }
            }
            _ => out.push(BusyHourOfDayRow::from(row)),
        }
    }

    out
}

impl From<&SiteHourRow> for BusyHourOfDayRow {
    fn from(row: &SiteHourRow) -> Self {
        Self {
            site_id: row.site_id.clone(),
            hour: row.hour,
            p95_utilization_pct: row.p95_utilization_pct,
            mean_utilization_pct: row.mean_utilization_pct,
            samples: row.samples,
        }
    }
}

/// Per site and calendar day: mean and peak utilization, mean latency and users.
pub fn site_day(records: &[&UsageRecord]) -> Vec<SiteDayRow> {
    let mut groups: BTreeMap<(&str, Date), GroupStats> = BTreeMap::new();
    for r in records {
        groups.entry((r.site_id.as_str(), r.timestamp.date())).or_default().push(r);
    }

    groups
        .into_iter()
        .map(|((site_id, date), g)| SiteDayRow {
            site_id: site_id.to_string(),
            date,
            mean_utilization_pct: g.mean_utilization(),
            peak_utilization_pct: g.peak_utilization(),
            mean_latency_ms: g.latency.value().unwrap_or_default(),
            mean_users_active: g.users.value().unwrap_or_default(),
        })
        .collect()
}

/// Mean utilization per hour of day, split by technology.
pub fn hour_of_day(records: &[&UsageRecord]) -> Vec<HourOfDayRow> {
    let mut groups: BTreeMap<(u8, Tech), Mean> = BTreeMap::new();
    for r in records {
        groups.entry((r.timestamp.hour(), r.tech)).or_default().push(r.utilization_pct);
    }

    groups
        .into_iter()
        .filter_map(|((hour, tech), mean)| {
            Some(HourOfDayRow {
                hour,
                tech,
                mean_utilization_pct: mean.value()?,
            })
        })
        .collect()
}

/// Names of the exportable tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableName {
    SiteHour,
    SiteDay,
    BusyHour,
    BusyHourOfDay,
    PrimeTime,
    CongestedCells,
    HourOfDay,
}

impl TableName {
    pub const ALL: [TableName; 7] = [
        Self::SiteHour,
        Self::SiteDay,
        Self::BusyHour,
        Self::BusyHourOfDay,
        Self::PrimeTime,
        Self::CongestedCells,
        Self::HourOfDay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SiteHour => "site_hour",
            Self::SiteDay => "site_day",
            Self::BusyHour => "busy_hour",
            Self::BusyHourOfDay => "busy_hour_of_day",
            Self::PrimeTime => "prime_time",
            Self::CongestedCells => "congested_cells",
            Self::HourOfDay => "hour_of_day",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_suffix(".csv").unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| format!("unknown table '{s}'"))
    }
}

/// Every analysis table for one selection of records.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTables {
    pub site_hour: Vec<SiteHourRow>,
    pub site_day: Vec<SiteDayRow>,
    pub busy_hour: Vec<BusyHour>,
    pub busy_hour_of_day: Vec<BusyHourOfDayRow>,
    pub prime_time: Vec<CellCongestion>,
    pub congested_cells: Vec<CongestedRecord>,
    pub hour_of_day: Vec<HourOfDayRow>,
}

pub fn compute_tables(
    records: &[&UsageRecord],
    analysis: &AnalysisConfig,
) -> Result<AnalysisTables, AnalyticsError> {
    let started = std::time::Instant::now();
    let window = analysis.prime_time;
    let site_hour = site_hour(records)?;

    let tables = AnalysisTables {
        busy_hour_of_day: busy_hour_of_day(&site_hour),
        site_hour,
        site_day: site_day(records),
        busy_hour: busy_hours_by_site(records.iter().copied(), analysis.busy_hour_percentile)?,
        prime_time: top_congested_cells(records.iter().copied(), window, analysis.top_n),
        // all hours of the day, unlike the prime-time ranking
        congested_cells: congested_records(
            records.iter().copied(),
            None,
            analysis.congestion_threshold_pct,
        )?,
        hour_of_day: hour_of_day(records),
    };

    metrics::histogram!("analysis_tables_seconds").record(started.elapsed().as_secs_f64());
    tracing::debug!(
        records = records.len(),
        sites = tables.busy_hour.len(),
        congested = tables.congested_cells.len(),
        "analysis tables computed"
    );

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::usage;
    use time::macros::{date, datetime};

    fn sample() -> Vec<UsageRecord> {
        let mut nr = usage("S2", "C3", datetime!(2025-08-23 20:15 UTC), 90.0);
        nr.tech = Tech::Nr;
        nr.latency_ms = 40.0;
        nr.users_active = 30;
        vec![
            usage("S1", "C1", datetime!(2025-08-22 20:00 UTC), 40.0),
            usage("S1", "C2", datetime!(2025-08-22 20:30 UTC), 80.0),
            usage("S1", "C1", datetime!(2025-08-22 09:00 UTC), 10.0),
            nr,
        ]
    }

    #[test]
    fn kpis_summarise_the_selection() {
        let records = sample();
        let refs: Vec<_> = records.iter().collect();
        let k = kpis(&refs).unwrap();
        assert_eq!(k.rows, 4);
        assert_eq!(k.peak_utilization_pct, 90.0);
        assert_eq!(k.mean_latency_ms, 25.0);
        assert_eq!(k.mean_users_active, 15.0);
        // sorted [10, 40, 80, 90]; rank 2.85
        assert!((k.p95_utilization_pct - 88.5).abs() < 1e-9);
    }

    #[test]
    fn kpis_of_nothing_is_empty_input() {
        assert!(matches!(kpis(&[]), Err(AnalyticsError::EmptyInput(_))));
    }

    #[test]
    fn site_hour_groups_by_hour_of_day() {
        let records = sample();
        let refs: Vec<_> = records.iter().collect();
        let rows = site_hour(&refs).unwrap();
        let keys: Vec<_> = rows.iter().map(|r| (r.site_id.as_str(), r.hour)).collect();
        assert_eq!(keys, [("S1", 9), ("S1", 20), ("S2", 20)]);
        assert_eq!(rows[1].mean_utilization_pct, 60.0);
        assert!((rows[1].p95_utilization_pct - 78.0).abs() < 1e-9);
    }

    #[test]
    fn busy_hour_of_day_prefers_the_hour_busy_every_day() {
        let records = vec![
            usage("S1", "C1", datetime!(2025-08-20 20:00 UTC), 74.0),
            usage("S1", "C1", datetime!(2025-08-21 20:00 UTC), 74.0),
            usage("S1", "C1", datetime!(2025-08-22 20:00 UTC), 74.0),
            usage("S1", "C1", datetime!(2025-08-20 10:00 UTC), 75.0),
            usage("S1", "C1", datetime!(2025-08-21 10:00 UTC), 5.0),
        ];
        let refs: Vec<_> = records.iter().collect();

        // the single 75% spike wins the dated busy hour
        let dated = busy_hours_by_site(refs.iter().copied(), 0.95).unwrap();
        assert_eq!(dated[0].hour, datetime!(2025-08-20 10:00 UTC));

        let rows = busy_hour_of_day(&site_hour(&refs).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hour, 20);
        assert_eq!(rows[0].p95_utilization_pct, 74.0);
        assert_eq!(rows[0].samples, 3);
    }

    #[test]
    fn busy_hour_of_day_ties_keep_the_earliest_hour() {
        let records = vec![
            usage("S1", "C1", datetime!(2025-08-22 21:00 UTC), 70.0),
            usage("S1", "C1", datetime!(2025-08-22 08:00 UTC), 70.0),
            usage("S2", "C2", datetime!(2025-08-22 03:00 UTC), 10.0),
        ];
        let refs: Vec<_> = records.iter().collect();
        let rows = busy_hour_of_day(&site_hour(&refs).unwrap());
        let picked: Vec<_> = rows.iter().map(|r| (r.site_id.as_str(), r.hour)).collect();
        assert_eq!(picked, [("S1", 8), ("S2", 3)]);
    }

    #[test]
    fn site_day_tracks_peak() {
        let records = sample();
        let refs: Vec<_> = records.iter().collect();
        let rows = site_day(&refs);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date!(2025-08-22));
        assert_eq!(rows[0].peak_utilization_pct, 80.0);
        assert!((rows[0].mean_utilization_pct - 130.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn hour_of_day_splits_by_tech() {
        let records = sample();
        let refs: Vec<_> = records.iter().collect();
        let rows = hour_of_day(&refs);
        let keys: Vec<_> = rows.iter().map(|r| (r.hour, r.tech)).collect();
        assert_eq!(keys, [(9, Tech::Lte), (20, Tech::Lte), (20, Tech::Nr)]);
    }

    #[test]
    fn congested_cells_table_covers_all_hours() {
        let records = vec![
            usage("S1", "C1", datetime!(2025-08-22 09:00 UTC), 95.0),
            usage("S1", "C1", datetime!(2025-08-22 20:00 UTC), 85.0),
        ];
        let refs: Vec<_> = records.iter().collect();
        let tables = compute_tables(&refs, &AnalysisConfig::default()).unwrap();
        let stamps: Vec<_> = tables.congested_cells.iter().map(|r| r.timestamp).collect();
        assert_eq!(
            stamps,
            [datetime!(2025-08-22 09:00 UTC), datetime!(2025-08-22 20:00 UTC)]
        );
    }

    #[test]
    fn table_names_round_trip_with_optional_extension() {
        assert_eq!("busy_hour".parse::<TableName>(), Ok(TableName::BusyHour));
        assert_eq!("congested_cells.csv".parse::<TableName>(), Ok(TableName::CongestedCells));
        assert_eq!("busy_hour_of_day".parse::<TableName>(), Ok(TableName::BusyHourOfDay));
        assert!("nope".parse::<TableName>().is_err());
    }

    #[test]
    fn all_tables_are_computed_together() {
        let records = sample();
        let refs: Vec<_> = records.iter().collect();
        let tables = compute_tables(&refs, &AnalysisConfig::default()).unwrap();
        assert_eq!(tables.busy_hour.len(), 2);
        assert_eq!(tables.busy_hour_of_day.len(), 2);
        assert_eq!(tables.busy_hour_of_day[0].hour, 20);
        assert_eq!(tables.prime_time[0].cell_id, "C3");
        // 80 and 90 are at or above the default 80% threshold
        assert_eq!(tables.congested_cells.len(), 2);
    }
}

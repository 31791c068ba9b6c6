//! Cross-checks the in-process aggregates against the SQL reference queries.

use std::collections::HashMap;

use network_client::db::{CongestedCellRow, SiteBusyHourRow};

use crate::aggregate::{BusyHour, CellCongestion};

/// Largest tolerated difference between SQL and in-process statistics.
pub const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    MissingLocally { key: String },
    MissingInDatabase { key: String },
    BusyHour { site_id: String, sql: String, local: String },
    Value { key: String, sql: f64, local: f64 },
    Rank { position: usize, sql: String, local: String },
}

pub fn compare_busy_hours(sql: &[SiteBusyHourRow], local: &[BusyHour]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    let local_by_site: HashMap<&str, &BusyHour> =
        local.iter().map(|b| (b.site_id.as_str(), b)).collect();

    for row in sql {
        let Some(b) = local_by_site.get(row.site_id.as_str()) else {
            mismatches.push(Mismatch::MissingLocally {
                key: row.site_id.clone(),
            });
            continue;
        };
        if row.hour != b.hour {
            mismatches.push(Mismatch::BusyHour {
                site_id: row.site_id.clone(),
                sql: row.hour.to_string(),
                local: b.hour.to_string(),
            });
        } else if (row.utilization_pct - b.utilization_pct).abs() > TOLERANCE {
            mismatches.push(Mismatch::Value {
                key: row.site_id.clone(),
                sql: row.utilization_pct,
                local: b.utilization_pct,
            });
        }
    }

    let sql_sites: Vec<&str> = sql.iter().map(|r| r.site_id.as_str()).collect();
    mismatches.extend(
        local
            .iter()
            .filter(|b| !sql_sites.contains(&b.site_id.as_str()))
            .map(|b| Mismatch::MissingInDatabase {
                key: b.site_id.clone(),
            }),
    );

    mismatches
}

/// Compares two rankings position by position.
pub fn compare_rankings(sql: &[CongestedCellRow], local: &[CellCongestion]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    for (position, (s, l)) in sql.iter().zip(local).enumerate() {
        if s.cell_id != l.cell_id {
            mismatches.push(Mismatch::Rank {
                position,
                sql: s.cell_id.clone(),
                local: l.cell_id.clone(),
            });
        } else if (s.mean_utilization_pct - l.mean_utilization_pct).abs() > TOLERANCE {
            mismatches.push(Mismatch::Value {
                key: s.cell_id.clone(),
                sql: s.mean_utilization_pct,
                local: l.mean_utilization_pct,
            });
        }
    }

    mismatches.extend(sql.iter().skip(local.len()).map(|s| Mismatch::MissingLocally {
        key: s.cell_id.clone(),
    }));
    mismatches.extend(local.iter().skip(sql.len()).map(|l| Mismatch::MissingInDatabase {
        key: l.cell_id.clone(),
    }));

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sql_busy(site: &str, hour: time::OffsetDateTime, p: f64) -> SiteBusyHourRow {
        SiteBusyHourRow {
            site_id: site.to_string(),
            hour,
            utilization_pct: p,
            samples: 2,
        }
    }

    fn local_busy(site: &str, hour: time::OffsetDateTime, p: f64) -> BusyHour {
        BusyHour {
            site_id: site.to_string(),
            hour,
            utilization_pct: p,
            samples: 2,
        }
    }

    fn cell(cell_id: &str, mean: f64) -> (CongestedCellRow, CellCongestion) {
        (
            CongestedCellRow {
                cell_id: cell_id.to_string(),
                site_id: "S1".to_string(),
                mean_utilization_pct: mean,
                samples: 1,
            },
            CellCongestion {
                cell_id: cell_id.to_string(),
                site_id: "S1".to_string(),
                mean_utilization_pct: mean,
                samples: 1,
            },
        )
    }

    #[test]
    fn matching_busy_hours_have_no_mismatches() {
        let h = datetime!(2025-08-22 10:00 UTC);
        let sql = [sql_busy("S1", h, 88.0)];
        let local = [local_busy("S1", h, 88.0 + 1e-9)];
        assert!(compare_busy_hours(&sql, &local).is_empty());
    }

    #[test]
    fn busy_hour_differences_are_reported() {
        let sql = [
            sql_busy("S1", datetime!(2025-08-22 10:00 UTC), 88.0),
            sql_busy("S2", datetime!(2025-08-22 11:00 UTC), 50.0),
        ];
        let local = [
            local_busy("S1", datetime!(2025-08-22 11:00 UTC), 88.0),
            local_busy("S3", datetime!(2025-08-22 11:00 UTC), 50.0),
        ];

        let m = compare_busy_hours(&sql, &local);
        assert_eq!(m.len(), 3);
        assert!(matches!(m[0], Mismatch::BusyHour { .. }));
        assert_eq!(m[1], Mismatch::MissingLocally { key: "S2".to_string() });
        assert_eq!(m[2], Mismatch::MissingInDatabase { key: "S3".to_string() });
    }

    #[test]
    fn ranking_order_and_values_are_checked() {
        let (s1, l1) = cell("C1", 90.0);
        let (s2, l2) = cell("C2", 80.0);
        let (_, l3) = cell("C3", 70.0);

        let same = compare_rankings(&[s1.clone(), s2.clone()], &[l1.clone(), l2.clone()]);
        assert!(same.is_empty());

        let m = compare_rankings(&[s1.clone(), s2.clone()], &[l2.clone(), l1.clone(), l3]);
        assert_eq!(m.len(), 3);
        assert!(matches!(m[0], Mismatch::Rank { position: 0, .. }));
        assert_eq!(m[2], Mismatch::MissingInDatabase { key: "C3".to_string() });

        let mut drifted = l1;
        drifted.mean_utilization_pct = 89.0;
        let m = compare_rankings(&[s1], &[drifted]);
        assert!(matches!(m[0], Mismatch::Value { .. }));
    }
}

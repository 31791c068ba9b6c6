use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::UsageRecord;

/// Per-site busy hour as computed by the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SiteBusyHourRow {
    pub site_id: String,
    pub hour: OffsetDateTime,
    pub utilization_pct: f64,
    pub samples: i64,
}

/// Mean prime-time utilization of one cell as computed by the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CongestedCellRow {
    pub cell_id: String,
    pub site_id: String,
    pub mean_utilization_pct: f64,
    pub samples: i64,
}

// Utilization is recomputed from throughput/capacity so that rows with a NULL or
// stale stored value still aggregate. Zero-capacity rows are excluded upstream.
const USAGE_WITH_UTILIZATION: &str = r#"
    SELECT
        "timestamp",
        region,
        city,
        site_id,
        cell_id,
        tech,
        capacity_mbps::float8   AS capacity_mbps,
        throughput_mbps::float8 AS throughput_mbps,
        LEAST(GREATEST(throughput_mbps * 100.0 / capacity_mbps, 0.0), 100.0)::float8
                                AS utilization_pct,
        latency_ms::float8      AS latency_ms,
        packet_loss_pct::float8 AS packet_loss_pct,
        users_active::bigint    AS users_active
    FROM network_usage
    WHERE capacity_mbps > 0
      AND "timestamp" >= $1
"#;

/// Fetch all usage records newer than `since`, newest first, capped at `limit` rows.
pub async fn recent_usage(
    pool: &PgPool,
    since: OffsetDateTime,
    limit: i64,
) -> Result<Vec<UsageRecord>> {
    let sql = format!(
        r#"
        {USAGE_WITH_UTILIZATION}
        ORDER BY "timestamp" DESC
        LIMIT $2
        "#
    );

    let rows = sqlx::query_as::<_, UsageRecord>(&sql)
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Busy hour per site: the hourly bucket with the highest `percentile` of
/// utilization, earliest hour on ties.
pub async fn busy_hour_per_site(
    pool: &PgPool,
    since: OffsetDateTime,
    percentile: f64,
) -> Result<Vec<SiteBusyHourRow>> {
    let sql = format!(
        r#"
        WITH usage AS (
            {USAGE_WITH_UTILIZATION}
        ),
        hourly AS (
            SELECT
                site_id,
                date_trunc('hour', "timestamp") AS hour,
                percentile_cont($2::float8) WITHIN GROUP (ORDER BY utilization_pct) AS utilization_pct,
                COUNT(*) AS samples
            FROM usage
            GROUP BY site_id, date_trunc('hour', "timestamp")
        ),
        ranked AS (
            SELECT
                site_id,
                hour,
                utilization_pct,
                samples,
                ROW_NUMBER() OVER (PARTITION BY site_id ORDER BY utilization_pct DESC, hour ASC) AS rn
            FROM hourly
        )
        SELECT site_id, hour, utilization_pct, samples
        FROM ranked
        WHERE rn = 1
        ORDER BY site_id
        "#
    );

    let rows = sqlx::query_as::<_, SiteBusyHourRow>(&sql)
        .bind(since)
        .bind(percentile)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Cells ranked by mean utilization inside an inclusive hour-of-day window.
///
/// A window with `start_hour > end_hour` crosses midnight.
pub async fn top_congested_cells(
    pool: &PgPool,
    since: OffsetDateTime,
    start_hour: i32,
    end_hour: i32,
    limit: i64,
) -> Result<Vec<CongestedCellRow>> {
    let sql = format!(
        r#"
        WITH usage AS (
            {USAGE_WITH_UTILIZATION}
        )
        SELECT
            cell_id,
            MIN(site_id)                  AS site_id,
            AVG(utilization_pct)::float8  AS mean_utilization_pct,
            COUNT(*)                      AS samples
        FROM usage
        WHERE CASE
                WHEN $2::int <= $3::int
                    THEN EXTRACT(HOUR FROM "timestamp") BETWEEN $2::int AND $3::int
                ELSE EXTRACT(HOUR FROM "timestamp") >= $2::int
                  OR EXTRACT(HOUR FROM "timestamp") <= $3::int
              END
        GROUP BY cell_id
        ORDER BY mean_utilization_pct DESC, cell_id ASC
        LIMIT $4
        "#
    );

    let rows = sqlx::query_as::<_, CongestedCellRow>(&sql)
        .bind(since)
        .bind(start_hour)
        .bind(end_hour)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

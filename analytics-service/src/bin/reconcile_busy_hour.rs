use analytics_service::{
    aggregate::{busy_hours_by_site, top_congested_cells},
    config::AppConfig,
    loader, observability,
    reconcile::{compare_busy_hours, compare_rankings},
    sources::RowLimitPolicy,
};
use anyhow::{bail, Context, Result};
use network_client::db;

/// Runs the SQL busy-hour and prime-time queries over the configured lookback
/// window and checks that the in-process aggregates agree with them.
///
/// Both sides read the same window. The local load fails instead of truncating
/// when `database.row_limit` is reached, since the SQL side has no limit.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let db_cfg = cfg
        .database
        .as_ref()
        .context("[database] section is required for reconciliation")?;
    let analysis = &cfg.analysis;
    let window = analysis.prime_time;

    let pool = loader::connect(db_cfg).await?;
    let since = loader::lookback_start(db_cfg);

    let sql_busy = db::busy_hour_per_site(&pool, since, analysis.busy_hour_percentile).await?;
    let sql_top = db::top_congested_cells(
        &pool,
        since,
        i32::from(window.start_hour()),
        i32::from(window.end_hour()),
        analysis.top_n as i64,
    )
    .await?;

    let dataset = loader::load_database(pool, db_cfg, since, RowLimitPolicy::Fail).await?;
    if dataset.rejected() > 0 || dataset.conflicting() > 0 {
        tracing::warn!(
            rejected = dataset.rejected(),
            conflicting = dataset.conflicting(),
            "local load dropped rows the SQL queries still count; \
             mismatches on the affected sites and cells are expected"
        );
    }
    let local_busy = busy_hours_by_site(dataset.records(), analysis.busy_hour_percentile)?;
    let local_top = top_congested_cells(dataset.records(), window, analysis.top_n);

    let busy_mismatches = compare_busy_hours(&sql_busy, &local_busy);
    let rank_mismatches = compare_rankings(&sql_top, &local_top);

    for m in busy_mismatches.iter().chain(&rank_mismatches) {
        tracing::warn!(mismatch = ?m, "aggregate disagrees with SQL reference");
    }

    tracing::info!(
        sites = sql_busy.len(),
        cells = sql_top.len(),
        busy_hour_mismatches = busy_mismatches.len(),
        ranking_mismatches = rank_mismatches.len(),
        local_rejected = dataset.rejected(),
        local_conflicting = dataset.conflicting(),
        "reconciliation finished"
    );

    if !busy_mismatches.is_empty() || !rank_mismatches.is_empty() {
        bail!(
            "{} busy-hour and {} ranking mismatches",
            busy_mismatches.len(),
            rank_mismatches.len()
        );
    }

    Ok(())
}

use std::{path::Path, sync::Arc};

use anyhow::Context;
use network_client::domain::UsageRecord;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use time::{Duration, OffsetDateTime};

use crate::{
    config::{AppConfig, DatabaseConfig, SourceKind},
    dataset::Dataset,
    pipeline::{Pipeline, PipelineError, Source},
    sources::{RowLimitPolicy, UsageCsvFileSource, UsageDbSource},
    transform,
};

/// Runs `source` through validation and materializes the result.
pub async fn collect<S>(source: S) -> Result<Dataset, PipelineError>
where
    S: Source<UsageRecord> + Send + Sync + 'static,
{
    let pipeline: Pipeline<_, UsageRecord> = Pipeline {
        source,
        transforms: vec![Arc::new(transform::UsageValidation)],
    };
    let report = pipeline.collect().await?;
    let dataset = Dataset::from_records(report.records).with_rejected(report.rejected);

    tracing::info!(
        records = dataset.len(),
        rejected = dataset.rejected(),
        conflicting = dataset.conflicting(),
        fingerprint = dataset.fingerprint(),
        "dataset loaded"
    );
    if dataset.is_empty() {
        tracing::warn!("dataset is empty; every aggregate will report no data");
    }

    Ok(dataset)
}

pub async fn load_csv(path: &Path, delimiter: u8) -> anyhow::Result<Dataset> {
    let source = UsageCsvFileSource::new(path).with_delimiter(delimiter);
    collect(source)
        .await
        .with_context(|| format!("failed to load {}", path.display()))
}

/// Connects with the session time zone pinned to UTC, so SQL hour buckets line
/// up with the in-process ones.
pub async fn connect(db: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let options = db
        .uri
        .parse::<PgConnectOptions>()
        .context("invalid database.uri")?
        .options([("timezone", "UTC")]);

    PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

/// Start of the configured lookback window.
pub fn lookback_start(db: &DatabaseConfig) -> OffsetDateTime {
    OffsetDateTime::now_utc() - Duration::days(db.lookback_days)
}

/// Loads every usage row since `since`, capped at `database.row_limit`.
pub async fn load_database(
    pool: PgPool,
    db: &DatabaseConfig,
    since: OffsetDateTime,
    on_limit: RowLimitPolicy,
) -> anyhow::Result<Dataset> {
    let source = UsageDbSource::new(pool, since, db.row_limit).with_row_limit_policy(on_limit);
    collect(source)
        .await
        .with_context(|| format!("failed to load usage since {since}"))
}

/// Loads the dataset from whichever source the configuration selects.
pub async fn load_dataset(cfg: &AppConfig) -> anyhow::Result<Dataset> {
    match cfg.source.kind {
        SourceKind::Csv => {
            let path = cfg
                .source
                .csv_path
                .as_deref()
                .context("source.csv_path is required for csv sources")?;
            load_csv(path, cfg.source.delimiter_byte()?).await
        }
        SourceKind::Database => {
            let db = cfg
                .database
                .as_ref()
                .context("[database] is required for database sources")?;
            let pool = connect(db).await?;
            load_database(pool, db, lookback_start(db), RowLimitPolicy::Truncate).await
        }
    }
}

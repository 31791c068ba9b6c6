use network_client::{db, domain::UsageRecord};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::pipeline::{Envelope, PipelineError, RecordStream, Source};

/// What to do when the usage query returns `row_limit` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowLimitPolicy {
    /// Keep the newest rows and log a warning.
    #[default]
    Truncate,
    /// Abort the load; the caller needs the complete window.
    Fail,
}

/// Reads the recent usage window from the `network_usage` table.
pub struct UsageDbSource {
    pool: PgPool,
    since: OffsetDateTime,
    limit: i64,
    on_limit: RowLimitPolicy,
}

impl UsageDbSource {
    pub fn new(pool: PgPool, since: OffsetDateTime, limit: i64) -> Self {
        Self {
            pool,
            since,
            limit,
            on_limit: RowLimitPolicy::default(),
        }
    }

    pub fn with_row_limit_policy(mut self, on_limit: RowLimitPolicy) -> Self {
        self.on_limit = on_limit;
        self
    }
}

fn check_row_limit(rows: usize, limit: i64, on_limit: RowLimitPolicy) -> Result<(), PipelineError> {
    if (rows as i64) < limit {
        return Ok(());
    }
    match on_limit {
        RowLimitPolicy::Truncate => {
            tracing::warn!(limit, "usage query hit the row limit; older records were not loaded");
            Ok(())
        }
        RowLimitPolicy::Fail => Err(PipelineError::Source(format!(
            "usage query hit the row limit of {limit}; raise database.row_limit or shorten \
             database.lookback_days"
        ))),
    }
}

#[async_trait::async_trait]
impl Source<UsageRecord> for UsageDbSource {
    async fn stream(&self) -> RecordStream<UsageRecord> {
        let pool = self.pool.clone();
        let since = self.since;
        let limit = self.limit;
        let on_limit = self.on_limit;
        let s = async_stream::try_stream! {
            let rows = db::recent_usage(&pool, since, limit)
                .await
                .map_err(|e| PipelineError::Source(format!("usage query failed: {e}")))?;

            check_row_limit(rows.len(), limit, on_limit)?;
            tracing::info!(rows = rows.len(), since = %since, "fetched usage rows from database");

            for usage in rows {
                yield Envelope::now(usage);
            }
        };

        Box::pin(s)
    }
}

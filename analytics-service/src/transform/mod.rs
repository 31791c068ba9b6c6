use crate::pipeline::{Envelope, PipelineError, Transform};
use network_client::domain::UsageRecord;
use time::macros::datetime;

/// Pure validation of a `UsageRecord`.
///
/// Rules:
/// - capacity, throughput and latency must be non-negative.
/// - utilization and packet loss must be percentages in [0, 100].
/// - site and cell ids must be non-empty.
/// - timestamp must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_usage(env: Envelope<UsageRecord>) -> Result<Envelope<UsageRecord>, PipelineError> {
    let u = &env.payload;

    for (name, value) in [
        ("capacity_mbps", u.capacity_mbps),
        ("throughput_mbps", u.throughput_mbps),
        ("latency_ms", u.latency_ms),
    ] {
        if value.is_nan() || value < 0.0 {
            return Err(PipelineError::Transform(format!("{name} must be non-negative")));
        }
    }

    for (name, value) in [
        ("utilization_pct", u.utilization_pct),
        ("packet_loss_pct", u.packet_loss_pct),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(PipelineError::Transform(format!("{name} must be within [0, 100]")));
        }
    }

    if u.site_id.trim().is_empty() || u.cell_id.trim().is_empty() {
        return Err(PipelineError::Transform("site_id and cell_id must be set".to_string()));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if u.timestamp < min_ts || u.timestamp > max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct UsageValidation;

#[async_trait::async_trait]
impl Transform<UsageRecord, UsageRecord> for UsageValidation {
    async fn apply(
        &self,
        input: Envelope<UsageRecord>,
    ) -> Result<Envelope<UsageRecord>, PipelineError> {
        match validate_usage(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_usage_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

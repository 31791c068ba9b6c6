use network_client::domain::{Tech, UsageRecord};
use time::OffsetDateTime;

pub(crate) fn usage(
    site_id: &str,
    cell_id: &str,
    ts: OffsetDateTime,
    utilization_pct: f64,
) -> UsageRecord {
    UsageRecord {
        timestamp: ts,
        region: Some("North".to_string()),
        city: Some("Springfield".to_string()),
        site_id: site_id.to_string(),
        cell_id: cell_id.to_string(),
        tech: Tech::Lte,
        capacity_mbps: 100.0,
        throughput_mbps: utilization_pct,
        utilization_pct,
        latency_ms: 20.0,
        packet_loss_pct: 0.1,
        users_active: 10,
    }
}

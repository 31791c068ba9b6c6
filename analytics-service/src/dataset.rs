use std::collections::{hash_map::Entry, HashMap};

use network_client::domain::UsageRecord;

use crate::filter::UsageFilter;

/// The fully materialized, read-only set of usage records.
///
/// Construction enforces that every cell belongs to exactly one site: a record
/// naming a different site than the first record seen for its cell is dropped.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<UsageRecord>,
    fingerprint: String,
    conflicting: usize,
    rejected: usize,
}

impl Dataset {
    pub fn from_records(records: Vec<UsageRecord>) -> Self {
        let mut cell_sites: HashMap<String, String> = HashMap::new();
        let mut conflicting = 0usize;

        let records: Vec<UsageRecord> = records
            .into_iter()
            .filter(|r| match cell_sites.entry(r.cell_id.clone()) {
                Entry::Vacant(v) => {
                    v.insert(r.site_id.clone());
                    true
                }
                Entry::Occupied(o) if *o.get() == r.site_id => true,
                Entry::Occupied(o) => {
                    conflicting += 1;
                    tracing::warn!(
                        cell_id = %r.cell_id,
                        site_id = %r.site_id,
                        expected_site_id = %o.get(),
                        "cell reported under a second site, record dropped"
                    );
                    false
                }
            })
            .collect();

        if conflicting > 0 {
            metrics::counter!("dataset_conflicting_cell_records_total")
                .increment(conflicting as u64);
        }

        let fingerprint = fingerprint(&records);
        Self {
            records,
            fingerprint,
            conflicting,
            rejected: 0,
        }
    }

    /// Records the number of rows the loader rejected before construction.
    pub fn with_rejected(mut self, rejected: usize) -> Self {
        self.rejected = rejected;
        self
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// blake3 hex digest over every record, stable for identical input order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Records dropped for violating the cell-to-site mapping.
    pub fn conflicting(&self) -> usize {
        self.conflicting
    }

    /// Rows rejected while loading, reported by the loader.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn select(&self, filter: &UsageFilter) -> Vec<&UsageRecord> {
        self.records.iter().filter(|r| filter.matches(r)).collect()
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    let len = s.len() as u64;
    hasher.update(&len.to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_opt_str(hasher: &mut blake3::Hasher, s: &Option<String>) {
    match s {
        Some(v) => {
            hasher.update(&[1]);
            hash_str(hasher, v);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn hash_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

fn fingerprint(records: &[UsageRecord]) -> String {
    let mut h = blake3::Hasher::new();
    h.update(&(records.len() as u64).to_le_bytes());
    for r in records {
        h.update(&r.timestamp.unix_timestamp_nanos().to_le_bytes());
        hash_opt_str(&mut h, &r.region);
        hash_opt_str(&mut h, &r.city);
        hash_str(&mut h, &r.site_id);
        hash_str(&mut h, &r.cell_id);
        hash_str(&mut h, r.tech.as_str());
        hash_f64(&mut h, r.capacity_mbps);
        hash_f64(&mut h, r.throughput_mbps);
        hash_f64(&mut h, r.utilization_pct);
        hash_f64(&mut h, r.latency_ms);
        hash_f64(&mut h, r.packet_loss_pct);
        h.update(&r.users_active.to_le_bytes());
    }
    h.finalize().to_hex().to_string()
}

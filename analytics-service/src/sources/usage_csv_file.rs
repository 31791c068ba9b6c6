use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use network_client::domain::{derive_utilization_pct, Tech, UsageRecord};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::pipeline::{Envelope, PipelineError, RecordStream, Source};

/// Column names every usage file must provide (after alias resolution).
pub const REQUIRED_COLUMNS: [&str; 12] = [
    "timestamp",
    "region",
    "city",
    "site_id",
    "cell_id",
    "tech",
    "capacity_mbps",
    "throughput_mbps",
    "utilization_pct",
    "latency_ms",
    "packet_loss_pct",
    "users_active",
];

/// Accepted spellings of the timestamp column, in lookup order.
const TIMESTAMP_ALIASES: [&str; 5] = ["timestamp", "time", "datetime", "event_time", "date_time"];

/// Delimited-text source for `UsageRecord`.
///
/// Expects a header row naming every column in [`REQUIRED_COLUMNS`]; extra
/// columns are ignored. Rows that fail to parse are reported as rejected and
/// skipped, while an unreadable file, a missing column or a file in which no
/// timestamp parses aborts the load.
pub struct UsageCsvFileSource {
    path: PathBuf,
    delimiter: u8,
}

impl UsageCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    /// Use another field separator, e.g. `b'|'` for `.dat` exports.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[derive(Debug)]
struct ColumnIndex {
    timestamp: usize,
    region: usize,
    city: usize,
    site_id: usize,
    cell_id: usize,
    tech: usize,
    capacity_mbps: usize,
    throughput_mbps: usize,
    utilization_pct: usize,
    latency_ms: usize,
    packet_loss_pct: usize,
    users_active: usize,
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord) -> Result<Self, PipelineError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let mut missing: Vec<&'static str> = Vec::new();
        let timestamp = TIMESTAMP_ALIASES.iter().find_map(|&alias| find(alias));
        if timestamp.is_none() {
            missing.push("timestamp");
        }

        let mut require = |name: &'static str| {
            find(name).unwrap_or_else(|| {
                missing.push(name);
                0
            })
        };

        let index = Self {
            timestamp: timestamp.unwrap_or_default(),
            region: require("region"),
            city: require("city"),
            site_id: require("site_id"),
            cell_id: require("cell_id"),
            tech: require("tech"),
            capacity_mbps: require("capacity_mbps"),
            throughput_mbps: require("throughput_mbps"),
            utilization_pct: require("utilization_pct"),
            latency_ms: require("latency_ms"),
            packet_loss_pct: require("packet_loss_pct"),
            users_active: require("users_active"),
        };

        if missing.is_empty() {
            Ok(index)
        } else {
            missing.sort_unstable();
            Err(PipelineError::Source(format!(
                "usage file is missing required columns: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Parses RFC 3339, or a naive `YYYY-MM-DD HH:MM[:SS[.fff]]` (space or `T`)
/// interpreted as UTC.
pub fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(ts);
    }

    let normalized = s.replacen('T', " ", 1);
    PrimitiveDateTime::parse(
        &normalized,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            &normalized,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        )
    })
    .or_else(|_| {
        PrimitiveDateTime::parse(
            &normalized,
            format_description!("[year]-[month]-[day] [hour]:[minute]"),
        )
    })
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}

fn rejected(msg: String) -> PipelineError {
    PipelineError::Rejected(msg)
}

fn parse_f64(name: &str, s: &str) -> Result<f64, PipelineError> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| rejected(format!("invalid {name} '{s}'")))
}

fn parse_optional_f64(s: &str) -> Option<f64> {
    if s.is_empty() {
        None
    } else {
        s.parse().ok().filter(|v: &f64| v.is_finite())
    }
}

fn parse_optional_string(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_count(s: &str) -> Result<u32, PipelineError> {
    if let Ok(v) = s.parse::<u32>() {
        return Ok(v);
    }
    // Spreadsheet exports often write integers as "12.0".
    match s.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&v) => Ok(v as u32),
        _ => Err(rejected(format!("invalid users_active '{s}'"))),
    }
}

fn record_to_usage(
    record: &StringRecord,
    cols: &ColumnIndex,
    timestamp: OffsetDateTime,
) -> Result<UsageRecord, PipelineError> {
    let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

    let site_id = field(cols.site_id);
    let cell_id = field(cols.cell_id);
    if site_id.is_empty() || cell_id.is_empty() {
        return Err(rejected("empty site_id or cell_id".to_string()));
    }

    let tech: Tech = field(cols.tech)
        .parse()
        .map_err(|e| rejected(format!("{e}")))?;

    let capacity_mbps = parse_f64("capacity_mbps", field(cols.capacity_mbps))?;
    let throughput_mbps = parse_f64("throughput_mbps", field(cols.throughput_mbps))?;
    let utilization_pct = match parse_optional_f64(field(cols.utilization_pct)) {
        Some(v) => v,
        None => derive_utilization_pct(throughput_mbps, capacity_mbps).ok_or_else(|| {
            rejected("utilization_pct missing and capacity_mbps is not positive".to_string())
        })?,
    };

    Ok(UsageRecord {
        timestamp,
        region: parse_optional_string(field(cols.region)),
        city: parse_optional_string(field(cols.city)),
        site_id: site_id.to_string(),
        cell_id: cell_id.to_string(),
        tech,
        capacity_mbps,
        throughput_mbps,
        utilization_pct,
        latency_ms: parse_f64("latency_ms", field(cols.latency_ms))?,
        packet_loss_pct: parse_f64("packet_loss_pct", field(cols.packet_loss_pct))?,
        users_active: parse_count(field(cols.users_active))?,
    })
}

#[async_trait::async_trait]
impl Source<UsageRecord> for UsageCsvFileSource {
    async fn stream(&self) -> RecordStream<UsageRecord> {
        // Blocking CSV reader wrapped in a single async stream; files are
        // expected to fit in memory anyway.
        let path = self.path.clone();
        let delimiter = self.delimiter;
        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to open usage file {}: {e}",
                        path.display()
                    )));
                    return;
                }
            };
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .trim(csv::Trim::All)
                .from_reader(file);

            let cols = match rdr.headers() {
                Ok(headers) => ColumnIndex::resolve(headers),
                Err(e) => Err(PipelineError::Source(format!("failed to read headers: {e}"))),
            };
            let cols = match cols {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut rows = 0usize;
            let mut parsed_timestamps = 0usize;
            for result in rdr.records() {
                let record = match result {
                    Ok(r) => r,
                    Err(e) => {
                        yield Err(PipelineError::Source(format!("failed to read record: {e}")));
                        return;
                    }
                };
                rows += 1;

                let raw_ts = record.get(cols.timestamp).unwrap_or("");
                let Some(timestamp) = parse_timestamp(raw_ts) else {
                    metrics::counter!("usage_file_rejected_rows_total").increment(1);
                    yield Err(rejected(format!("invalid timestamp '{raw_ts}'")));
                    continue;
                };
                parsed_timestamps += 1;

                match record_to_usage(&record, &cols, timestamp) {
                    Ok(usage) => yield Ok(Envelope::now(usage)),
                    Err(e) => {
                        metrics::counter!("usage_file_rejected_rows_total").increment(1);
                        yield Err(e);
                    }
                }
            }

            if rows > 0 && parsed_timestamps == 0 {
                yield Err(PipelineError::Source(
                    "no valid timestamps found; expected e.g. 2025-08-22 19:05:00".to_string(),
                ));
            }
        };

        Box::pin(s)
    }
}

use std::{env, path::PathBuf};

use analytics_service::{
    aggregate::{compute_tables, kpis},
    config::AnalysisConfig,
    export, loader, observability,
};
use anyhow::{bail, Result};

/// Export every analysis table from a usage CSV file.
///
/// Usage:
///   export_tables <csv_path> <out_dir> [delimiter]
///
/// Analysis settings come from `ANALYTICS_CONFIG` when it is set, otherwise
/// the defaults (p95 busy hour, 19-23 prime time, top 10, 80% threshold).
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: export_tables <csv_path> <out_dir> [delimiter]");
    }
    let csv_path = PathBuf::from(&args[1]);
    let out_dir = PathBuf::from(&args[2]);
    let delimiter = match args.get(3).map(String::as_bytes) {
        None => b',',
        Some([d]) => *d,
        Some(_) => bail!("delimiter must be a single byte"),
    };

    let analysis = match env::var("ANALYTICS_CONFIG") {
        Ok(_) => analytics_service::config::AppConfig::load()?.analysis,
        Err(_) => AnalysisConfig::default(),
    };

    let dataset = loader::load_csv(&csv_path, delimiter).await?;
    let records: Vec<_> = dataset.records().iter().collect();
    if records.is_empty() {
        bail!("no usable records in {}", csv_path.display());
    }

    let summary = kpis(&records)?;
    tracing::info!(
        rows = summary.rows,
        p95_utilization_pct = summary.p95_utilization_pct,
        peak_utilization_pct = summary.peak_utilization_pct,
        mean_latency_ms = summary.mean_latency_ms,
        "usage summary"
    );

    let tables = compute_tables(&records, &analysis)?;
    export::export_all(&tables, &out_dir)?;

    Ok(())
}

//! End-to-end loading of usage files through the validation pipeline.

use std::{fs, path::PathBuf};

use analytics_service::{
    aggregate::{compute_busy_hour, compute_prime_time_congestion, compute_tables, TableName},
    config::AnalysisConfig,
    export, loader,
    pipeline::PipelineError,
    sources::UsageCsvFileSource,
};
use network_client::domain::Tech;
use tempfile::TempDir;
use time::macros::datetime;

const HEADER: &str = "timestamp,region,city,site_id,cell_id,tech,capacity_mbps,throughput_mbps,utilization_pct,latency_ms,packet_loss_pct,users_active";

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn sample_csv() -> String {
    [
        HEADER,
        "2025-08-22 10:00:00,North,Springfield,S1,C1,4G,100,50,50,20,0.1,10",
        "2025-08-22 10:15:00,North,Springfield,S1,C2,4G,100,90,90,25,0.2,12",
        "2025-08-22 11:00:00,North,Springfield,S1,C1,4G,100,60,60,18,0.1,9",
        "2025-08-22 20:00:00,South,Shelbyville,S2,C3,5G,400,300,,12,0.0,40",
        "2025-08-22 21:00:00,South,Shelbyville,S2,C3,5G,400,340,85,14,0.0,44",
        // rejected: bad timestamp, unknown tech, utilization out of range, moved cell
        "not-a-date,North,Springfield,S1,C1,4G,100,50,50,20,0.1,10",
        "2025-08-22 12:00:00,North,Springfield,S1,C1,3G,100,50,50,20,0.1,10",
        "2025-08-22 13:00:00,North,Springfield,S1,C1,4G,100,50,150,20,0.1,10",
        "2025-08-22 14:00:00,North,Springfield,S9,C1,4G,100,50,50,20,0.1,10",
    ]
    .join("\n")
}

#[tokio::test]
async fn csv_file_loads_and_drops_bad_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "usage.csv", &sample_csv());

    let dataset = loader::load_csv(&path, b',').await.unwrap();

    assert_eq!(dataset.len(), 5);
    assert_eq!(dataset.rejected(), 3);
    assert_eq!(dataset.conflicting(), 1);

    let derived = &dataset.records()[3];
    assert_eq!(derived.tech, Tech::Nr);
    assert_eq!(derived.utilization_pct, 75.0);
    assert_eq!(derived.city.as_deref(), Some("Shelbyville"));
}

#[tokio::test]
async fn loaded_records_feed_the_aggregates() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "usage.csv", &sample_csv());
    let dataset = loader::load_csv(&path, b',').await.unwrap();

    let busy = compute_busy_hour(dataset.records(), "S1", 0.95).unwrap();
    assert_eq!(busy.hour, datetime!(2025-08-22 10:00 UTC));
    assert!((busy.utilization_pct - 88.0).abs() < 1e-9);

    let ranking = compute_prime_time_congestion(dataset.records(), 19, 23).unwrap();
    assert_eq!(ranking.len(), 1);
    assert_eq!(ranking[0].cell_id, "C3");
    assert_eq!(ranking[0].mean_utilization_pct, 80.0);
}

#[tokio::test]
async fn pipe_delimited_files_with_aliased_timestamp_load() {
    let dir = TempDir::new().unwrap();
    let contents = sample_csv().replace(',', "|").replacen("timestamp", "event_time", 1);
    let path = write_file(&dir, "usage.dat", &contents);

    let dataset = loader::load_csv(&path, b'|').await.unwrap();
    assert_eq!(dataset.len(), 5);
}

#[tokio::test]
async fn missing_columns_abort_the_load() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "usage.csv",
        "timestamp,site_id,cell_id\n2025-08-22 10:00:00,S1,C1\n",
    );

    let err = analytics_service::loader::collect(UsageCsvFileSource::new(&path))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Source(_)));
    assert!(err.to_string().contains("capacity_mbps"), "{err}");
}

#[tokio::test]
async fn file_without_any_valid_timestamp_is_an_error() {
    let dir = TempDir::new().unwrap();
    let contents = [HEADER, "soon,N,C,S1,C1,4G,100,50,50,20,0.1,10"].join("\n");
    let path = write_file(&dir, "usage.csv", &contents);

    assert!(loader::load_csv(&path, b',').await.is_err());
}

#[tokio::test]
async fn missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.csv");
    assert!(loader::load_csv(&path, b',').await.is_err());
}

#[tokio::test]
async fn every_table_is_exported() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "usage.csv", &sample_csv());
    let dataset = loader::load_csv(&path, b',').await.unwrap();
    let records: Vec<_> = dataset.records().iter().collect();

    let tables = compute_tables(&records, &AnalysisConfig::default()).unwrap();
    let out = dir.path().join("tables");
    export::export_all(&tables, &out).unwrap();

    for name in TableName::ALL {
        let file = out.join(format!("{name}.csv"));
        let contents = fs::read_to_string(&file).unwrap();
        assert!(!contents.is_empty(), "{} is empty", file.display());
    }

    let busy = fs::read_to_string(out.join("busy_hour.csv")).unwrap();
    assert_eq!(busy.lines().count(), 3);
}

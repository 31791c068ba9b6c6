use std::{fs, io, path::Path};

use anyhow::Context;
use serde::Serialize;

use crate::aggregate::{AnalysisTables, TableName};

fn write_rows<W: io::Write, R: Serialize>(rows: &[R], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes one table as CSV with a header row.
///
/// Empty tables produce an empty output since the header is derived from rows.
pub fn write_table<W: io::Write>(
    tables: &AnalysisTables,
    name: TableName,
    writer: W,
) -> Result<(), csv::Error> {
    match name {
        TableName::SiteHour => write_rows(&tables.site_hour, writer),
        TableName::SiteDay => write_rows(&tables.site_day, writer),
        TableName::BusyHour => write_rows(&tables.busy_hour, writer),
        TableName::BusyHourOfDay => write_rows(&tables.busy_hour_of_day, writer),
        TableName::PrimeTime => write_rows(&tables.prime_time, writer),
        TableName::CongestedCells => write_rows(&tables.congested_cells, writer),
        TableName::HourOfDay => write_rows(&tables.hour_of_day, writer),
    }
}

pub fn table_to_csv(tables: &AnalysisTables, name: TableName) -> Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    write_table(tables, name, &mut buf)?;
    Ok(buf)
}

/// Writes every table to `<dir>/<name>.csv`, creating `dir` if needed.
pub fn export_all(tables: &AnalysisTables, dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    for name in TableName::ALL {
        let path = dir.join(format!("{name}.csv"));
        let file = fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        write_table(tables, name, io::BufWriter::new(file))
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(table = %name, path = %path.display(), "table exported");
    }

    Ok(())
}

//! Output sink
//!
//! Persists the valuation series as two CSV artifacts, overwritten in full
//! each run. Writes land in a temp file next to the target followed by a
//! rename, so API readers never observe a half-written file.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::{DETAIL_FILE, TOTALS_FILE};
use crate::valuation::{DailyTotal, ValuationReport};

/// Write both artifacts into `output_dir`.
pub fn write_report(output_dir: &Path, report: &ValuationReport) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {:?}", output_dir))?;

    write_csv(&output_dir.join(DETAIL_FILE), &report.rows)?;
    write_csv(&output_dir.join(TOTALS_FILE), &report.totals)?;

    info!(
        "Published {} valuation rows over {} days to {:?}",
        report.rows.len(),
        report.totals.len(),
        output_dir
    );
    Ok(())
}

/// Serialize records to CSV atomically: temp file, then rename into place.
fn write_csv<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");

    {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("failed to create {:?}", tmp))?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp, path).with_context(|| format!("failed to publish {:?}", path))
}

/// Read the daily totals artifact back, oldest first.
pub fn read_daily_totals(path: &Path) -> Result<Vec<DailyTotal>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open daily totals at {:?}", path))?;

    let mut totals = Vec::new();
    for record in reader.deserialize() {
        totals.push(record.context("malformed daily totals row")?);
    }
    Ok(totals)
}

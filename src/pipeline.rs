//! One pipeline run
//!
//! load ledger -> backfill prices -> value portfolio -> publish artifacts.
//! The database handle lives for exactly one run and is dropped on every
//! exit path.

use anyhow::Result;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backfill::{self, BackfillSummary};
use crate::pricing::PriceSource;
use crate::{db, ledger, output, valuation};

/// What a run did, for logs and the CLI summary
#[derive(Debug)]
pub struct RunReport {
    pub ledger_entries: usize,
    pub backfill: BackfillSummary,
    pub valuation_rows: usize,
    pub priced_days: usize,
}

/// Execute one full pipeline run against the given ledger.
///
/// `today` bounds the backfill range (exclusive) and is passed in rather
/// than read from the clock, so runs are reproducible under test.
pub async fn run_pipeline<P: PriceSource>(
    ledger_path: &Path,
    db_path: Option<PathBuf>,
    output_dir: &Path,
    source: &P,
    today: NaiveDate,
) -> Result<RunReport> {
    let entries = ledger::load_ledger(ledger_path)?;
    info!("Ledger loaded: {} entries", entries.len());

    db::init_database(db_path.clone())?;
    let mut conn = db::open_db(db_path)?;

    let backfill = backfill::backfill_prices(&mut conn, source, &entries, today).await?;

    let report = valuation::value_portfolio(&conn, &entries)?;
    output::write_report(output_dir, &report)?;

    Ok(RunReport {
        ledger_entries: entries.len(),
        backfill,
        valuation_rows: report.rows.len(),
        priced_days: report.totals.len(),
    })
}

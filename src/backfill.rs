//! Price backfill engine
//!
//! Brings the price store up to date for every security present in the
//! ledger: from the most recent stored date (or the security's first
//! transaction date when nothing is stored yet) through yesterday.
//! One security failing to price never fails the run.

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::error::TrackerError;
use crate::ledger::{earliest_value_dates, LedgerEntry};
use crate::pricing::PriceSource;

/// Where a security stands: first ledger activity vs. stored price coverage
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityCursor {
    pub symbol: String,
    pub earliest_txn: NaiveDate,
    pub last_stored: Option<NaiveDate>,
}

impl SecurityCursor {
    /// Backfill start policy: resume from the last stored date when there is
    /// one, otherwise from the first transaction date. Re-fetching the last
    /// stored day is intentional; the upsert overwrites it in place.
    pub fn backfill_start(&self) -> NaiveDate {
        self.last_stored.unwrap_or(self.earliest_txn)
    }
}

/// Outcome of one backfill pass
#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub securities_updated: usize,
    pub securities_skipped: usize,
    pub prices_upserted: usize,
}

/// Compute cursors for every distinct security in the ledger.
pub fn security_cursors(conn: &Connection, entries: &[LedgerEntry]) -> Result<Vec<SecurityCursor>> {
    let mut cursors = Vec::new();
    for (symbol, earliest_txn) in earliest_value_dates(entries) {
        let last_stored = db::latest_price_date(conn, &symbol)?;
        cursors.push(SecurityCursor {
            symbol,
            earliest_txn,
            last_stored,
        });
    }
    Ok(cursors)
}

/// Fill the store with daily closes over `[start, today)` per security.
///
/// An empty series or a failed fetch skips that security for this run and
/// leaves the rest untouched; store write failures abort the run. Each
/// security's batch commits atomically, so re-running is always safe.
pub async fn backfill_prices<P: PriceSource>(
    conn: &mut Connection,
    source: &P,
    entries: &[LedgerEntry],
    today: NaiveDate,
) -> Result<BackfillSummary> {
    let mut summary = BackfillSummary::default();

    for cursor in security_cursors(conn, entries)? {
        let start = cursor.backfill_start();

        match source.daily_closes(&cursor.symbol, start, today).await {
            Ok(closes) if closes.is_empty() => {
                let err = TrackerError::PriceFetchEmpty(cursor.symbol.clone());
                warn!("{}; skipping for this run", err);
                summary.securities_skipped += 1;
            }
            Ok(closes) => {
                let written = db::upsert_prices(conn, &cursor.symbol, &closes)?;
                info!("Backfilled {} closes for {}", written, cursor.symbol);
                summary.securities_updated += 1;
                summary.prices_upserted += written;
            }
            Err(e) => {
                warn!("Price fetch failed for {}: {:#}; skipping", cursor.symbol, e);
                summary.securities_skipped += 1;
            }
        }
    }

    Ok(summary)
}

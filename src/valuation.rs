//! Valuation engine
//!
//! Joins stored closing prices with cumulative ledger positions. Each
//! security's transactions are sorted once and folded into running totals
//! that advance alongside the ascending price dates, so a price row costs
//! O(1) instead of re-scanning the ledger.

use chrono::NaiveDate;
use itertools::Itertools;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::Result;
use crate::ledger::{earliest_value_dates, LedgerEntry};

/// Units, invested cash and market value of one security on one priced day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: Decimal,
    pub units_held: Decimal,
    pub cash_invested: Decimal,
    pub market_value: Decimal,
}

/// Portfolio-wide totals for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub market_value: Decimal,
    pub invested: Decimal,
}

/// Full output of one valuation pass
#[derive(Debug, Default)]
pub struct ValuationReport {
    pub rows: Vec<ValuationRow>,
    pub totals: Vec<DailyTotal>,
}

/// Value every security across its stored price dates, then aggregate into
/// daily totals.
///
/// Rows start at each security's first transaction date: stray prices stored
/// before that date are never emitted. A date with no stored price for a
/// security produces no row for it (no gap filling).
pub fn value_portfolio(conn: &Connection, entries: &[LedgerEntry]) -> Result<ValuationReport> {
    let mut rows = Vec::new();

    for (symbol, earliest) in earliest_value_dates(entries) {
        let prices = db::prices_from(conn, &symbol, earliest)?;
        if prices.is_empty() {
            continue;
        }

        // Sort this security's transactions once; the cursor below advances
        // monotonically with the ascending price dates.
        let mut txns: Vec<&LedgerEntry> =
            entries.iter().filter(|e| e.symbol == symbol).collect();
        txns.sort_by_key(|e| e.value_date);

        let mut next_txn = 0;
        let mut units_held = Decimal::ZERO;
        let mut cash_invested = Decimal::ZERO;

        for price in prices {
            while next_txn < txns.len() && txns[next_txn].value_date <= price.price_date {
                let txn = txns[next_txn];
                units_held += txn.units.unwrap_or(Decimal::ZERO);
                if txn.kind.affects_invested() {
                    cash_invested += txn.net_amount;
                }
                next_txn += 1;
            }

            rows.push(ValuationRow {
                symbol: symbol.clone(),
                date: price.price_date,
                close: price.close,
                units_held,
                cash_invested,
                market_value: units_held * price.close,
            });
        }
    }

    let totals = daily_totals(&rows);
    Ok(ValuationReport { rows, totals })
}

/// Sum per-security rows into one total per date, oldest first.
///
/// Dates where only part of the portfolio is priced sum that part; missing
/// securities are not zero-filled. This is a documented approximation.
pub fn daily_totals(rows: &[ValuationRow]) -> Vec<DailyTotal> {
    rows.iter()
        .into_group_map_by(|row| row.date)
        .into_iter()
        .map(|(date, day_rows)| DailyTotal {
            date,
            market_value: day_rows.iter().map(|r| r.market_value).sum(),
            invested: day_rows.iter().map(|r| r.cash_invested).sum(),
        })
        .sorted_by_key(|total| total.date)
        .collect()
}

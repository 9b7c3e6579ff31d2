// Database module - SQLite price store

pub mod models;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

use crate::error::TrackerError;
use crate::pricing::DailyClose;
pub use models::PriceRecord;

/// Get the default database path (~/.patrimoine/data.db)
pub fn get_default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let patrimoine_dir = PathBuf::from(home).join(".patrimoine");

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&patrimoine_dir)
        .context("Failed to create .patrimoine directory")?;

    Ok(patrimoine_dir.join("data.db"))
}

/// Open database connection
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = db_path.unwrap_or(get_default_db_path()?);
    let conn = Connection::open(&path).context(format!("Failed to open database at {:?}", path))?;

    Ok(conn)
}

/// Initialize the database with schema
///
/// Creates the database file and runs the schema SQL to set up the
/// price_history table.
pub fn init_database(db_path: Option<PathBuf>) -> Result<()> {
    let path = db_path.unwrap_or(get_default_db_path()?);

    info!("Initializing price store at: {:?}", path);

    let conn = open_db(Some(path))?;

    let schema_sql = include_str!("schema.sql");

    conn.execute_batch(schema_sql)
        .context("Failed to execute schema")?;

    Ok(())
}

/// Most recent date on file for a symbol, or None when the symbol is absent.
pub fn latest_price_date(conn: &Connection, symbol: &str) -> Result<Option<NaiveDate>> {
    let mut stmt = conn.prepare("SELECT MAX(price_date) FROM price_history WHERE symbol = ?1")?;

    // MAX() returns a single row with NULL for an unknown symbol; map NULL to None
    let result: Option<Option<NaiveDate>> = stmt.query_row([symbol], |row| row.get(0)).optional()?;

    Ok(result.flatten())
}

/// Upsert a batch of daily closes for one symbol as a single transaction.
///
/// Keyed on (symbol, price_date): re-writing an existing date overwrites the
/// close in place instead of appending a duplicate. The batch commits
/// all-or-nothing, so a partially backfilled symbol can never be mistaken
/// for a complete one.
pub fn upsert_prices(conn: &mut Connection, symbol: &str, closes: &[DailyClose]) -> Result<usize> {
    let tx = conn
        .transaction()
        .map_err(|e| TrackerError::StoreWrite(e.to_string()))?;

    for close in closes {
        tx.execute(
            "INSERT OR REPLACE INTO price_history (symbol, price_date, close_price)
             VALUES (?1, ?2, ?3)",
            params![symbol, close.date, close.close.to_string()],
        )
        .map_err(|e| TrackerError::StoreWrite(e.to_string()))?;
    }

    tx.commit()
        .map_err(|e| TrackerError::StoreWrite(e.to_string()))?;

    Ok(closes.len())
}

/// All stored prices for a symbol with date >= `from`, ascending by date.
pub fn prices_from(conn: &Connection, symbol: &str, from: NaiveDate) -> Result<Vec<PriceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT symbol, price_date, close_price
         FROM price_history
         WHERE symbol = ?1 AND price_date >= ?2
         ORDER BY price_date ASC",
    )?;

    let records = stmt
        .query_map(params![symbol, from], |row| {
            Ok(PriceRecord {
                symbol: row.get(0)?,
                price_date: row.get(1)?,
                close: get_decimal_value(row, 2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Total number of stored prices for a symbol
pub fn price_count(conn: &Connection, symbol: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM price_history WHERE symbol = ?1",
        [symbol],
        |row| row.get(0),
    )?;

    Ok(count)
}

/// Helper to read Decimal from SQLite (handles INTEGER, REAL and TEXT)
fn get_decimal_value(row: &rusqlite::Row, idx: usize) -> Result<Decimal, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Decimal::from_str(s).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => {
            Decimal::try_from(f).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        }
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            rusqlite::types::Type::Null,
        )),
    }
}

//! Transaction ledger importer
//!
//! Parses the "opérations" sheet of the portfolio workbook. Each row is one
//! transaction: security symbol, value date, operation kind, units moved and
//! the net cash amount in euros. Rows are normalized but not business
//! validated; the valuation engine trusts the ledger as-is.

use anyhow::{Context, Result};
use calamine::{open_workbook, Data, DataType, Reader, Xlsx};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::TrackerError;

/// Ledger label for a cash contribution buying units
const CONTRIBUTION_LABEL: &str = "Versement libre complémentaire";
/// Ledger label for a divestment selling units
const WITHDRAWAL_LABEL: &str = "Désinvestissement";

/// Operation kinds relevant to invested-capital tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Contribution,
    Withdrawal,
    Other,
}

impl OperationKind {
    /// Map the ledger's "Type opération" label. Unknown labels are kept as
    /// Other rather than rejected.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            CONTRIBUTION_LABEL => OperationKind::Contribution,
            WITHDRAWAL_LABEL => OperationKind::Withdrawal,
            _ => OperationKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Contribution => "CONTRIBUTION",
            OperationKind::Withdrawal => "WITHDRAWAL",
            OperationKind::Other => "OTHER",
        }
    }

    /// Only contributions and withdrawals move invested capital.
    pub fn affects_invested(self) -> bool {
        matches!(self, OperationKind::Contribution | OperationKind::Withdrawal)
    }
}

/// One normalized ledger row
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub symbol: String,
    pub value_date: NaiveDate,
    pub kind: OperationKind,
    /// Units bought (positive) or sold (negative); absent on cash-only rows
    pub units: Option<Decimal>,
    /// Net cash amount in euros, signed
    pub net_amount: Decimal,
}

/// Column mapping for the operations sheet
#[derive(Debug, Clone)]
struct ColumnMapping {
    symbol: Option<usize>,
    value_date: Option<usize>,
    kind: Option<usize>,
    units: Option<usize>,
    net_amount: Option<usize>,
}

impl ColumnMapping {
    /// Create column mapping by scanning the header row
    fn from_header(header: &[Data]) -> Self {
        let mut mapping = ColumnMapping {
            symbol: None,
            value_date: None,
            kind: None,
            units: None,
            net_amount: None,
        };

        for (idx, cell) in header.iter().enumerate() {
            let text = cell.to_string().to_lowercase();

            if text.contains("symbole") || text.contains("ticker") {
                mapping.symbol = Some(idx);
            }

            // "Date de valeur"; plain "date" only as fallback
            if text.contains("date") && text.contains("valeur") {
                mapping.value_date = Some(idx);
            } else if mapping.value_date.is_none() && text.contains("date") {
                mapping.value_date = Some(idx);
            }

            if text.contains("type") && (text.contains("opération") || text.contains("operation")) {
                mapping.kind = Some(idx);
            }

            if text.contains("nombre") && text.contains("parts") {
                mapping.units = Some(idx);
            } else if mapping.units.is_none() && text.contains("parts") {
                mapping.units = Some(idx);
            }

            if text.contains("montant") {
                mapping.net_amount = Some(idx);
            }
        }

        mapping
    }

    fn is_valid(&self) -> bool {
        self.missing_columns().is_empty()
    }

    fn missing_columns(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.symbol.is_none() {
            missing.push("Symbole");
        }
        if self.value_date.is_none() {
            missing.push("Date de valeur");
        }
        if self.kind.is_none() {
            missing.push("Type opération");
        }
        if self.units.is_none() {
            missing.push("Nombre de parts");
        }
        if self.net_amount.is_none() {
            missing.push("Montant net en euros");
        }
        missing
    }
}

/// Parse the ledger workbook into normalized entries.
///
/// Fails with a ledger format error when no header row carries the required
/// columns; individual malformed data rows are logged and skipped.
pub fn load_ledger<P: AsRef<Path>>(file_path: P) -> Result<Vec<LedgerEntry>> {
    let path = file_path.as_ref();
    info!("Loading ledger from {:?}", path);

    let mut workbook: Xlsx<_> = open_workbook(path).context("Failed to open ledger workbook")?;

    let sheet_name = find_operations_sheet(&workbook)?;
    debug!("Reading sheet: {}", sheet_name);

    let range = workbook
        .worksheet_range(&sheet_name)
        .context("Failed to read worksheet")?;

    let mut header_row_idx = None;
    let mut column_mapping: Option<ColumnMapping> = None;

    for (idx, row) in range.rows().enumerate() {
        let row_text = row
            .iter()
            .map(|cell| cell.to_string().to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        if row_text.contains("symbole") && row_text.contains("date") {
            let mapping = ColumnMapping::from_header(row);
            if mapping.is_valid() {
                header_row_idx = Some(idx);
                column_mapping = Some(mapping);
                break;
            }
            return Err(TrackerError::LedgerFormat(format!(
                "missing required columns: {}",
                mapping.missing_columns().join(", ")
            ))
            .into());
        }
    }

    let header_idx = header_row_idx.ok_or_else(|| {
        TrackerError::LedgerFormat("no header row with the required columns".to_string())
    })?;
    let mapping = column_mapping.ok_or_else(|| {
        TrackerError::LedgerFormat("could not build a column mapping".to_string())
    })?;

    let mut entries = Vec::new();

    for (idx, row) in range.rows().enumerate() {
        if idx <= header_idx {
            continue;
        }

        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        match parse_row(row, &mapping) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping ledger row {}: {}", idx + 1, e);
                continue;
            }
        }
    }

    info!("Loaded {} ledger entries", entries.len());
    Ok(entries)
}

/// Earliest value date per security. This anchors both the backfill start
/// policy (when the store is empty) and the first valuation date.
pub fn earliest_value_dates(entries: &[LedgerEntry]) -> BTreeMap<String, NaiveDate> {
    let mut earliest: BTreeMap<String, NaiveDate> = BTreeMap::new();
    for entry in entries {
        earliest
            .entry(entry.symbol.clone())
            .and_modify(|date| {
                if entry.value_date < *date {
                    *date = entry.value_date;
                }
            })
            .or_insert(entry.value_date);
    }
    earliest
}

/// Find the sheet containing the operations ledger
fn find_operations_sheet(workbook: &Xlsx<std::io::BufReader<std::fs::File>>) -> Result<String> {
    let sheet_names = workbook.sheet_names();

    let patterns = ["opération", "operation"];

    for pattern in &patterns {
        for name in &sheet_names {
            if name.to_lowercase().contains(pattern) {
                return Ok(name.clone());
            }
        }
    }

    // If no match, try the first sheet
    sheet_names
        .first()
        .cloned()
        .ok_or_else(|| TrackerError::LedgerFormat("no sheets found in workbook".to_string()).into())
}

/// Parse a single row into a LedgerEntry. Rows without a symbol (subtotals,
/// cash-account lines) are skipped.
fn parse_row(row: &[Data], mapping: &ColumnMapping) -> Result<Option<LedgerEntry>> {
    let symbol_cell = row
        .get(mapping.symbol.unwrap())
        .map(|c| c.to_string())
        .unwrap_or_default();
    let symbol = symbol_cell.trim().to_uppercase();

    if symbol.is_empty() {
        return Ok(None);
    }

    let date_cell = row
        .get(mapping.value_date.unwrap())
        .ok_or_else(|| anyhow::anyhow!("missing value date"))?;
    let value_date = parse_date(date_cell)?;

    let kind = row
        .get(mapping.kind.unwrap())
        .map(|c| OperationKind::from_label(&c.to_string()))
        .unwrap_or(OperationKind::Other);

    let units = match row.get(mapping.units.unwrap()) {
        Some(cell) if !cell.is_empty() => Some(parse_decimal(cell)?),
        _ => None,
    };

    let net_amount = match row.get(mapping.net_amount.unwrap()) {
        Some(cell) if !cell.is_empty() => parse_decimal(cell)?,
        _ => Decimal::ZERO,
    };

    Ok(Some(LedgerEntry {
        symbol,
        value_date,
        kind,
        units,
        net_amount,
    }))
}

/// Parse date from Excel serials and common string formats
fn parse_date(cell: &Data) -> Result<NaiveDate> {
    match cell {
        Data::DateTime(dt) => {
            let days_since_epoch = dt.as_f64().floor() as i64;
            let excel_epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
                .ok_or_else(|| anyhow::anyhow!("invalid Excel epoch"))?;
            excel_epoch
                .checked_add_signed(chrono::Duration::days(days_since_epoch))
                .ok_or_else(|| anyhow::anyhow!("date overflow"))
        }
        _ => {
            let date_str = cell.to_string();

            // French ledgers: DD/MM/YYYY; ISO accepted as well
            if let Ok(date) = NaiveDate::parse_from_str(&date_str, "%d/%m/%Y") {
                return Ok(date);
            }
            if let Ok(date) = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") {
                return Ok(date);
            }

            Err(anyhow::anyhow!("could not parse date: {}", date_str))
        }
    }
}

/// Parse decimal from cell (handles numbers and French-formatted strings)
fn parse_decimal(cell: &Data) -> Result<Decimal> {
    match cell {
        Data::Int(i) => Ok(Decimal::from(*i)),
        Data::Float(f) => {
            Decimal::from_f64_retain(*f).ok_or_else(|| anyhow::anyhow!("invalid decimal: {}", f))
        }
        _ => {
            // French format: "1 234,56 €" -> 1234.56
            let text = cell
                .to_string()
                .replace('€', "")
                .replace(['\u{a0}', '\u{202f}', ' '], "")
                .replace(',', ".");

            Decimal::from_str(&text).context("Failed to parse decimal")
        }
    }
}

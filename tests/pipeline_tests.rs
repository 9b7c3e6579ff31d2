//! Integration tests for the valuation pipeline
//!
//! These tests verify end-to-end functionality:
//! - Ledger workbook import
//! - Price backfill against an in-memory source
//! - Valuation and daily aggregation
//! - Atomic CSV publication and the read API round trip

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use patrimoine::backfill;
use patrimoine::db;
use patrimoine::ledger;
use patrimoine::output;
use patrimoine::pipeline::run_pipeline;
use patrimoine::pricing::{DailyClose, PriceSource};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use rust_xlsxwriter::Workbook;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const LEDGER_HEADERS: [&str; 5] = [
    "Symbole",
    "Date de valeur",
    "Type opération",
    "Nombre de parts",
    "Montant net en euros",
];

/// One ledger row for the generated workbook
struct LedgerRow {
    symbol: &'static str,
    value_date: &'static str,
    kind: &'static str,
    units: Option<Decimal>,
    net_amount: Decimal,
}

fn contribution(
    symbol: &'static str,
    value_date: &'static str,
    units: Decimal,
    net_amount: Decimal,
) -> LedgerRow {
    LedgerRow {
        symbol,
        value_date,
        kind: "Versement libre complémentaire",
        units: Some(units),
        net_amount,
    }
}

/// Write an operations workbook the way the brokerage exports it
fn write_ledger(path: &Path, rows: &[LedgerRow]) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("opérations")?;

    for (col, header) in LEDGER_HEADERS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let r = (idx + 1) as u32;
        worksheet.write_string(r, 0, row.symbol)?;
        worksheet.write_string(r, 1, row.value_date)?;
        worksheet.write_string(r, 2, row.kind)?;
        if let Some(units) = row.units {
            worksheet.write_string(r, 3, &units.to_string())?;
        }
        worksheet.write_string(r, 4, &row.net_amount.to_string())?;
    }

    workbook.save(path)?;
    Ok(())
}

/// In-memory price source serving fixed series
struct FakeSource {
    closes: HashMap<String, Vec<DailyClose>>,
}

impl FakeSource {
    fn new(series: &[(&str, &[(&str, Decimal)])]) -> Self {
        let closes = series
            .iter()
            .map(|(symbol, days)| {
                (
                    symbol.to_string(),
                    days.iter()
                        .map(|(date, close)| DailyClose {
                            date: parse_date(date),
                            close: *close,
                        })
                        .collect(),
                )
            })
            .collect();
        Self { closes }
    }
}

#[async_trait]
impl PriceSource for FakeSource {
    async fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyClose>> {
        Ok(self
            .closes
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|c| c.date >= start && c.date < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

struct TestEnv {
    _home: TempDir,
    ledger_path: PathBuf,
    db_path: PathBuf,
    output_dir: PathBuf,
}

fn setup(rows: &[LedgerRow]) -> Result<TestEnv> {
    let home = TempDir::new()?;
    let ledger_path = home.path().join("operations.xlsx");
    write_ledger(&ledger_path, rows)?;
    Ok(TestEnv {
        db_path: home.path().join("data.db"),
        output_dir: home.path().join("outputs"),
        _home: home,
        ledger_path,
    })
}

#[tokio::test]
async fn single_contribution_is_valued_across_price_dates() -> Result<()> {
    // XYZ: 10 units for 100 EUR on 2024-01-02; closes on 01-02 and 01-03
    let env = setup(&[contribution("XYZ", "02/01/2024", dec!(10), dec!(100))])?;
    let source = FakeSource::new(&[(
        "XYZ",
        &[("2024-01-02", dec!(10.50)), ("2024-01-03", dec!(11.00))],
    )]);

    let report = run_pipeline(
        &env.ledger_path,
        Some(env.db_path.clone()),
        &env.output_dir,
        &source,
        parse_date("2024-01-04"),
    )
    .await?;

    assert_eq!(report.ledger_entries, 1);
    assert_eq!(report.valuation_rows, 2);
    assert_eq!(report.priced_days, 2);

    let totals = output::read_daily_totals(&env.output_dir.join("daily_totals.csv"))?;
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0].date, parse_date("2024-01-02"));
    assert_eq!(totals[0].market_value, dec!(105.0));
    assert_eq!(totals[0].invested, dec!(100));
    assert_eq!(totals[1].date, parse_date("2024-01-03"));
    assert_eq!(totals[1].market_value, dec!(110.0));

    let detail = std::fs::read_to_string(env.output_dir.join("market_values.csv"))?;
    assert!(detail.contains("XYZ,2024-01-02,10.50,10,100,105.00"));
    assert!(detail.contains("XYZ,2024-01-03,11.00,10,100,110.00"));
    Ok(())
}

#[tokio::test]
async fn dead_security_is_skipped_without_failing_the_run() -> Result<()> {
    let env = setup(&[
        contribution("DEAD", "02/01/2024", dec!(5), dec!(50)),
        contribution("XYZ", "02/01/2024", dec!(10), dec!(100)),
    ])?;
    let source = FakeSource::new(&[("XYZ", &[("2024-01-02", dec!(10.50))])]);

    let report = run_pipeline(
        &env.ledger_path,
        Some(env.db_path.clone()),
        &env.output_dir,
        &source,
        parse_date("2024-01-03"),
    )
    .await?;

    assert_eq!(report.backfill.securities_skipped, 1);
    assert_eq!(report.backfill.securities_updated, 1);

    let conn = db::open_db(Some(env.db_path.clone()))?;
    assert_eq!(db::price_count(&conn, "DEAD")?, 0);

    let detail = std::fs::read_to_string(env.output_dir.join("market_values.csv"))?;
    assert!(!detail.contains("DEAD"));
    assert!(detail.contains("XYZ"));
    Ok(())
}

#[tokio::test]
async fn rerun_with_same_data_changes_nothing() -> Result<()> {
    let env = setup(&[contribution("ABC", "02/01/2024", dec!(10), dec!(100))])?;
    let source = FakeSource::new(&[(
        "ABC",
        &[
            ("2024-01-02", dec!(10.00)),
            ("2024-01-03", dec!(10.25)),
            ("2024-01-05", dec!(10.50)),
        ],
    )]);
    let today = parse_date("2024-01-06");

    run_pipeline(
        &env.ledger_path,
        Some(env.db_path.clone()),
        &env.output_dir,
        &source,
        today,
    )
    .await?;
    let first_totals = output::read_daily_totals(&env.output_dir.join("daily_totals.csv"))?;

    // Second run resumes from the stored 2024-01-05 and overwrites it
    run_pipeline(
        &env.ledger_path,
        Some(env.db_path.clone()),
        &env.output_dir,
        &source,
        today,
    )
    .await?;
    let second_totals = output::read_daily_totals(&env.output_dir.join("daily_totals.csv"))?;

    let conn = db::open_db(Some(env.db_path.clone()))?;
    assert_eq!(db::price_count(&conn, "ABC")?, 3);
    assert_eq!(first_totals, second_totals);
    Ok(())
}

#[tokio::test]
async fn ledger_missing_required_column_aborts_the_run() -> Result<()> {
    let home = TempDir::new()?;
    let ledger_path = home.path().join("operations.xlsx");

    // Workbook without the units column
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("opérations")?;
    for (col, header) in ["Symbole", "Date de valeur", "Type opération"]
        .iter()
        .enumerate()
    {
        worksheet.write_string(0, col as u16, *header)?;
    }
    workbook.save(&ledger_path)?;

    let err = ledger::load_ledger(&ledger_path).unwrap_err();
    assert!(err.to_string().contains("Nombre de parts"));
    Ok(())
}

#[tokio::test]
async fn backfill_resumes_from_store_not_from_ledger() -> Result<()> {
    let env = setup(&[contribution("ABC", "02/01/2024", dec!(10), dec!(100))])?;

    // Pre-seed the store through 2024-01-05
    db::init_database(Some(env.db_path.clone()))?;
    let mut conn = db::open_db(Some(env.db_path.clone()))?;
    db::upsert_prices(
        &mut conn,
        "ABC",
        &[DailyClose {
            date: parse_date("2024-01-05"),
            close: dec!(9.99),
        }],
    )?;

    let entries = ledger::load_ledger(&env.ledger_path)?;
    let source = FakeSource::new(&[(
        "ABC",
        &[
            ("2024-01-02", dec!(10.00)),
            ("2024-01-05", dec!(10.50)),
            ("2024-01-08", dec!(11.00)),
        ],
    )]);

    backfill::backfill_prices(&mut conn, &source, &entries, parse_date("2024-01-09")).await?;

    // 2024-01-02 predates the stored cursor and is not re-fetched;
    // 2024-01-05 is overwritten in place, not duplicated
    assert_eq!(db::price_count(&conn, "ABC")?, 2);
    let records = db::prices_from(&conn, "ABC", parse_date("2024-01-01"))?;
    assert_eq!(records[0].close, dec!(10.50));
    assert_eq!(records[1].price_date, parse_date("2024-01-08"));
    Ok(())
}

#[tokio::test]
async fn published_totals_round_trip_through_the_api() -> Result<()> {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use patrimoine::api::{router, ApiState};
    use std::sync::Arc;
    use tower::ServiceExt;

    let env = setup(&[contribution("XYZ", "02/01/2024", dec!(10), dec!(100))])?;
    let source = FakeSource::new(&[(
        "XYZ",
        &[("2024-01-02", dec!(10.50)), ("2024-01-03", dec!(11.00))],
    )]);

    run_pipeline(
        &env.ledger_path,
        Some(env.db_path.clone()),
        &env.output_dir,
        &source,
        parse_date("2024-01-04"),
    )
    .await?;

    let state = Arc::new(ApiState {
        totals_path: env.output_dir.join("daily_totals.csv"),
    });

    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/api/market-value/last")
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["date"], "2024-01-03");
    // units(10, scale 0) * close(11.00, scale 2) keeps scale 2
    assert_eq!(body["market_value"], "110.00");
    Ok(())
}

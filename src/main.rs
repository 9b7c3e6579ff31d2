use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use patrimoine::api::{self, ApiState};
use patrimoine::config::Config;
use patrimoine::pricing::yahoo::YahooSource;
use patrimoine::{db, output, pipeline, scheduler};

#[derive(Parser)]
#[command(
    name = "patrimoine",
    version,
    about = "Daily market value tracking for a personal stock portfolio"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the valuation pipeline once and exit
    Run {
        /// Ledger workbook; overrides the configured path
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Serve the read API and schedule the daily pipeline run
    Serve,
    /// Create the price store schema
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { ledger } => {
            let ledger_path = ledger.unwrap_or_else(|| config.ledger_path.clone());
            handle_run(&config, &ledger_path).await
        }
        Commands::Serve => serve(config).await,
        Commands::InitDb => {
            db::init_database(config.db_path.clone())?;
            println!("price store initialized");
            Ok(())
        }
    }
}

/// Handle a one-shot pipeline run
async fn handle_run(config: &Config, ledger_path: &Path) -> Result<()> {
    use colored::Colorize;
    use tabled::{settings::Style, Table, Tabled};

    info!("Running pipeline against {:?}", ledger_path);

    let source = YahooSource::new()?;
    let today = chrono::Local::now().date_naive();
    let report = pipeline::run_pipeline(
        ledger_path,
        config.db_path.clone(),
        &config.output_dir,
        &source,
        today,
    )
    .await?;

    println!("\n{} Pipeline complete\n", "✓".green().bold());

    #[derive(Tabled)]
    struct RunSummary {
        #[tabled(rename = "Ledger entries")]
        entries: usize,
        #[tabled(rename = "Securities updated")]
        updated: usize,
        #[tabled(rename = "Securities skipped")]
        skipped: usize,
        #[tabled(rename = "Prices upserted")]
        prices: usize,
        #[tabled(rename = "Valuation rows")]
        rows: usize,
        #[tabled(rename = "Days priced")]
        days: usize,
    }

    let summary = RunSummary {
        entries: report.ledger_entries,
        updated: report.backfill.securities_updated,
        skipped: report.backfill.securities_skipped,
        prices: report.backfill.prices_upserted,
        rows: report.valuation_rows,
        days: report.priced_days,
    };

    let table = Table::new([summary]).with(Style::rounded()).to_string();
    println!("{}", table);

    if let Ok(totals) = output::read_daily_totals(&config.totals_csv_path()) {
        if let Some(last) = totals.last() {
            println!(
                "\nLatest valuation ({}): market value {} | invested {}",
                last.date, last.market_value, last.invested
            );
        }
    }

    Ok(())
}

/// Serve the read API with the daily scheduler running in the background
async fn serve(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let run_lock = Arc::new(tokio::sync::Mutex::new(()));

    scheduler::start_pipeline_scheduler(config.clone(), run_lock.clone());

    let state = Arc::new(ApiState {
        totals_path: config.totals_csv_path(),
    });
    let router = api::router(state);

    info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

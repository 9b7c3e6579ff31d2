//! Background scheduler for the daily pipeline run
//!
//! Fires once per day at the configured hour. A run lock guarantees a tick
//! never overlaps a run still in flight; the tick is skipped instead.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline;
use crate::pricing::yahoo::YahooSource;

/// Starts the daily pipeline scheduler.
pub fn start_pipeline_scheduler(config: Arc<Config>, run_lock: Arc<Mutex<()>>) {
    tokio::spawn(async move {
        info!(
            "Pipeline scheduler started (daily at {:02}:00)",
            config.schedule_hour.min(23)
        );

        loop {
            let wait = until_next_run(Local::now(), config.schedule_hour);
            sleep(wait).await;
            run_scheduled_pipeline(&config, &run_lock).await;
        }
    });
}

/// Duration until the next occurrence of `hour:00` strictly after `now`.
fn until_next_run(now: DateTime<Local>, hour: u32) -> Duration {
    let hour = hour.min(23);
    let now_local = now.naive_local();
    let today_run = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .expect("hour clamped to 0..=23");

    let next = if today_run > now_local {
        today_run
    } else {
        today_run + chrono::Duration::days(1)
    };

    (next - now_local)
        .to_std()
        .unwrap_or(Duration::from_secs(60))
}

/// Runs one scheduled pipeline pass, unless one is already in flight.
async fn run_scheduled_pipeline(config: &Config, run_lock: &Mutex<()>) {
    let Ok(_guard) = run_lock.try_lock() else {
        warn!("Previous pipeline run still in flight, skipping this tick");
        return;
    };

    info!("Running scheduled pipeline...");

    let source = match YahooSource::new() {
        Ok(source) => source,
        Err(e) => {
            warn!("Could not build price source: {:#}", e);
            return;
        }
    };

    let today = Local::now().date_naive();
    match pipeline::run_pipeline(
        &config.ledger_path,
        config.db_path.clone(),
        &config.output_dir,
        &source,
        today,
    )
    .await
    {
        Ok(report) => info!(
            "Scheduled run complete: {} rows over {} days ({} securities skipped)",
            report.valuation_rows, report.priced_days, report.backfill.securities_skipped
        ),
        Err(e) => warn!("Scheduled pipeline run failed: {:#}", e),
    }
}

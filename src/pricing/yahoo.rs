use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{DailyClose, PriceSource};

/// Yahoo Finance chart response
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

/// Historical close provider backed by the Yahoo Finance chart API
pub struct YahooSource {
    client: Client,
}

impl YahooSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; PatrimoineBot/1.0)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PriceSource for YahooSource {
    async fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyClose>> {
        // Zero or inverted ranges never hit the network
        if start >= end {
            return Ok(Vec::new());
        }

        info!("Fetching closes for {} over [{}, {})", symbol, start, end);

        let period1 = start
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid start date"))?
            .and_utc()
            .timestamp();

        // end is exclusive: request up to midnight of the end date
        let period2 = end
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid end date"))?
            .and_utc()
            .timestamp();

        let url = format!(
            "https://query1.finance.yahoo.com/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            symbol, period1, period2
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to Yahoo Finance")?;

        // Unknown and delisted symbols come back as 404 with an error
        // payload; the contract for those is an empty series.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!("{}: not listed on Yahoo Finance", symbol);
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(anyhow!(
                "Yahoo Finance returned error status: {}",
                response.status()
            ));
        }

        let data: YahooChartResponse = response
            .json()
            .await
            .context("Failed to parse Yahoo Finance response")?;

        if let Some(error) = data.chart.error {
            warn!(
                "{}: Yahoo Finance error {} - {}",
                symbol, error.code, error.description
            );
            return Ok(Vec::new());
        }

        let Some(result) = data.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(Vec::new());
        };

        let Some(timestamps) = result.timestamp else {
            return Ok(Vec::new());
        };

        let closes_raw = result
            .indicators
            .quote
            .into_iter()
            .next()
            .and_then(|q| q.close)
            .unwrap_or_default();

        let mut closes = Vec::new();

        for (i, &timestamp) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(timestamp, 0)
                .ok_or_else(|| anyhow!("invalid timestamp {}", timestamp))?
                .date_naive();

            // The API rounds period2 up to the session boundary
            if date >= end {
                continue;
            }

            // Null closes happen on holidays and half sessions; drop those days
            let Some(close) = closes_raw.get(i).and_then(|&v| v) else {
                continue;
            };

            closes.push(DailyClose {
                date,
                close: Decimal::from_f64_retain(close)
                    .ok_or_else(|| anyhow!("invalid close price {}", close))?,
            });
        }

        debug!("Fetched {} closes for {}", closes.len(), symbol);
        Ok(closes)
    }
}

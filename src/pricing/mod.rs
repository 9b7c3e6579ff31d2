// Pricing module - historical close providers

pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::Result;

/// One daily closing price as returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: Decimal,
}

/// A source of historical daily closes.
///
/// `end` is exclusive. Unknown or delisted symbols yield an empty series,
/// not an error; the backfill engine treats both the same way.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyClose>>;
}

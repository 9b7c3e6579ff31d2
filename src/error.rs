//! Error handling for the valuation pipeline
//!
//! Defines the pipeline error taxonomy and establishes a unified Result
//! type using anyhow for context chaining and error propagation.

use thiserror::Error;

/// Failure classes of a pipeline run
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Required ledger columns are absent or unreadable. Fatal for the run.
    #[error("ledger format error: {0}")]
    LedgerFormat(String),

    /// The price source returned nothing for one security. Recovered
    /// locally: that security is skipped for the run.
    #[error("no prices returned for {0}")]
    PriceFetchEmpty(String),

    /// The price store could not be written. Fatal for the run; batches
    /// already committed for other securities stay committed.
    #[error("price store write failed: {0}")]
    StoreWrite(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = anyhow::Result<T>;

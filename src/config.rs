//! Runtime configuration
//!
//! Loaded from a TOML file. Every field has a default so a missing file
//! still yields a usable local setup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the per-security detail artifact inside `output_dir`
pub const DETAIL_FILE: &str = "market_values.csv";
/// Name of the daily totals artifact inside `output_dir`
pub const TOTALS_FILE: &str = "daily_totals.csv";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Excel workbook holding the transaction ledger
    pub ledger_path: PathBuf,
    /// SQLite price store; `None` falls back to ~/.patrimoine/data.db
    pub db_path: Option<PathBuf>,
    /// Directory receiving the CSV artifacts
    pub output_dir: PathBuf,
    /// Address the read API binds to
    pub listen_addr: String,
    /// Hour of day (local time, 0-23) at which the scheduler fires
    pub schedule_hour: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("data/operations.xlsx"),
            db_path: None,
            output_dir: PathBuf::from("data/outputs"),
            listen_addr: "0.0.0.0:5077".to_string(),
            schedule_hour: 5,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. `None` yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }

    pub fn detail_csv_path(&self) -> PathBuf {
        self.output_dir.join(DETAIL_FILE)
    }

    pub fn totals_csv_path(&self) -> PathBuf {
        self.output_dir.join(TOTALS_FILE)
    }
}

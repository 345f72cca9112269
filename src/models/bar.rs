//! OHLCV bar model and per-symbol price panels.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Bar open time
    pub timestamp: DateTime<Utc>,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    /// Traded base volume
    #[serde(default)]
    pub volume: f64,
}

/// Time-ascending bars for one symbol. Ordering and uniqueness are the provider's job.
pub type PricePanel = Vec<PriceBar>;

impl PriceBar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Build a bar from an exchange-style row: `[ts_ms, open, high, low, close, volume]`.
    pub fn from_ohlcv_row(row: &[f64]) -> Result<Self> {
        if row.len() < 5 {
            return Err(Error::invalid_input(format!(
                "OHLCV row needs at least 5 fields, got {}",
                row.len()
            )));
        }

        let millis = row[0] as i64;
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| Error::invalid_input(format!("Invalid timestamp: {}", millis)))?;

        Ok(Self::new(
            timestamp,
            row[1],
            row[2],
            row[3],
            row[4],
            row.get(5).copied().unwrap_or(0.0),
        ))
    }
}

/// Extract the close column of a panel.
pub fn closes(panel: &[PriceBar]) -> Vec<f64> {
    panel.iter().map(|b| b.close).collect()
}

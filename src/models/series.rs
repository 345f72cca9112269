//! Column-oriented bar series consumed by the statistics engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::SimulationRow;

/// Bar series with optional columns. Every present column holds one value per bar.
///
/// `position` carries direction in its sign (0 = flat). Either `pnl` (per-bar) or
/// `equity` must be present for statistics; `timestamp` provides the time order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub timestamp: Option<Vec<DateTime<Utc>>>,
    pub position: Option<Vec<i64>>,
    pub pnl: Option<Vec<f64>>,
    pub equity: Option<Vec<f64>>,
}

impl BarSeries {
    /// Convert simulator output into a statistics input.
    pub fn from_rows(rows: &[SimulationRow]) -> Self {
        Self {
            timestamp: Some(rows.iter().map(|r| r.timestamp).collect()),
            position: Some(rows.iter().map(|r| i64::from(r.position)).collect()),
            pnl: Some(rows.iter().map(|r| r.pnl).collect()),
            equity: None,
        }
    }

    /// Number of bars, checking that all present columns agree.
    pub fn len(&self) -> Result<usize> {
        let lengths = [
            ("timestamp", self.timestamp.as_ref().map(Vec::len)),
            ("position", self.position.as_ref().map(Vec::len)),
            ("pnl", self.pnl.as_ref().map(Vec::len)),
            ("equity", self.equity.as_ref().map(Vec::len)),
        ];

        let mut expected: Option<(&str, usize)> = None;
        for (name, len) in lengths {
            let Some(len) = len else { continue };
            match expected {
                None => expected = Some((name, len)),
                Some((first, n)) if n != len => {
                    return Err(Error::invalid_input(format!(
                        "Column '{}' has {} rows but '{}' has {}",
                        name, len, first, n
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(expected.map(|(_, n)| n).unwrap_or(0))
    }

    /// Return a copy with every column reordered by ascending timestamp.
    ///
    /// The sort is stable so bars sharing a timestamp keep their input order.
    pub fn sorted_by_time(&self) -> Result<Self> {
        let timestamps = self
            .timestamp
            .as_ref()
            .ok_or_else(|| Error::invalid_input("Series needs a 'timestamp' column for time ordering"))?;
        self.len()?;

        let mut order: Vec<usize> = (0..timestamps.len()).collect();
        order.sort_by_key(|&i| timestamps[i]);

        fn permute<T: Copy>(col: &Option<Vec<T>>, order: &[usize]) -> Option<Vec<T>> {
            col.as_ref().map(|values| order.iter().map(|&i| values[i]).collect())
        }

        Ok(Self {
            timestamp: permute(&self.timestamp, &order),
            position: permute(&self.position, &order),
            pnl: permute(&self.pnl, &order),
            equity: permute(&self.equity, &order),
        })
    }
}

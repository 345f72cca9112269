//! File-backed price panel provider.
//!
//! Panels are JSON arrays of either exchange-style rows
//! (`[ts_ms, open, high, low, close, volume]`) or bar objects.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{PriceBar, PricePanel};

/// A `SYMBOL=path` pair naming where a symbol's panel lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSpec {
    pub symbol: String,
    pub path: PathBuf,
}

impl FromStr for PanelSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (symbol, path) = s
            .split_once('=')
            .ok_or_else(|| Error::invalid_input(format!("Expected SYMBOL=path, got {:?}", s)))?;

        if symbol.trim().is_empty() || path.trim().is_empty() {
            return Err(Error::invalid_input(format!("Expected SYMBOL=path, got {:?}", s)));
        }

        Ok(Self {
            symbol: normalize_symbol(symbol),
            path: PathBuf::from(path.trim()),
        })
    }
}

/// Uppercase, `-` to `/`, and quote in USD when no quote is given.
pub fn normalize_symbol(symbol: &str) -> String {
    let s = symbol.trim().to_uppercase().replace('-', "/");
    if s.contains('/') {
        s
    } else {
        format!("{}/USD", s)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBar {
    Row(Vec<f64>),
    Bar(PriceBar),
}

/// Parse panel JSON, then sort by time and keep the last bar per timestamp.
pub fn parse_panel(json: &str) -> Result<PricePanel> {
    let raw: Vec<RawBar> = serde_json::from_str(json)?;

    let mut bars = raw
        .into_iter()
        .map(|r| match r {
            RawBar::Row(row) => PriceBar::from_ohlcv_row(&row),
            RawBar::Bar(bar) => Ok(bar),
        })
        .collect::<Result<Vec<_>>>()?;

    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    // dedup_by keeps the first of a run; reverse so the later duplicate survives
    bars.reverse();
    bars.dedup_by_key(|b| b.timestamp);
    bars.reverse();

    if bars.len() != before {
        debug!(dropped = before - bars.len(), "Dropped duplicate timestamps");
    }

    Ok(bars)
}

/// Read and parse one panel file.
pub async fn load_panel(path: &Path) -> Result<PricePanel> {
    let contents = tokio::fs::read_to_string(path).await?;
    parse_panel(&contents)
}

/// Load all panels concurrently. Files that fail to load are logged and left out.
pub async fn load_panels(specs: &[PanelSpec]) -> BTreeMap<String, PricePanel> {
    let loads = specs.iter().map(|spec| async move {
        let result = load_panel(&spec.path).await;
        (spec, result)
    });

    let mut panels = BTreeMap::new();
    for (spec, result) in join_all(loads).await {
        match result {
            Ok(panel) => {
                info!(symbol = %spec.symbol, bars = panel.len(), "Loaded panel");
                panels.insert(spec.symbol.clone(), panel);
            }
            Err(e) => {
                warn!(symbol = %spec.symbol, path = %spec.path.display(), error = %e, "Dropping unavailable panel");
            }
        }
    }

    panels
}

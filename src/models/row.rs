//! Per-bar output of the strategy simulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a long position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SignalExit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::SignalExit => "signal_exit",
        }
    }
}

/// One simulated bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRow {
    pub timestamp: DateTime<Utc>,
    pub close: f64,

    /// Fast SMA, `None` until the window has filled
    pub sma_fast: Option<f64>,

    /// Slow SMA, `None` until the window has filled
    pub sma_slow: Option<f64>,

    /// Entry condition: close > fast SMA > slow SMA
    pub signal: bool,

    /// 1 while long (including the entry bar), 0 otherwise
    pub position: u8,

    /// Entry price while long
    pub entry_price: Option<f64>,

    /// Realized pnl on exit bars, mark-to-market vs entry on hold bars, 0 otherwise
    pub pnl: f64,

    /// Set on the bar a position was closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
}

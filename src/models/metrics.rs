//! Performance statistics derived from a position/pnl series.

use serde::{Deserialize, Serialize};

/// Summary statistics for one bar series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Number of closed trades
    pub trades: usize,

    /// Winning trades / total trades (0.0 to 1.0)
    pub win_rate: f64,

    /// Compound annual growth rate
    pub cagr: f64,

    /// Gross profit / gross loss (0 when there are no losses)
    pub pf: f64,

    /// Annualized Sharpe ratio of log returns (rf = 0)
    pub sharpe: f64,

    /// Maximum peak-to-trough drawdown (0.0 to 1.0)
    pub max_dd: f64,

    /// Fraction of bars holding a position (0.0 to 1.0)
    pub exposure: f64,

    /// Final equity minus initial equity
    pub net_pnl: f64,

    /// First bar date, `YYYY-MM-DD`
    pub start: String,

    /// Last bar date, `YYYY-MM-DD`
    pub end: String,
}

impl std::fmt::Display for PerformanceStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n{:=^60}", " PERFORMANCE ")?;
        writeln!(f, "Period: {} to {}", self.start, self.end)?;
        writeln!(f)?;
        writeln!(f, "--- Returns ---")?;
        writeln!(f, "Net P&L:       ${:.2}", self.net_pnl)?;
        writeln!(f, "CAGR:          {:.2}%", self.cagr * 100.0)?;
        writeln!(f)?;
        writeln!(f, "--- Trades ---")?;
        writeln!(f, "Total:         {}", self.trades)?;
        writeln!(f, "Win Rate:      {:.1}%", self.win_rate * 100.0)?;
        writeln!(f, "Profit Factor: {:.2}", self.pf)?;
        writeln!(f, "Exposure:      {:.1}%", self.exposure * 100.0)?;
        writeln!(f)?;
        writeln!(f, "--- Risk Metrics ---")?;
        writeln!(f, "Max Drawdown:  {:.2}%", self.max_dd * 100.0)?;
        writeln!(f, "Sharpe Ratio:  {:.2}", self.sharpe)?;
        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}

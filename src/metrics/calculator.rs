//! Trade inference and performance statistics: CAGR, Sharpe, profit factor, drawdown, exposure.
//!
//! Works on any position/pnl-or-equity series, whether produced by the simulator or loaded
//! from elsewhere. Invalid input is rejected up front; numerical degeneracies (flat curves,
//! single bars, no trades) resolve to zero.

use chrono::{DateTime, Utc};
use statrs::statistics::{Data, Median, Statistics};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{BarSeries, PerformanceStats, Trade};

/// Starting equity used when a series carries pnl but no equity column.
pub const DEFAULT_START_EQUITY: f64 = 10_000.0;

/// 365d * 24h * 60m
const MINUTES_PER_YEAR: f64 = 365.0 * 24.0 * 60.0;

/// Below this the initial equity or a standard deviation is treated as zero.
const EPSILON: f64 = 1e-12;

/// Detect round trips from position transitions.
///
/// A 0 -> nonzero move opens a trade; a move to 0 or a sign flip closes it with the sum of
/// `pnl` from entry through the closing bar. A flip opens the next trade on that same bar.
/// Transitions are evaluated from bar 1 onwards; a trade still open at the end is not counted.
pub fn infer_trades(position: &[i64], pnl: &[f64]) -> Vec<Trade> {
    let mut trades = Vec::new();
    let mut entry: Option<usize> = None;

    for i in 1..position.len() {
        let (prev, curr) = (position[i - 1], position[i]);

        match entry {
            None if prev == 0 && curr != 0 => entry = Some(i),
            Some(start) if curr == 0 || curr.signum() != prev.signum() => {
                let trade_pnl: f64 = pnl
                    .get(start..=i)
                    .map(|window| window.iter().map(|p| nan_to_zero(*p)).sum())
                    .unwrap_or(0.0);
                trades.push(Trade {
                    entry_index: start,
                    exit_index: i,
                    pnl: trade_pnl,
                });
                entry = if curr != 0 { Some(i) } else { None };
            }
            _ => {}
        }
    }

    trades
}

/// Trades for a whole series. No `position` column yields no trades.
///
/// Bar pnl comes from the `pnl` column, or from equity differences when only equity exists.
pub fn infer_trades_from_position(series: &BarSeries) -> Result<Vec<Trade>> {
    let n = series.len()?;
    let Some(position) = series.position.as_ref() else {
        return Ok(Vec::new());
    };

    let pnl = bar_pnl(series, n);
    Ok(infer_trades(position, &pnl))
}

/// Maximum peak-to-trough decline as a fraction in [0, 1]. Points with a non-positive peak
/// contribute zero.
pub fn max_drawdown_from_equity(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0f64;

    for &value in equity.iter().filter(|v| !v.is_nan()) {
        peak = peak.max(value);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }

    max_dd.clamp(0.0, 1.0)
}

/// Periods per year implied by the median bar spacing, floored at one minute.
pub fn infer_periods_per_year(timestamps: &[DateTime<Utc>]) -> u32 {
    let spacings: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 60_000.0)
        .collect();

    if spacings.is_empty() {
        return MINUTES_PER_YEAR as u32;
    }

    let median_minutes = Data::new(spacings).median();
    // Spacings over two years would round to 0 periods.
    ((MINUTES_PER_YEAR / median_minutes.max(1.0)).round() as u32).max(1)
}

/// Compute summary statistics for a bar series.
///
/// `start_equity` seeds the synthesized equity curve when only pnl is given (default
/// 10,000). `periods_per_year` is inferred from timestamp spacing when `None`.
pub fn compute_stats(
    series: &BarSeries,
    start_equity: Option<f64>,
    periods_per_year: Option<u32>,
) -> Result<PerformanceStats> {
    let series = series.sorted_by_time()?;
    let n = series.len()?;
    if n == 0 {
        return Err(Error::invalid_input("Series has no bars"));
    }
    if series.equity.is_none() && series.pnl.is_none() {
        return Err(Error::invalid_input("Need 'equity' or 'pnl' column to compute stats"));
    }

    let timestamps = series.timestamp.as_deref().unwrap_or_default();
    let periods_per_year = match periods_per_year {
        Some(0) => return Err(Error::invalid_input("periods_per_year must be positive")),
        Some(p) => p,
        None => infer_periods_per_year(timestamps),
    };
    let ppy = f64::from(periods_per_year);

    let equity = equity_curve(&series, start_equity.unwrap_or(DEFAULT_START_EQUITY));
    let initial = equity[0];
    let last = equity[n - 1];
    let net_pnl = last - initial;

    // CAGR
    let years = (n - 1) as f64 / ppy;
    let total_return = if initial > EPSILON { last / initial } else { 0.0 };
    let cagr = if years > 0.0 && total_return > 0.0 {
        finite_or_zero(total_return.powf(1.0 / years) - 1.0)
    } else {
        0.0
    };

    // Sharpe (annualized, rf ~ 0)
    let log_returns = log_returns(&equity);
    let sharpe = sharpe_ratio(&log_returns, ppy);

    // Trades, profit factor, win rate
    let trades = infer_trades_from_position(&series)?;
    let gross_profit: f64 = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.is_loss()).map(|t| -t.pnl).sum();
    let wins = trades.iter().filter(|t| t.is_win()).count();

    let win_rate = if trades.is_empty() {
        0.0
    } else {
        wins as f64 / trades.len() as f64
    };

    // No losses reports 0 rather than an unbounded ratio.
    let pf = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        0.0
    };

    let exposure = series
        .position
        .as_ref()
        .map(|p| p.iter().filter(|&&x| x != 0).count() as f64 / n as f64)
        .unwrap_or(0.0);

    let stats = PerformanceStats {
        trades: trades.len(),
        win_rate,
        cagr,
        pf,
        sharpe,
        max_dd: max_drawdown_from_equity(&equity),
        exposure,
        net_pnl,
        start: timestamps[0].format("%Y-%m-%d").to_string(),
        end: timestamps[n - 1].format("%Y-%m-%d").to_string(),
    };

    debug!(
        bars = n,
        periods_per_year,
        trades = stats.trades,
        net_pnl = stats.net_pnl,
        "Computed stats"
    );

    Ok(stats)
}

/// Equity column, or `start + cumulative pnl` when absent.
fn equity_curve(series: &BarSeries, start_equity: f64) -> Vec<f64> {
    if let Some(equity) = series.equity.as_ref() {
        return equity.clone();
    }

    let mut running = start_equity;
    series
        .pnl
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|p| {
            running += nan_to_zero(*p);
            running
        })
        .collect()
}

/// Per-bar pnl: the pnl column, equity differences (bar 0 = 0), or zeros.
fn bar_pnl(series: &BarSeries, n: usize) -> Vec<f64> {
    if let Some(pnl) = series.pnl.as_ref() {
        return pnl.clone();
    }
    if let Some(equity) = series.equity.as_ref() {
        let mut out = Vec::with_capacity(n);
        out.push(0.0);
        out.extend(equity.windows(2).map(|w| w[1] - w[0]));
        out.truncate(n);
        return out;
    }
    vec![0.0; n]
}

/// Log returns of the equity curve with non-finite values dropped at each stage.
fn log_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| w[1] / w[0] - 1.0)
        .filter(|r| r.is_finite())
        .map(f64::ln_1p)
        .filter(|r| r.is_finite())
        .collect()
}

fn sharpe_ratio(log_returns: &[f64], ppy: f64) -> f64 {
    if log_returns.len() < 2 {
        return 0.0;
    }

    let mu = log_returns.iter().mean() * ppy;
    let sigma = log_returns.iter().std_dev() * ppy.sqrt();

    if !sigma.is_finite() || sigma.abs() < EPSILON {
        return 0.0;
    }
    finite_or_zero(mu / sigma)
}

fn nan_to_zero(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

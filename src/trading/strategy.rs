//! Long-only SMA momentum strategy with bar-executed stop-loss / take-profit brackets.
//!
//! Signal logic:
//! - enter long when close > SMA(fast) and SMA(fast) > SMA(slow)
//! - while long, exit on stop-loss, then take-profit, then close <= SMA(fast)
//!
//! Each symbol is simulated by a single-slot state machine stepped once per bar.

use statrs::statistics::Statistics;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::models::{ExitReason, PriceBar, SimulationRow};

use super::StrategyConfig;

/// Simple moving average with `min_periods = window`: `None` until `window` values are seen.
///
/// Each mean is taken over its own window, so a run of identical values averages to exactly
/// that value.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                None
            } else {
                Some(values[i + 1 - window..=i].iter().mean())
            }
        })
        .collect()
}

/// Position slot of one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat,
    Long { entry_price: f64, qty: f64 },
}

/// Per-symbol state machine. Holds at most one long position.
#[derive(Debug, Clone)]
pub struct SymbolSimulator {
    config: StrategyConfig,
    position_size: f64,
    equity: f64,
    state: PositionState,
}

impl SymbolSimulator {
    /// `position_size` is the fraction of `equity` committed on each entry.
    pub fn new(config: StrategyConfig, position_size: f64, equity: f64) -> Self {
        Self {
            config,
            position_size,
            equity,
            state: PositionState::Flat,
        }
    }

    /// Advance by one bar and emit its row.
    pub fn step(&mut self, bar: &PriceBar, sma_fast: Option<f64>, sma_slow: Option<f64>) -> SimulationRow {
        let close = bar.close;
        let signal = match (sma_fast, sma_slow) {
            (Some(fast), Some(slow)) => close > fast && fast > slow,
            _ => false,
        };

        let mut row = SimulationRow {
            timestamp: bar.timestamp,
            close,
            sma_fast,
            sma_slow,
            signal,
            position: 0,
            entry_price: None,
            pnl: 0.0,
            exit_reason: None,
        };

        match self.state {
            PositionState::Flat => {
                if signal {
                    let cash = self.equity * self.position_size;
                    if cash > 0.0 && close > 0.0 {
                        let qty = cash / close;
                        self.state = PositionState::Long {
                            entry_price: close,
                            qty,
                        };
                        row.position = 1;
                        row.entry_price = Some(close);
                        debug!(ts = %bar.timestamp, price = close, qty, "Entered long");
                    }
                }
            }
            PositionState::Long { entry_price, qty } => {
                // Missing intrabar extremes fall back to the close.
                let low = if bar.low.is_nan() { close } else { bar.low };
                let high = if bar.high.is_nan() { close } else { bar.high };

                match self.check_exit(entry_price, close, high, low, sma_fast) {
                    Some((exit_price, reason)) => {
                        row.pnl = (exit_price - entry_price) * qty;
                        row.exit_reason = Some(reason);
                        self.state = PositionState::Flat;
                        debug!(
                            ts = %bar.timestamp,
                            entry = entry_price,
                            exit = exit_price,
                            pnl = row.pnl,
                            reason = reason.as_str(),
                            "Closed long"
                        );
                    }
                    None => {
                        row.pnl = (close - entry_price) * qty;
                        row.position = 1;
                        row.entry_price = Some(entry_price);
                        trace!(ts = %bar.timestamp, mtm = row.pnl, "Holding");
                    }
                }
            }
        }

        row
    }

    /// Exit evaluation in strict priority: stop-loss, take-profit, signal exit.
    ///
    /// When both brackets are inside one bar the stop wins.
    fn check_exit(
        &self,
        entry_price: f64,
        close: f64,
        high: f64,
        low: f64,
        sma_fast: Option<f64>,
    ) -> Option<(f64, ExitReason)> {
        let stop = entry_price * (1.0 - self.config.stop_loss_pct);
        let target = entry_price * (1.0 + self.config.take_profit_pct);

        if low <= stop {
            return Some((stop, ExitReason::StopLoss));
        }
        if high >= target {
            return Some((target, ExitReason::TakeProfit));
        }
        match sma_fast {
            Some(fast) if close <= fast => Some((close, ExitReason::SignalExit)),
            _ => None,
        }
    }
}

/// Trading strategy engine.
pub struct Strategy {
    config: StrategyConfig,
}

impl Strategy {
    /// Create a new strategy with configuration.
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Simulate one symbol over its whole panel.
    ///
    /// `position_size` is the fraction of `equity` allocated when entering. Returns one row
    /// per bar. A non-finite close makes the panel unusable and is reported as invalid input.
    pub fn simulate_symbol(
        &self,
        bars: &[PriceBar],
        position_size: f64,
        equity: f64,
    ) -> Result<Vec<SimulationRow>> {
        if let Some((i, bar)) = bars.iter().enumerate().find(|(_, b)| !b.close.is_finite()) {
            return Err(Error::invalid_input(format!(
                "Non-finite close {} at bar {} ({})",
                bar.close, i, bar.timestamp
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = sma(&closes, self.config.fast_window);
        let slow = sma(&closes, self.config.slow_window);

        let mut sim = SymbolSimulator::new(self.config, position_size, equity);
        let rows: Vec<SimulationRow> = bars
            .iter()
            .zip(fast.into_iter().zip(slow))
            .map(|(bar, (f, s))| sim.step(bar, f, s))
            .collect();

        debug!(
            bars = rows.len(),
            exits = rows.iter().filter(|r| r.exit_reason.is_some()).count(),
            "Simulated symbol"
        );

        Ok(rows)
    }
}

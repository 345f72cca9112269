//! Backtest orchestration across symbols.
//!
//! Features:
//! - Correlation-based capital weights across all non-empty panels
//! - Per-symbol strategy simulation with per-symbol failure isolation
//! - Step pnl / equity aggregation and risk gating
//! - Batch runs producing per-symbol statistics and bucketed aggregates

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{compute_stats, DEFAULT_START_EQUITY};
use crate::models::{closes, BarSeries, PerformanceStats, PricePanel};
use crate::trading::{correlation_based_weights, RiskConfig, RiskManager, Strategy, StrategyConfig, Weights};

/// Result of one orchestrated step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// Capital fractions used for this step
    pub weights: Weights,

    /// Pnl of each symbol's final simulated bar (0 for skipped or failed symbols)
    pub per_symbol_pnl: BTreeMap<String, f64>,

    /// Sum of per-symbol pnl
    pub step_pnl: f64,

    /// Equity after applying the step pnl
    pub equity: f64,

    pub daily_loss_breached: bool,
    pub drawdown_breached: bool,

    /// Symbols whose simulation failed and contributed 0
    pub failed_symbols: Vec<String>,
}

impl StepReport {
    /// True if either risk check fired.
    pub fn should_halt(&self) -> bool {
        self.daily_loss_breached || self.drawdown_breached
    }
}

impl std::fmt::Display for StepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n{:=^60}", " BACKTEST STEP ")?;
        writeln!(f, "Step P&L:    ${:.2}", self.step_pnl)?;
        writeln!(f, "Equity:      ${:.2}", self.equity)?;
        writeln!(f, "Stop Daily:  {}", self.daily_loss_breached)?;
        writeln!(f, "Stop DD:     {}", self.drawdown_breached)?;
        writeln!(f)?;
        writeln!(f, "--- Symbols ---")?;
        for (symbol, pnl) in &self.per_symbol_pnl {
            let weight = self.weights.get(symbol).copied().unwrap_or(0.0);
            let failed = if self.failed_symbols.contains(symbol) { "  (failed)" } else { "" };
            writeln!(f, "{:<14} w={:>6.3}  pnl=${:.2}{}", symbol, weight, pnl, failed)?;
        }
        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}

/// Backtesting engine.
pub struct Backtester {
    strategy: Strategy,
    risk: RiskManager,
}

impl Backtester {
    /// Create a new backtester.
    pub fn new(strategy_config: StrategyConfig, risk_config: RiskConfig) -> Self {
        Self {
            strategy: Strategy::new(strategy_config),
            risk: RiskManager::new(risk_config),
        }
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    /// Run a single stateless step: the drawdown curve is just the post-step equity.
    pub fn run(&self, panels: &BTreeMap<String, PricePanel>, equity: f64) -> StepReport {
        self.run_step(panels, equity, &[])
    }

    /// Run one reporting step.
    ///
    /// `equity` is the caller-held equity before this step; `history` holds earlier equity
    /// points of the current risk window (empty for a single-point curve). Symbols with empty
    /// panels are excluded from weighting and report 0.
    pub fn run_step(
        &self,
        panels: &BTreeMap<String, PricePanel>,
        equity: f64,
        history: &[f64],
    ) -> StepReport {
        let close_series: BTreeMap<String, Vec<f64>> = panels
            .iter()
            .filter(|(_, panel)| !panel.is_empty())
            .map(|(symbol, panel)| (symbol.clone(), closes(panel)))
            .collect();
        let weights = correlation_based_weights(&close_series);

        let mut per_symbol_pnl = BTreeMap::new();
        let mut failed_symbols = Vec::new();
        let mut step_pnl = 0.0;

        for (symbol, panel) in panels {
            let w = weights.get(symbol).copied().unwrap_or(0.0);
            if w <= 0.0 {
                debug!(symbol = %symbol, "Skipping symbol with no allocation");
                per_symbol_pnl.insert(symbol.clone(), 0.0);
                continue;
            }

            let pnl = match self.strategy.simulate_symbol(panel, w, equity) {
                Ok(rows) => rows.last().map(|r| r.pnl).unwrap_or(0.0),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Simulation failed, contributing 0");
                    failed_symbols.push(symbol.clone());
                    0.0
                }
            };

            debug!(symbol = %symbol, weight = w, pnl, "Symbol simulated");
            per_symbol_pnl.insert(symbol.clone(), pnl);
            step_pnl += pnl;
        }

        let equity = equity + step_pnl;
        let mut curve = history.to_vec();
        curve.push(equity);

        let report = StepReport {
            weights,
            per_symbol_pnl,
            step_pnl,
            equity,
            daily_loss_breached: self.risk.check_daily_loss_cap(step_pnl),
            drawdown_breached: self.risk.check_drawdown(&curve),
            failed_symbols,
        };

        info!(
            step_pnl = report.step_pnl,
            equity = report.equity,
            stop_daily = report.daily_loss_breached,
            stop_dd = report.drawdown_breached,
            "Backtest step complete"
        );

        report
    }

    // ==================== Batch Runs ====================

    /// Simulate every symbol independently and compute its statistics.
    ///
    /// Symbols whose simulation or statistics fail are logged and left out.
    pub fn run_batch(
        &self,
        panels: &BTreeMap<String, PricePanel>,
        timeframe: &str,
        config: &BatchConfig,
    ) -> Vec<SymbolStats> {
        let mut results = Vec::new();

        for (symbol, panel) in panels {
            if panel.is_empty() {
                warn!(symbol = %symbol, "Empty panel, skipping");
                continue;
            }

            let rows = match self
                .strategy
                .simulate_symbol(panel, config.risk_per_trade, config.capital)
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Simulation failed");
                    continue;
                }
            };

            match compute_stats(&BarSeries::from_rows(&rows), Some(config.capital), None) {
                Ok(stats) => results.push(SymbolStats {
                    symbol: symbol.replace('/', "-"),
                    timeframe: timeframe.to_string(),
                    stats,
                }),
                Err(e) => warn!(symbol = %symbol, error = %e, "Stats failed"),
            }
        }

        info!(symbols = results.len(), timeframe, "Batch run complete");
        results
    }
}

/// Sizing used for batch runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Starting capital, also the stats start equity
    pub capital: f64,

    /// Fraction of capital committed per entry
    pub risk_per_trade: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            capital: DEFAULT_START_EQUITY,
            risk_per_trade: 0.01,
        }
    }
}

/// Statistics for one symbol on one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolStats {
    pub symbol: String,
    pub timeframe: String,
    #[serde(flatten)]
    pub stats: PerformanceStats,
}

/// Aggregated statistics for a bucket of symbol results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Total trades
    pub trades: usize,
    /// Trade-weighted win rate
    pub win_rate: f64,
    /// Mean CAGR
    pub cagr: f64,
    /// Mean profit factor
    pub pf: f64,
    /// Mean Sharpe
    pub sharpe: f64,
    /// Worst drawdown
    pub max_dd: f64,
    /// Mean exposure
    pub exposure: f64,
    /// Summed net pnl
    pub net_pnl: f64,
}

/// Bucket key covering every row.
pub const ALL_BUCKET: &str = "ALL";

/// Aggregate per timeframe plus an `ALL` bucket.
pub fn aggregate(rows: &[SymbolStats]) -> BTreeMap<String, AggregateStats> {
    let mut buckets: BTreeMap<String, Vec<&SymbolStats>> = BTreeMap::new();
    for row in rows {
        buckets.entry(row.timeframe.clone()).or_default().push(row);
    }
    buckets.insert(ALL_BUCKET.to_string(), rows.iter().collect());

    buckets
        .into_iter()
        .filter(|(_, list)| !list.is_empty())
        .map(|(key, list)| (key, aggregate_bucket(&list)))
        .collect()
}

fn aggregate_bucket(list: &[&SymbolStats]) -> AggregateStats {
    let n = list.len() as f64;
    let trades: usize = list.iter().map(|r| r.stats.trades).sum();
    let weighted_wins: f64 = list.iter().map(|r| r.stats.win_rate * r.stats.trades as f64).sum();
    let mean = |f: fn(&PerformanceStats) -> f64| list.iter().map(|r| f(&r.stats)).sum::<f64>() / n;

    AggregateStats {
        trades,
        win_rate: if trades > 0 { weighted_wins / trades as f64 } else { 0.0 },
        cagr: mean(|s| s.cagr),
        pf: mean(|s| s.pf),
        sharpe: mean(|s| s.sharpe),
        max_dd: list.iter().map(|r| r.stats.max_dd).fold(0.0, f64::max),
        exposure: mean(|s| s.exposure),
        net_pnl: list.iter().map(|r| r.stats.net_pnl).sum(),
    }
}

/// Render aggregate and per-symbol tables for terminal output.
pub fn format_batch_table(rows: &[SymbolStats], agg: &BTreeMap<String, AggregateStats>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:<8} {:>7} {:>7} {:>8} {:>6} {:>7} {:>7} {:>8} {:>11}\n",
        "BUCKET", "TRADES", "WIN%", "CAGR", "PF", "SHARPE", "MAXDD", "EXPOSURE", "NET P&L"
    ));
    out.push_str(&format!("{}\n", "-".repeat(78)));

    // Timeframe buckets first, ALL last.
    let ordered = agg
        .iter()
        .filter(|(k, _)| k.as_str() != ALL_BUCKET)
        .chain(agg.get_key_value(ALL_BUCKET));
    for (bucket, a) in ordered {
        out.push_str(&format!(
            "{:<8} {:>7} {:>6.1}% {:>7.1}% {:>6.2} {:>7.2} {:>6.1}% {:>7.1}% {:>11.2}\n",
            bucket,
            a.trades,
            a.win_rate * 100.0,
            a.cagr * 100.0,
            a.pf,
            a.sharpe,
            a.max_dd * 100.0,
            a.exposure * 100.0,
            a.net_pnl
        ));
    }

    out.push_str(&format!(
        "\n{:<12} {:<5} {:>6} {:>7} {:>6} {:>7} {:>7} {:>11} {:<10} {:<10}\n",
        "SYMBOL", "TF", "TRADES", "WIN%", "PF", "SHARPE", "MAXDD", "NET P&L", "START", "END"
    ));
    out.push_str(&format!("{}\n", "-".repeat(92)));
    for r in rows {
        let s = &r.stats;
        out.push_str(&format!(
            "{:<12} {:<5} {:>6} {:>6.1}% {:>6.2} {:>7.2} {:>6.1}% {:>11.2} {:<10} {:<10}\n",
            r.symbol,
            r.timeframe,
            s.trades,
            s.win_rate * 100.0,
            s.pf,
            s.sharpe,
            s.max_dd * 100.0,
            s.net_pnl,
            s.start,
            s.end
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceBar;
    use chrono::{Duration, TimeZone, Utc};

    fn panel(closes: &[f64]) -> PricePanel {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::new(t0 + Duration::hours(i as i64), c, c + 0.3, c - 0.3, c, 5.0))
            .collect()
    }

    fn uptrend(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..n)
            .map(|i| start + step * i as f64 + 0.2 * ((i as f64) * 1.3).sin())
            .collect()
    }

    fn backtester() -> Backtester {
        Backtester::new(StrategyConfig::default(), RiskConfig::default())
    }

    #[test]
    fn test_offline_backtester_runs() {
        let mut panels = BTreeMap::new();
        panels.insert("SYN/USD".to_string(), panel(&uptrend(300, 100.0, 20.0 / 300.0)));

        let report = backtester().run(&panels, DEFAULT_START_EQUITY);

        assert_eq!(report.weights["SYN/USD"], 1.0);
        assert!(report.equity.is_finite());
        assert!(report.step_pnl.is_finite());
        assert!((report.equity - (DEFAULT_START_EQUITY + report.step_pnl)).abs() < 1e-9);
        assert!(report.failed_symbols.is_empty());
    }

    #[test]
    fn test_empty_panel_is_excluded_not_an_error() {
        let mut panels = BTreeMap::new();
        panels.insert("A/USD".to_string(), panel(&uptrend(120, 50.0, 0.1)));
        panels.insert("EMPTY/USD".to_string(), Vec::new());

        let report = backtester().run(&panels, DEFAULT_START_EQUITY);

        assert!(!report.weights.contains_key("EMPTY/USD"));
        assert_eq!(report.weights["A/USD"], 1.0);
        assert_eq!(report.per_symbol_pnl["EMPTY/USD"], 0.0);
        assert!(report.failed_symbols.is_empty());
    }

    #[test]
    fn test_failed_symbol_is_zeroed_and_reported() {
        let mut bad = uptrend(80, 10.0, 0.05);
        bad[40] = f64::NAN;

        let mut panels = BTreeMap::new();
        panels.insert("BAD/USD".to_string(), panel(&bad));
        panels.insert("GOOD/USD".to_string(), panel(&uptrend(80, 20.0, 0.05)));

        let report = backtester().run(&panels, DEFAULT_START_EQUITY);

        assert_eq!(report.failed_symbols, vec!["BAD/USD".to_string()]);
        assert_eq!(report.per_symbol_pnl["BAD/USD"], 0.0);
        assert_eq!(report.step_pnl, report.per_symbol_pnl["GOOD/USD"]);
    }

    #[test]
    fn test_step_pnl_sums_symbols_and_updates_equity() {
        let mut panels = BTreeMap::new();
        panels.insert("A/USD".to_string(), panel(&uptrend(200, 100.0, 0.2)));
        panels.insert("B/USD".to_string(), panel(&uptrend(200, 30.0, 0.05)));

        let report = backtester().run_step(&panels, 25_000.0, &[]);
        let sum: f64 = report.per_symbol_pnl.values().sum();

        assert!((report.step_pnl - sum).abs() < 1e-9);
        assert!((report.equity - (25_000.0 + sum)).abs() < 1e-9);
        assert!((report.weights.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_drawdown_uses_caller_history() {
        let backtester = Backtester::new(
            StrategyConfig::default(),
            RiskConfig {
                usd_daily_loss_cap: 1_000_000.0,
                max_drawdown_pct: 0.05,
            },
        );
        let panels: BTreeMap<String, PricePanel> = BTreeMap::new();

        // No symbols: step pnl 0, equity unchanged at 9,000 against a 10,000 peak.
        let report = backtester.run_step(&panels, 9_000.0, &[10_000.0]);
        assert_eq!(report.step_pnl, 0.0);
        assert!(report.drawdown_breached);
        assert!(!report.daily_loss_breached);

        let single = backtester.run_step(&panels, 9_000.0, &[]);
        assert!(!single.drawdown_breached);
    }

    #[test]
    fn test_run_batch_and_aggregate() {
        let mut panels = BTreeMap::new();
        panels.insert("BTC/USD".to_string(), panel(&uptrend(300, 100.0, 0.1)));
        panels.insert("ETH/USD".to_string(), panel(&uptrend(300, 50.0, -0.02)));
        panels.insert("NONE/USD".to_string(), Vec::new());

        let rows = backtester().run_batch(&panels, "1h", &BatchConfig::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "BTC-USD");
        assert!(rows.iter().all(|r| r.timeframe == "1h"));

        let agg = aggregate(&rows);
        assert_eq!(agg.len(), 2);
        let all = &agg[ALL_BUCKET];
        assert_eq!(all.trades, rows.iter().map(|r| r.stats.trades).sum::<usize>());
        assert!((0.0..=1.0).contains(&all.win_rate));
        assert!((0.0..=1.0).contains(&all.max_dd));

        let table = format_batch_table(&rows, &agg);
        assert!(table.contains("BTC-USD"));
        assert!(table.contains(ALL_BUCKET));
    }

    #[test]
    fn test_aggregate_weights_win_rate_by_trades() {
        let stats = |trades, win_rate, max_dd| PerformanceStats {
            trades,
            win_rate,
            cagr: 0.1,
            pf: 1.0,
            sharpe: 1.0,
            max_dd,
            exposure: 0.5,
            net_pnl: 10.0,
            start: "2024-01-01".to_string(),
            end: "2024-01-02".to_string(),
        };
        let rows = vec![
            SymbolStats { symbol: "A".into(), timeframe: "1h".into(), stats: stats(10, 0.8, 0.1) },
            SymbolStats { symbol: "B".into(), timeframe: "4h".into(), stats: stats(30, 0.4, 0.3) },
        ];

        let agg = aggregate(&rows);
        let all = &agg[ALL_BUCKET];
        assert_eq!(all.trades, 40);
        assert!((all.win_rate - 0.5).abs() < 1e-12);
        assert_eq!(all.max_dd, 0.3);
        assert_eq!(all.net_pnl, 20.0);
        assert_eq!(agg["1h"].trades, 10);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(&[]).is_empty());
    }
}

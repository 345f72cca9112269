//! Momentum Backtester
//!
//! Long-only SMA-crossover backtests over multi-symbol price panels with
//! correlation-based capital weights, daily risk gating, and performance statistics.

mod backtest;
mod data;
mod db;
mod error;
mod metrics;
mod models;
mod trading;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::backtest::{aggregate, format_batch_table, BatchConfig, Backtester};
use crate::data::{load_panels, PanelSpec};
use crate::db::Database;
use crate::metrics::{compute_stats, DEFAULT_START_EQUITY};
use crate::models::BarSeries;
use crate::trading::{RiskConfig, StrategyConfig};

/// Momentum backtester CLI.
#[derive(Parser)]
#[command(name = "momentum-bt")]
#[command(about = "Backtest an SMA momentum strategy across symbols", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./momentum.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest step over the given panels
    Backtest {
        /// Panel file per symbol, as SYMBOL=path (repeatable)
        #[arg(short, long = "panel", required = true)]
        panels: Vec<PanelSpec>,

        /// Starting equity
        #[arg(short, long, default_value_t = DEFAULT_START_EQUITY)]
        equity: f64,
    },

    /// Run one stateful step, carrying equity and daily counters between runs
    Step {
        /// Panel file per symbol, as SYMBOL=path (repeatable)
        #[arg(short, long = "panel", required = true)]
        panels: Vec<PanelSpec>,

        /// Equity used the first time state is created
        #[arg(short, long, default_value_t = DEFAULT_START_EQUITY)]
        initial_equity: f64,
    },

    /// Simulate every symbol independently and report per-symbol statistics
    Batch {
        /// Panel file per symbol, as SYMBOL=path (repeatable)
        #[arg(short, long = "panel", required = true)]
        panels: Vec<PanelSpec>,

        /// Timeframe label for the aggregate buckets
        #[arg(short, long, default_value = "1h")]
        timeframe: String,

        /// Starting capital per symbol
        #[arg(short, long, default_value_t = DEFAULT_START_EQUITY)]
        capital: f64,

        /// Fraction of capital committed per entry
        #[arg(short, long, default_value = "0.01")]
        risk_per_trade: f64,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Compute statistics for a bar series JSON file
    Stats {
        /// JSON file with timestamp/position/pnl/equity columns
        file: PathBuf,

        /// Starting equity when the file has no equity column
        #[arg(short, long)]
        start_equity: Option<f64>,

        /// Override the inferred bars per year
        #[arg(short, long)]
        periods_per_year: Option<u32>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show persisted run state
    Status,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Backtest { panels, equity } => {
            let backtester = build_backtester()?;
            let panels = load_panels(&panels).await;
            if panels.is_empty() {
                println!("No panels could be loaded.");
                return Ok(());
            }

            info!(symbols = panels.len(), equity, "Starting backtest");
            let report = backtester.run(&panels, equity);
            println!("{}", report);

            if report.should_halt() {
                println!("Risk cap reached; halting further trading for today.");
            }
        }

        Commands::Step {
            panels,
            initial_equity,
        } => {
            let backtester = build_backtester()?;
            let db = Database::new(&cli.database).await?;
            let today = Utc::now().date_naive();

            let mut state = db.init_run_state(initial_equity, today).await?;
            if state.roll_day(today) {
                info!(day = %state.trading_day, equity = state.equity, "New trading day");
            }

            // Once halted, stay halted until the day rolls over.
            let halted_today = db
                .get_recent_steps(1)
                .await?
                .first()
                .map(|s| {
                    s.trading_day == state.trading_day
                        && (s.daily_loss_breached || s.drawdown_breached)
                })
                .unwrap_or(false);
            if halted_today {
                println!("Risk cap reached; halting further trading for today.");
                return Ok(());
            }

            let panels = load_panels(&panels).await;
            if panels.is_empty() {
                println!("No panels could be loaded.");
                return Ok(());
            }

            let mut history = vec![state.day_start_equity];
            history.extend(db.get_day_equity_curve(&state.trading_day).await?);

            let report = backtester.run_step(&panels, state.equity, &history);
            state.apply_step(report.step_pnl);
            state.last_symbols = panels.keys().cloned().collect::<Vec<_>>().join(",");

            // The step alone may stay under the cap while the day's total does not.
            let stop_daily = report.daily_loss_breached
                || backtester.risk().check_daily_loss_cap(state.daily_pnl);

            db.save_run_state(&state).await?;
            db.record_step(
                &state.trading_day,
                &state.last_symbols,
                report.step_pnl,
                state.equity,
                stop_daily,
                report.drawdown_breached,
            )
            .await?;

            println!("{}", report);
            println!("Daily P&L:   ${:.2}", state.daily_pnl);
            println!("Run:         #{}", state.runs);

            if stop_daily || report.drawdown_breached {
                println!("Risk cap reached; halting further trading for today.");
            }
        }

        Commands::Batch {
            panels,
            timeframe,
            capital,
            risk_per_trade,
            json,
        } => {
            let backtester = build_backtester()?;
            let panels = load_panels(&panels).await;

            let config = BatchConfig {
                capital,
                risk_per_trade,
            };
            let rows = backtester.run_batch(&panels, &timeframe, &config);
            if rows.is_empty() {
                println!("No symbol produced statistics.");
                return Ok(());
            }

            let agg = aggregate(&rows);
            if json {
                let out = serde_json::json!({ "aggregate": agg, "symbols": rows });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", format_batch_table(&rows, &agg));
            }
        }

        Commands::Stats {
            file,
            start_equity,
            periods_per_year,
            json,
        } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let series: BarSeries = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", file.display()))?;

            let stats = match compute_stats(&series, start_equity, periods_per_year) {
                Ok(stats) => stats,
                Err(e) if e.is_invalid_input() => {
                    // Bad data in the file, not an environment failure.
                    eprintln!("{}: {}", file.display(), e);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats);
            }
        }

        Commands::Status => {
            let db = Database::new(&cli.database).await?;
            let Some(state) = db.get_run_state().await? else {
                println!("No run state found. Run 'momentum-bt step' to start.");
                return Ok(());
            };

            let max_dd = db.calculate_max_drawdown().await.unwrap_or(0.0);
            let steps = db.get_recent_steps(5).await?;

            println!("\n=== Run State ===");
            println!("Runs:             {}", state.runs);
            println!("Last Run:         {}", state.last_run_at.as_deref().unwrap_or("Never"));
            println!("Symbols:          {}", state.last_symbols);

            println!("\n=== Equity ===");
            println!("Equity:           ${:.2}", state.equity);
            println!("Trading Day:      {}", state.trading_day);
            println!("Day Start:        ${:.2}", state.day_start_equity);
            println!("Daily P&L:        ${:.2}", state.daily_pnl);
            println!("Max Drawdown:     {:.2}%", max_dd * 100.0);

            if !steps.is_empty() {
                println!("\n=== Recent Steps ===");
                for step in &steps {
                    let flag = if step.daily_loss_breached || step.drawdown_breached {
                        "  HALT"
                    } else {
                        ""
                    };
                    println!(
                        "  #{:<5} {}  pnl=${:>9.2}  equity=${:>10.2}  [{}]{}",
                        step.id, step.recorded_at, step.step_pnl, step.equity, step.symbols, flag
                    );
                }
            }
        }

        Commands::Config => {
            let strategy = StrategyConfig::from_env()?;
            let risk = RiskConfig::from_env()?;

            println!("\n=== Strategy Configuration ===\n");
            println!("  Fast SMA:             {}", strategy.fast_window);
            println!("  Slow SMA:             {}", strategy.slow_window);
            println!("  Stop Loss:            {:.2}%", strategy.stop_loss_pct * 100.0);
            println!("  Take Profit:          {:.2}%", strategy.take_profit_pct * 100.0);

            println!("\n=== Risk Configuration ===\n");
            println!("  Daily Loss Cap:       ${:.2}", risk.usd_daily_loss_cap);
            println!("  Max Drawdown:         {:.2}%", risk.max_drawdown_pct * 100.0);
        }
    }

    Ok(())
}

/// Backtester configured from the environment.
fn build_backtester() -> Result<Backtester> {
    let strategy = StrategyConfig::from_env().context("Invalid strategy configuration")?;
    let risk = RiskConfig::from_env().context("Invalid risk configuration")?;
    Ok(Backtester::new(strategy, risk))
}

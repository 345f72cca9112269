//! Persistence for run state carried between invocations.
//!
//! Stores what the stateful `step` command needs to resume:
//! - Current equity and the trading-day counters
//! - A log of every orchestrated step (the equity curve)

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::metrics::max_drawdown_from_equity;

/// Single-row run state.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RunState {
    pub id: i64,
    pub runs: i64,
    pub equity: f64,
    pub day_start_equity: f64,
    pub daily_pnl: f64,
    /// `YYYY-MM-DD` of the day the counters belong to
    pub trading_day: String,
    /// Comma-separated symbols of the last run
    pub last_symbols: String,
    pub last_run_at: Option<String>,
}

impl RunState {
    /// Reset the daily counters when `today` differs from the stored trading day.
    ///
    /// Returns true if a rollover happened.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        let today = today.format("%Y-%m-%d").to_string();
        if self.trading_day == today {
            return false;
        }
        self.trading_day = today;
        self.day_start_equity = self.equity;
        self.daily_pnl = 0.0;
        true
    }

    /// Apply one step's pnl to the daily counters and equity.
    pub fn apply_step(&mut self, step_pnl: f64) {
        self.daily_pnl += step_pnl;
        self.equity = self.day_start_equity + self.daily_pnl;
        self.runs += 1;
    }
}

/// One persisted orchestrator step.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StepRecord {
    pub id: i64,
    pub recorded_at: String,
    pub trading_day: String,
    pub symbols: String,
    pub step_pnl: f64,
    pub equity: f64,
    pub daily_loss_breached: bool,
    pub drawdown_breached: bool,
}

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Each in-memory connection is its own database, so keep a single one.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                runs INTEGER NOT NULL DEFAULT 0,
                equity REAL NOT NULL,
                day_start_equity REAL NOT NULL,
                daily_pnl REAL NOT NULL DEFAULT 0,
                trading_day TEXT NOT NULL,
                last_symbols TEXT NOT NULL DEFAULT '',
                last_run_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                trading_day TEXT NOT NULL,
                symbols TEXT NOT NULL,
                step_pnl REAL NOT NULL,
                equity REAL NOT NULL,
                daily_loss_breached INTEGER NOT NULL DEFAULT 0,
                drawdown_breached INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_step_log_day ON step_log(trading_day)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Run State ====================

    /// Load the run state, creating it with `initial_equity` on first use.
    pub async fn init_run_state(&self, initial_equity: f64, today: NaiveDate) -> Result<RunState> {
        sqlx::query(
            r#"
            INSERT INTO run_state (id, equity, day_start_equity, trading_day)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(initial_equity)
        .bind(initial_equity)
        .bind(today.format("%Y-%m-%d").to_string())
        .execute(&self.pool)
        .await?;

        self.get_run_state()
            .await?
            .context("Run state missing after initialization")
    }

    /// Current run state, if any run has happened.
    pub async fn get_run_state(&self) -> Result<Option<RunState>> {
        sqlx::query_as::<_, RunState>("SELECT * FROM run_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run state")
    }

    /// Persist the run state and stamp the run time.
    pub async fn save_run_state(&self, state: &RunState) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE run_state SET
                runs = ?,
                equity = ?,
                day_start_equity = ?,
                daily_pnl = ?,
                trading_day = ?,
                last_symbols = ?,
                last_run_at = datetime('now')
            WHERE id = 1
            "#,
        )
        .bind(state.runs)
        .bind(state.equity)
        .bind(state.day_start_equity)
        .bind(state.daily_pnl)
        .bind(&state.trading_day)
        .bind(&state.last_symbols)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Step Log ====================

    /// Record one orchestrated step.
    pub async fn record_step(
        &self,
        trading_day: &str,
        symbols: &str,
        step_pnl: f64,
        equity: f64,
        daily_loss_breached: bool,
        drawdown_breached: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO step_log
                (trading_day, symbols, step_pnl, equity, daily_loss_breached, drawdown_breached)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trading_day)
        .bind(symbols)
        .bind(step_pnl)
        .bind(equity)
        .bind(daily_loss_breached)
        .bind(drawdown_breached)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Equity points recorded on one trading day, oldest first.
    pub async fn get_day_equity_curve(&self, trading_day: &str) -> Result<Vec<f64>> {
        let rows: Vec<(f64,)> =
            sqlx::query_as("SELECT equity FROM step_log WHERE trading_day = ? ORDER BY id ASC")
                .bind(trading_day)
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch equity curve")?;

        Ok(rows.into_iter().map(|(e,)| e).collect())
    }

    /// Most recent steps, newest first.
    pub async fn get_recent_steps(&self, limit: i64) -> Result<Vec<StepRecord>> {
        sqlx::query_as::<_, StepRecord>("SELECT * FROM step_log ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch step log")
    }

    /// Max drawdown over the whole step log.
    pub async fn calculate_max_drawdown(&self) -> Result<f64> {
        let rows: Vec<(f64,)> = sqlx::query_as("SELECT equity FROM step_log ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        let curve: Vec<f64> = rows.into_iter().map(|(e,)| e).collect();

        Ok(max_drawdown_from_equity(&curve))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_roll_day_resets_counters() {
        let mut state = RunState {
            id: 1,
            runs: 3,
            equity: 10_250.0,
            day_start_equity: 10_000.0,
            daily_pnl: 250.0,
            trading_day: "2024-03-01".to_string(),
            last_symbols: String::new(),
            last_run_at: None,
        };

        assert!(!state.roll_day(day(1)));
        assert_eq!(state.daily_pnl, 250.0);

        assert!(state.roll_day(day(2)));
        assert_eq!(state.day_start_equity, 10_250.0);
        assert_eq!(state.daily_pnl, 0.0);

        state.apply_step(-50.0);
        assert_eq!(state.equity, 10_200.0);
        assert_eq!(state.runs, 4);
    }

    #[tokio::test]
    async fn test_run_state_round_trip() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        assert!(db.get_run_state().await.unwrap().is_none());

        let mut state = db.init_run_state(5_000.0, day(1)).await.unwrap();
        assert_eq!(state.equity, 5_000.0);
        assert_eq!(state.trading_day, "2024-03-01");

        state.apply_step(125.0);
        state.last_symbols = "BTC/USD,ETH/USD".to_string();
        db.save_run_state(&state).await.unwrap();

        // A second init must not overwrite existing state.
        let loaded = db.init_run_state(1.0, day(2)).await.unwrap();
        assert_eq!(loaded.equity, 5_125.0);
        assert_eq!(loaded.runs, 1);
        assert_eq!(loaded.last_symbols, "BTC/USD,ETH/USD");
        assert!(loaded.last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_step_log_and_drawdown() {
        let db = Database::new("sqlite::memory:").await.unwrap();

        db.record_step("2024-03-01", "BTC/USD", 0.0, 100.0, false, false).await.unwrap();
        db.record_step("2024-03-01", "BTC/USD", 20.0, 120.0, false, false).await.unwrap();
        db.record_step("2024-03-02", "BTC/USD", -30.0, 90.0, false, true).await.unwrap();

        assert_eq!(db.get_day_equity_curve("2024-03-01").await.unwrap(), vec![100.0, 120.0]);

        let steps = db.get_recent_steps(10).await.unwrap();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].drawdown_breached);
        assert_eq!(steps[0].symbols, "BTC/USD");
        assert!(steps[0].id > steps[2].id);

        let mdd = db.calculate_max_drawdown().await.unwrap();
        assert!((mdd - 0.25).abs() < 1e-12);
    }
}

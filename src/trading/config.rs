//! Strategy and risk configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parameters of the long-only SMA momentum strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Fast SMA window in bars
    pub fast_window: usize,

    /// Slow SMA window in bars, strictly larger than the fast window
    pub slow_window: usize,

    /// Stop distance below entry (0.0 to 1.0, exclusive)
    pub stop_loss_pct: f64,

    /// Take-profit distance above entry
    pub take_profit_pct: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_window: 20,
            slow_window: 50,
            stop_loss_pct: 0.02,   // 2% stop
            take_profit_pct: 0.04, // 4% target
        }
    }
}

impl StrategyConfig {
    /// Load from `MOMENTUM_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            fast_window: env_or("MOMENTUM_FAST_SMA", defaults.fast_window)?,
            slow_window: env_or("MOMENTUM_SLOW_SMA", defaults.slow_window)?,
            stop_loss_pct: env_or("MOMENTUM_STOP_LOSS_PCT", defaults.stop_loss_pct)?,
            take_profit_pct: env_or("MOMENTUM_TAKE_PROFIT_PCT", defaults.take_profit_pct)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fast_window == 0 {
            return Err(Error::invalid_config("fast_window must be > 0"));
        }
        if self.slow_window <= self.fast_window {
            return Err(Error::invalid_config(format!(
                "slow_window ({}) must be greater than fast_window ({})",
                self.slow_window, self.fast_window
            )));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(Error::invalid_config(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        if !(self.take_profit_pct > 0.0 && self.take_profit_pct.is_finite()) {
            return Err(Error::invalid_config(format!(
                "take_profit_pct must be > 0, got {}",
                self.take_profit_pct
            )));
        }
        Ok(())
    }
}

/// Loss and drawdown limits for the risk gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Stop trading once daily pnl drops to -cap (USD)
    pub usd_daily_loss_cap: f64,

    /// Peak-to-trough equity drawdown cap (0.0 to 1.0, exclusive)
    pub max_drawdown_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            usd_daily_loss_cap: 500.0,
            max_drawdown_pct: 0.03, // 3% equity drawdown
        }
    }
}

impl RiskConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            usd_daily_loss_cap: env_or("MOMENTUM_DAILY_LOSS_CAP", defaults.usd_daily_loss_cap)?,
            max_drawdown_pct: env_or("MOMENTUM_MAX_DRAWDOWN_PCT", defaults.max_drawdown_pct)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.usd_daily_loss_cap > 0.0 && self.usd_daily_loss_cap.is_finite()) {
            return Err(Error::invalid_config(format!(
                "usd_daily_loss_cap must be > 0, got {}",
                self.usd_daily_loss_cap
            )));
        }
        if !(self.max_drawdown_pct > 0.0 && self.max_drawdown_pct < 1.0) {
            return Err(Error::invalid_config(format!(
                "max_drawdown_pct must be in (0, 1), got {}",
                self.max_drawdown_pct
            )));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::invalid_config(format!("{} has an unparseable value: {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

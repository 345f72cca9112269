//! Risk gate: daily loss cap and peak-to-trough drawdown checks.
//!
//! Both checks are pure and advisory; halting is the caller's decision.

use tracing::warn;

use super::RiskConfig;

/// Stateless risk checks over a fixed configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// True when trading should stop because the daily loss cap was reached (inclusive).
    pub fn check_daily_loss_cap(&self, daily_pnl: f64) -> bool {
        let breached = daily_loss_breached(daily_pnl, self.config.usd_daily_loss_cap);
        if breached {
            warn!(
                daily_pnl,
                cap = self.config.usd_daily_loss_cap,
                "Daily loss cap breached"
            );
        }
        breached
    }

    /// True when the curve's drawdown from its running peak reached the cap at any point.
    pub fn check_drawdown(&self, equity_curve: &[f64]) -> bool {
        match first_drawdown_breach(equity_curve, self.config.max_drawdown_pct) {
            Some(index) => {
                warn!(
                    index,
                    equity = equity_curve[index],
                    cap = self.config.max_drawdown_pct,
                    "Drawdown cap breached"
                );
                true
            }
            None => false,
        }
    }
}

/// `pnl <= -|cap|`.
pub fn daily_loss_breached(daily_pnl: f64, cap: f64) -> bool {
    daily_pnl <= -cap.abs()
}

/// Index of the first point whose drawdown from the running peak is >= `max_drawdown_pct`.
///
/// Points with a non-positive peak count as zero drawdown.
pub fn first_drawdown_breach(equity_curve: &[f64], max_drawdown_pct: f64) -> Option<usize> {
    let mut peak = *equity_curve.first()?;

    for (i, &value) in equity_curve.iter().enumerate() {
        peak = peak.max(value);
        let dd = if peak > 0.0 { (peak - value) / peak } else { 0.0 };
        if dd >= max_drawdown_pct {
            return Some(i);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig {
            usd_daily_loss_cap: 500.0,
            max_drawdown_pct: 0.10,
        })
    }

    #[test]
    fn test_daily_loss_boundary_is_inclusive() {
        let risk = manager();
        assert!(risk.check_daily_loss_cap(-500.0));
        assert!(risk.check_daily_loss_cap(-500.01));
        assert!(!risk.check_daily_loss_cap(-499.99));
        assert!(!risk.check_daily_loss_cap(250.0));
    }

    #[test]
    fn test_negative_cap_uses_magnitude() {
        assert!(daily_loss_breached(-100.0, -100.0));
        assert!(!daily_loss_breached(-99.0, -100.0));
    }

    #[test]
    fn test_drawdown_fires_at_first_crossing() {
        // 100 -> 120 peak; 110 is 8.3% down, 108 is exactly 10% down.
        let curve = [100.0, 120.0, 110.0, 108.0, 130.0];
        assert_eq!(first_drawdown_breach(&curve, 0.10), Some(3));
        assert!(!manager().check_drawdown(&curve[..3]));
        assert!(manager().check_drawdown(&curve));
    }

    #[test]
    fn test_drawdown_does_not_clear_on_recovery() {
        let curve = [100.0, 80.0, 150.0, 160.0];
        assert!(manager().check_drawdown(&curve));
    }

    #[test]
    fn test_drawdown_edge_cases() {
        let risk = manager();
        assert!(!risk.check_drawdown(&[]));
        assert!(!risk.check_drawdown(&[10_000.0]));
        assert!(!risk.check_drawdown(&[0.0, -5.0, -10.0]));
        assert!(!risk.check_drawdown(&[1.0, 2.0, 3.0]));
    }
}

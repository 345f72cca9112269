//! Data models for price bars, simulation rows, trades, series and statistics.

mod bar;
mod metrics;
mod row;
mod series;
mod trade;

pub use bar::{closes, PriceBar, PricePanel};
pub use metrics::PerformanceStats;
pub use row::{ExitReason, SimulationRow};
pub use series::BarSeries;
pub use trade::Trade;

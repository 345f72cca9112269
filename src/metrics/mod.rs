//! Trade inference and performance statistics.

mod calculator;

pub use calculator::{compute_stats, max_drawdown_from_equity, DEFAULT_START_EQUITY};

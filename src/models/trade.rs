//! Trades inferred from a position series.

use serde::{Deserialize, Serialize};

/// A round trip derived post-hoc from position transitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Bar index where the position was opened
    pub entry_index: usize,

    /// Bar index where the position was closed (strictly after entry)
    pub exit_index: usize,

    /// Sum of bar pnl from entry through exit, inclusive
    pub pnl: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}

//! Trading logic: strategy simulation, correlation weighting, risk gate.

mod config;
mod risk;
mod strategy;
mod weights;

pub use config::{RiskConfig, StrategyConfig};
pub use risk::RiskManager;
pub use strategy::Strategy;
pub use weights::{correlation_based_weights, Weights};

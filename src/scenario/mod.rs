//! Deterministic bank scenarios for demonstrating and exercising the monitor.

/// Scenario file format and validation.
pub mod config;
/// Thread-per-step scenario runner.
pub mod runner;

pub use config::{ScenarioConfig, ScenarioStep, DEFAULT_KEY, MAX_STEPS};
pub use runner::{run_scenario, run_with_key, ScenarioReport};

//! Scenario configuration.
//!
//! A scenario is a JSON document:
//!
//! ```json
//! {
//!   "key": "semmon-bank",
//!   "initial_balance": 0,
//!   "steps": [
//!     { "label": "T1", "delay_ms": 0,   "amount": -50 },
//!     { "label": "T2", "delay_ms": 100, "amount": 30 },
//!     { "label": "T3", "delay_ms": 200, "amount": 25 }
//!   ]
//! }
//! ```
//!
//! Positive amounts are deposits, negative amounts withdrawals.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sem::SemKey;

/// Key name used when a scenario does not set one.
pub const DEFAULT_KEY: &str = "semmon-bank";

/// Maximum number of steps (one thread each) in a scenario.
pub const MAX_STEPS: usize = 1024;

/// One transaction, run on its own thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Name for the thread and the ledger entry.
    pub label: String,
    /// How long the thread sleeps before transacting.
    #[serde(default)]
    pub delay_ms: u64,
    /// Deposit if positive, withdrawal if negative.
    pub amount: i64,
}

impl ScenarioStep {
    /// Convenience constructor.
    #[must_use]
    pub fn new(label: impl Into<String>, delay_ms: u64, amount: i64) -> Self {
        Self {
            label: label.into(),
            delay_ms,
            amount,
        }
    }

    /// The delay as a `Duration`.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// A complete bank scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Name the monitor's IPC key is derived from.
    #[serde(default = "default_key")]
    pub key: String,
    /// Opening balance.
    #[serde(default)]
    pub initial_balance: i64,
    /// Transactions to run.
    pub steps: Vec<ScenarioStep>,
}

fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

impl Default for ScenarioConfig {
    /// One withdrawal that has to wait for two deposits; ends with a balance of 5.
    fn default() -> Self {
        Self {
            key: default_key(),
            initial_balance: 0,
            steps: vec![
                ScenarioStep::new("T1", 0, -50),
                ScenarioStep::new("T2", 100, 30),
                ScenarioStep::new("T3", 200, 25),
            ],
        }
    }
}

impl ScenarioConfig {
    /// Parses and validates a scenario from a JSON string.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed JSON and
    /// `ConfigError::Invalid` if validation fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a scenario file.
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`ScenarioConfig::from_json_str`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// The IPC key for this scenario's monitor.
    #[must_use]
    pub fn sem_key(&self) -> SemKey {
        SemKey::from_name(&self.key)
    }

    /// Total deposited across all steps, or `None` if it overflows.
    #[must_use]
    pub fn total_deposits(&self) -> Option<i64> {
        self.steps
            .iter()
            .map(|s| s.amount)
            .filter(|a| *a > 0)
            .try_fold(0i64, i64::checked_add)
    }

    /// Total withdrawn across all steps as a positive number, or `None` if
    /// it overflows.
    #[must_use]
    pub fn total_withdrawals(&self) -> Option<i64> {
        self.steps
            .iter()
            .map(|s| s.amount)
            .filter(|a| *a < 0)
            .try_fold(0i64, |total, a| total.checked_add(a.checked_abs()?))
    }

    /// Checks the scenario can run to completion.
    ///
    /// Withdrawals block until covered and nothing times out, so a scenario
    /// that withdraws more than it ever holds would hang forever.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.is_empty() {
            return Err(invalid("key must not be empty"));
        }
        if self.initial_balance < 0 {
            return Err(invalid(format!(
                "initial balance must not be negative, got {}",
                self.initial_balance
            )));
        }
        if self.steps.is_empty() {
            return Err(invalid("scenario has no steps"));
        }
        if self.steps.len() > MAX_STEPS {
            return Err(invalid(format!(
                "scenario has {} steps, at most {MAX_STEPS} are allowed",
                self.steps.len()
            )));
        }
        if let Some(step) = self.steps.iter().find(|s| s.amount == 0) {
            return Err(invalid(format!("step '{}' has a zero amount", step.label)));
        }
        if let Some(step) = self.steps.iter().find(|s| s.amount == i64::MIN) {
            return Err(invalid(format!("step '{}' amount is out of range", step.label)));
        }

        // The balance never exceeds the opening balance plus every deposit,
        // so bounding that sum keeps each deposit from overflowing.
        let available = self
            .total_deposits()
            .and_then(|deposits| self.initial_balance.checked_add(deposits))
            .ok_or_else(|| invalid("opening balance plus deposits overflows the balance range"))?;
        let withdrawals = self
            .total_withdrawals()
            .ok_or_else(|| invalid("withdrawals total overflows the balance range"))?;
        if withdrawals > available {
            return Err(invalid(format!(
                "withdrawals total {withdrawals} but only {available} is ever available"
            )));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

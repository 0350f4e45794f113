//! Runs a scenario: one thread per step, all sharing one bank.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::bank::{Bank, SavingsAccount, Transaction, TransactionKind};
use crate::error::{SemmonError, SemmonResult};
use crate::sem::SemKey;

use super::config::{ScenarioConfig, ScenarioStep};

/// Outcome of a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Completed transactions in the order they moved money.
    pub ledger: Vec<Transaction>,
    /// The account after every thread finished.
    pub final_account: SavingsAccount,
}

impl ScenarioReport {
    /// The ledger entry for `label`, if that step ran.
    #[must_use]
    pub fn entry(&self, label: &str) -> Option<&Transaction> {
        self.ledger.iter().find(|tx| tx.label == label)
    }

    /// One JSON object per line: each transaction, then the final account.
    ///
    /// # Errors
    /// Returns the serializer error if any record cannot be encoded.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for tx in &self.ledger {
            out.push_str(&serde_json::to_string(tx)?);
            out.push('\n');
        }
        out.push_str(&serde_json::to_string(&self.final_account)?);
        out.push('\n');
        Ok(out)
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tx in &self.ledger {
            let verb = match tx.kind {
                TransactionKind::Deposit => "deposited",
                TransactionKind::Withdrawal => "withdrew",
            };
            write!(
                f,
                "#{:<3} {:<12} {verb:<9} {:>8}  balance {:>8}",
                tx.sequence, tx.label, tx.amount, tx.balance_after
            )?;
            if tx.waited_for_turn {
                write!(f, "  [queued]")?;
            }
            if tx.waited_for_funds {
                write!(f, "  [waited for funds]")?;
            }
            if tx.signaled {
                write!(f, "  [woke a waiter]")?;
            }
            writeln!(f)?;
        }
        write!(f, "final balance {}", self.final_account.balance)
    }
}

/// Validates `config` and runs it under the key derived from its name.
///
/// # Errors
/// - `SemmonError::Config` if the scenario is invalid
/// - `SemmonError::Bank` if the monitor cannot be allocated (for example a
///   previous run leaked a set under the same key)
pub fn run_scenario(config: &ScenarioConfig) -> SemmonResult<ScenarioReport> {
    config.validate()?;
    run_with_key(config, config.sem_key())
}

/// Runs `config` under an explicit key.
///
/// Blocks until every step has completed. Each withdrawal waits until it is
/// covered, so an unvalidated scenario may never return.
///
/// Results are collected as the steps finish. The first failing step ends
/// the run with its error; steps still parked in the monitor at that point
/// are abandoned and keep the monitor alive until they complete.
///
/// # Errors
/// As [`run_scenario`], plus `SemmonError::Internal` if a step thread cannot
/// be spawned or panics.
pub fn run_with_key(config: &ScenarioConfig, key: SemKey) -> SemmonResult<ScenarioReport> {
    let bank = Arc::new(Bank::open(key, config.initial_balance)?);
    info!(
        "running {} steps on key {key} with opening balance {}",
        config.steps.len(),
        config.initial_balance
    );

    let (tx, rx) = bounded::<SemmonResult<Transaction>>(config.steps.len().max(1));
    let mut workers = Vec::with_capacity(config.steps.len());

    for step in &config.steps {
        let bank = Arc::clone(&bank);
        let tx = tx.clone();
        let label = step.label.clone();
        let step = step.clone();

        let handle = thread::Builder::new()
            .name(format!("bank-{label}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| transact(&bank, &step)))
                    .unwrap_or_else(|_| Err(SemmonError::internal(format!("step '{}' panicked", step.label))));
                let _ = tx.send(result);
            })
            .map_err(|e| SemmonError::internal(format!("failed to spawn thread for step '{label}': {e}")))?;
        workers.push(handle);
    }
    drop(tx);

    let mut ledger = Vec::with_capacity(workers.len());
    for _ in 0..workers.len() {
        let result = rx
            .recv()
            .map_err(|_| SemmonError::internal("scenario threads exited without reporting"))?;
        match result {
            Ok(tx) => ledger.push(tx),
            Err(err) => {
                warn!("scenario step failed, abandoning {} pending steps: {err}", workers.len() - ledger.len() - 1);
                return Err(err);
            }
        }
    }

    for handle in workers {
        handle
            .join()
            .map_err(|_| SemmonError::internal("a scenario thread panicked"))?;
    }
    ledger.sort_by_key(|tx| tx.sequence);

    let bank = Arc::try_unwrap(bank).map_err(|_| SemmonError::internal("bank still shared after all threads joined"))?;
    let final_account = bank.close();
    info!("scenario finished with balance {}", final_account.balance);

    Ok(ScenarioReport { ledger, final_account })
}

fn transact(bank: &Bank, step: &ScenarioStep) -> SemmonResult<Transaction> {
    debug!("{} delaying {}ms to transact {}", step.label, step.delay_ms, step.amount);
    thread::sleep(step.delay());
    let tx = if step.amount > 0 {
        bank.deposit(&step.label, step.amount)?
    } else {
        bank.withdraw(&step.label, -step.amount)?
    };
    debug!("{} done", step.label);
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BankError;

    #[test]
    fn test_report_rendering() {
        let config = ScenarioConfig {
            key: "unused".to_string(),
            initial_balance: 100,
            steps: vec![ScenarioStep::new("a", 0, -40)],
        };
        let report = run_with_key(&config, SemKey::private()).unwrap();
        assert_eq!(report.final_account.balance, 60);

        let text = report.to_string();
        assert!(text.contains("withdrew"));
        assert!(text.ends_with("final balance 60"));

        let lines = report.to_json_lines().unwrap();
        assert_eq!(lines.lines().count(), 2);
        assert!(lines.contains("\"kind\":\"withdrawal\""));
    }

    #[test]
    fn test_run_scenario_rejects_invalid_config() {
        let config = ScenarioConfig {
            key: String::new(),
            initial_balance: 0,
            steps: vec![ScenarioStep::new("a", 0, 5)],
        };
        let err = run_scenario(&config).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_failing_step_is_reported_while_others_are_parked() {
        // "w" parks on funds, "bad" fails validation, and "late" eventually
        // covers "w" so the abandoned thread finishes on its own.
        let config = ScenarioConfig {
            key: "unused".to_string(),
            initial_balance: 0,
            steps: vec![
                ScenarioStep::new("w", 0, -10),
                ScenarioStep::new("bad", 20, 0),
                ScenarioStep::new("late", 300, 10),
            ],
        };
        let err = run_with_key(&config, SemKey::private()).unwrap_err();
        assert!(matches!(
            err,
            SemmonError::Bank(BankError::InvalidAmount { amount: 0 })
        ));

        // Let "late" release "w" so the monitor is dropped before the test exits.
        thread::sleep(std::time::Duration::from_millis(600));
    }
}

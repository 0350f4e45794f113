//! Savings account on top of a monitor.
//!
//! Withdrawals that cannot be covered record the shortfall in `needed` and
//! wait on [`FUNDS_AVAILABLE`]. Deposits reduce the shortfall and signal once
//! it is covered. While a shortfall is outstanding, later withdrawals queue on
//! [`NO_SHORTFALL`] so the earlier one is served first.
//!
//! Only one shortfall is tracked at a time. With several withdrawals short of
//! funds at once, the scalar `needed` describes whichever of them reached the
//! funds check last; the others are released one by one through the
//! `NO_SHORTFALL` chain.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::BankError;
use crate::monitor::{Monitor, MonitorGuard};
use crate::sem::SemKey;

/// Condition A: the outstanding shortfall has been covered.
pub const FUNDS_AVAILABLE: usize = 0;
/// Condition B: no withdrawal is waiting for funds.
pub const NO_SHORTFALL: usize = 1;

const CONDITIONS: usize = 2;

/// The payload protected by the bank's monitor. Amounts are in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsAccount {
    /// Current balance.
    pub balance: i64,
    /// Amount still missing for the withdrawal waiting on funds, or 0.
    pub needed: i64,
    /// Number of completed transactions.
    pub sequence: u64,
}

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Money in.
    Deposit,
    /// Money out.
    Withdrawal,
}

/// Record of a completed transaction, taken inside the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller-supplied label, usually the thread name.
    pub label: String,
    /// Deposit or withdrawal.
    pub kind: TransactionKind,
    /// Amount moved, always positive.
    pub amount: i64,
    /// Balance right after the money moved.
    pub balance_after: i64,
    /// Position of this transaction in the account's history, starting at 1.
    pub sequence: u64,
    /// The withdrawal queued behind an outstanding shortfall.
    pub waited_for_turn: bool,
    /// The withdrawal waited for a deposit to cover it.
    pub waited_for_funds: bool,
    /// This transaction woke another one.
    pub signaled: bool,
    /// When the money moved.
    pub completed_at: DateTime<Utc>,
}

/// A savings account shared between threads.
#[derive(Debug)]
pub struct Bank {
    monitor: Monitor<SavingsAccount>,
}

impl Bank {
    /// Creates the account's monitor under `key`.
    ///
    /// # Errors
    /// Returns `BankError::Monitor` if the semaphore set cannot be allocated.
    pub fn open(key: SemKey, initial_balance: i64) -> Result<Self, BankError> {
        let account = SavingsAccount {
            balance: initial_balance,
            ..SavingsAccount::default()
        };
        let monitor = Monitor::create(key, CONDITIONS, account)?;
        Ok(Self { monitor })
    }

    /// Withdraws `amount`, blocking until the balance covers it.
    ///
    /// # Errors
    /// Returns `BankError::InvalidAmount` if `amount` is not positive.
    pub fn withdraw(&self, label: &str, amount: i64) -> Result<Transaction, BankError> {
        validate(amount)?;
        let mut account = self.monitor.enter();

        let mut waited_for_turn = false;
        if account.needed > 0 {
            info!("{label} withdrawal of {amount} waiting on B. Balance {}", account.balance);
            waited_for_turn = true;
            account.cond_wait(NO_SHORTFALL);
        }

        let mut waited_for_funds = false;
        if account.balance < amount {
            account.needed = amount - account.balance;
            info!("{label} withdrawal of {amount} waiting on A. Balance {}", account.balance);
            waited_for_funds = true;
            account.cond_wait(FUNDS_AVAILABLE);
        }

        account.balance -= amount;
        info!("{label} withdrew {amount}. Balance {}", account.balance);

        let signaled = account.waiting_on(NO_SHORTFALL) > 0;
        let mut tx = record(&mut account, label, TransactionKind::Withdrawal, amount);
        tx.waited_for_turn = waited_for_turn;
        tx.waited_for_funds = waited_for_funds;
        tx.signaled = signaled;

        debug!("{label} signaling B");
        account.cond_signal(NO_SHORTFALL);
        account.leave();
        Ok(tx)
    }

    /// Deposits `amount`, waking the waiting withdrawal if this covers it.
    ///
    /// # Errors
    /// - `BankError::InvalidAmount` if `amount` is not positive
    /// - `BankError::Overflow` if the balance cannot hold the deposit; the
    ///   account is left unchanged
    pub fn deposit(&self, label: &str, amount: i64) -> Result<Transaction, BankError> {
        validate(amount)?;
        let mut account = self.monitor.enter();

        let Some(balance) = account.balance.checked_add(amount) else {
            return Err(BankError::Overflow {
                balance: account.balance,
                amount,
            });
        };
        account.balance = balance;
        info!("{label} deposited {amount}. Balance {}", account.balance);
        let mut tx = record(&mut account, label, TransactionKind::Deposit, amount);

        if account.needed > 0 {
            if amount >= account.needed {
                account.needed = 0;
                tx.signaled = account.waiting_on(FUNDS_AVAILABLE) > 0;
                debug!("{label} signaling A");
                account.cond_signal(FUNDS_AVAILABLE);
            } else {
                account.needed -= amount;
            }
        }

        account.leave();
        Ok(tx)
    }

    /// Copy of the account taken inside the monitor.
    #[must_use]
    pub fn snapshot(&self) -> SavingsAccount {
        *self.monitor.enter()
    }

    /// The monitor guarding the account.
    #[must_use]
    pub const fn monitor(&self) -> &Monitor<SavingsAccount> {
        &self.monitor
    }

    /// Destroys the monitor and returns the final account.
    #[must_use]
    pub fn close(self) -> SavingsAccount {
        self.monitor.into_inner()
    }
}

fn validate(amount: i64) -> Result<(), BankError> {
    if amount <= 0 {
        return Err(BankError::InvalidAmount { amount });
    }
    Ok(())
}

fn record(
    account: &mut MonitorGuard<'_, SavingsAccount>,
    label: &str,
    kind: TransactionKind,
    amount: i64,
) -> Transaction {
    account.sequence += 1;
    Transaction {
        label: label.to_string(),
        kind,
        amount,
        balance_after: account.balance,
        sequence: account.sequence,
        waited_for_turn: false,
        waited_for_funds: false,
        signaled: false,
        completed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_then_withdraw_without_waiting() {
        let bank = Bank::open(SemKey::private(), 10).unwrap();

        let dep = bank.deposit("d", 40).unwrap();
        assert_eq!(dep.kind, TransactionKind::Deposit);
        assert_eq!(dep.balance_after, 50);
        assert_eq!(dep.sequence, 1);
        assert!(!dep.signaled);

        let wd = bank.withdraw("w", 30).unwrap();
        assert_eq!(wd.kind, TransactionKind::Withdrawal);
        assert_eq!(wd.balance_after, 20);
        assert_eq!(wd.sequence, 2);
        assert!(!wd.waited_for_turn);
        assert!(!wd.waited_for_funds);
        assert!(!wd.signaled);

        let account = bank.close();
        assert_eq!(account.balance, 20);
        assert_eq!(account.needed, 0);
    }

    #[test]
    fn test_rejects_non_positive_amounts() {
        let bank = Bank::open(SemKey::private(), 0).unwrap();
        assert!(matches!(
            bank.deposit("d", 0),
            Err(BankError::InvalidAmount { amount: 0 })
        ));
        assert!(matches!(
            bank.withdraw("w", -3),
            Err(BankError::InvalidAmount { amount: -3 })
        ));
        // A rejected call never enters the monitor.
        assert!(bank.monitor().state().unwrap().is_idle());
        assert_eq!(bank.snapshot().sequence, 0);
    }

    #[test]
    fn test_partial_deposit_reduces_shortfall_only_when_outstanding() {
        let bank = Bank::open(SemKey::private(), 0).unwrap();
        bank.deposit("d", 5).unwrap();
        assert_eq!(bank.snapshot().needed, 0);
    }

    #[test]
    fn test_overflowing_deposit_leaves_account_untouched() {
        let bank = Bank::open(SemKey::private(), i64::MAX).unwrap();
        let err = bank.deposit("d", 1).unwrap_err();
        assert!(matches!(
            err,
            BankError::Overflow {
                balance: i64::MAX,
                amount: 1
            }
        ));

        // The monitor was released on the error path.
        assert!(bank.monitor().state().unwrap().is_idle());
        let account = bank.snapshot();
        assert_eq!(account.balance, i64::MAX);
        assert_eq!(account.sequence, 0);

        let tx = bank.withdraw("w", 1).unwrap();
        assert_eq!(tx.balance_after, i64::MAX - 1);
    }

    #[test]
    fn test_transaction_serializes_kind_in_snake_case() {
        let bank = Bank::open(SemKey::private(), 0).unwrap();
        let tx = bank.deposit("d", 1).unwrap();
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"kind\":\"deposit\""));
    }
}

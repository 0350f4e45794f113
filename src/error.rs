//! Error types for semmon.
//!
//! All errors are strongly typed using thiserror. Semaphore failures carry
//! the OS error that caused them so callers can report the exact errno.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::sem::SemKey;

/// Errors raised by the semaphore set layer.
#[derive(Debug, Error)]
pub enum SemError {
    #[error("Failed to derive IPC key from {path:?}: {source}")]
    KeyDerivation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to allocate semaphore set for key {key}: {source}")]
    Allocation {
        key: SemKey,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open semaphore set for key {key}: {source}")]
    Open {
        key: SemKey,
        #[source]
        source: io::Error,
    },

    #[error("Semaphore set size {count} is invalid (expected 1..={max})")]
    InvalidCount {
        count: usize,
        max: usize,
    },

    #[error("Semaphore index {index} is out of range for a set of {count}")]
    IndexOutOfRange {
        index: usize,
        count: usize,
    },

    #[error("Semaphore {op} on index {index} failed: {source}")]
    Operation {
        op: &'static str,
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("Failed to delete semaphore set {id}: {source}")]
    Cleanup {
        id: i32,
        #[source]
        source: io::Error,
    },
}

impl SemError {
    /// Returns true if the set could not be created because its key is taken.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Allocation { source, .. } if source.kind() == io::ErrorKind::AlreadyExists
        )
    }
}

/// Errors raised by the reference bank consumer.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("Transaction amount must be positive, got {amount}")]
    InvalidAmount {
        amount: i64,
    },

    #[error("Depositing {amount} would overflow the balance of {balance}")]
    Overflow {
        balance: i64,
        amount: i64,
    },

    #[error("Monitor error: {0}")]
    Monitor(#[from] SemError),
}

/// Errors raised while loading or validating a scenario.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read scenario {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid scenario: {reason}")]
    Invalid {
        reason: String,
    },
}

/// Top-level error type for semmon.
#[derive(Debug, Error)]
pub enum SemmonError {
    #[error("Semaphore error: {0}")]
    Semaphore(#[from] SemError),

    #[error("Bank error: {0}")]
    Bank(#[from] BankError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SemmonError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a semaphore error.
    #[must_use]
    pub const fn is_semaphore(&self) -> bool {
        matches!(self, Self::Semaphore(_))
    }

    /// Returns true if this is a bank error.
    #[must_use]
    pub const fn is_bank(&self) -> bool {
        matches!(self, Self::Bank(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for semmon operations.
pub type SemmonResult<T> = Result<T, SemmonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_error_reports_key() {
        let err = SemError::Allocation {
            key: SemKey::from_raw(0x1234),
            source: io::Error::from(io::ErrorKind::AlreadyExists),
        };
        let msg = format!("{err}");
        assert!(msg.contains("0x00001234"));
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_operation_error_is_not_already_exists() {
        let err = SemError::Operation {
            op: "wait",
            index: 3,
            source: io::Error::from_raw_os_error(libc::EIDRM),
        };
        let msg = format!("{err}");
        assert!(msg.contains("wait"));
        assert!(msg.contains("index 3"));
        assert!(!err.is_already_exists());
    }

    #[test]
    fn test_invalid_amount() {
        let err = BankError::InvalidAmount { amount: -5 };
        let msg = format!("{err}");
        assert!(msg.contains("-5"));
    }

    #[test]
    fn test_overflow_reports_both_amounts() {
        let err = BankError::Overflow {
            balance: i64::MAX,
            amount: 1,
        };
        let msg = format!("{err}");
        assert!(msg.contains(&i64::MAX.to_string()));
        assert!(msg.contains("Depositing 1"));
    }

    #[test]
    fn test_top_level_conversions() {
        let sem = SemError::InvalidCount { count: 0, max: 250 };
        let err: SemmonError = sem.into();
        assert!(err.is_semaphore());
        assert!(!err.is_bank());

        let err: SemmonError = ConfigError::Invalid {
            reason: "no steps".to_string(),
        }
        .into();
        assert!(err.is_config());
        assert!(format!("{err}").contains("no steps"));

        let err = SemmonError::internal("boom");
        assert!(err.is_internal());
    }
}

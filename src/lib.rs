//! # semmon - Hoare monitors from System V semaphores
//!
//! semmon builds a monitor (a mutual-exclusion region with condition
//! variables) out of nothing but counting semaphores. Condition variables
//! follow Hoare's signal-and-wait discipline: a signaler hands the region
//! straight to the thread it woke and parks in an urgent queue, which is
//! served before any thread that is merely waiting to enter.
//!
//! ## Layers
//!
//! - **sem**: System V semaphore sets, addressed by an IPC key
//! - **monitor**: the monitor state machine and its scoped guard
//! - **bank**: a savings account that waits for funds, the reference consumer
//! - **scenario**: deterministic multi-threaded bank runs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::thread;
//!
//! use semmon::{Monitor, SemKey};
//!
//! const READY: usize = 0;
//!
//! let monitor = Arc::new(Monitor::create(SemKey::private(), 1, None::<u32>)?);
//!
//! let consumer = {
//!     let monitor = Arc::clone(&monitor);
//!     thread::spawn(move || {
//!         let mut slot = monitor.enter();
//!         if slot.is_none() {
//!             slot.cond_wait(READY);
//!         }
//!         slot.take()
//!     })
//! };
//!
//! let mut slot = monitor.enter();
//! *slot = Some(42);
//! slot.cond_signal(READY);
//! slot.leave();
//!
//! assert_eq!(consumer.join().unwrap(), Some(42));
//! # Ok::<(), semmon::SemError>(())
//! ```

#![cfg(unix)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bank;
pub mod error;
pub mod monitor;
pub mod scenario;
pub mod sem;

// Re-export primary types at crate root for convenience
pub use bank::{Bank, SavingsAccount, Transaction, TransactionKind, FUNDS_AVAILABLE, NO_SHORTFALL};
pub use error::{BankError, ConfigError, SemError, SemmonError, SemmonResult};
pub use monitor::{Monitor, MonitorGuard, MonitorState, Occupancy, MAX_CONDITIONS};
pub use scenario::{run_scenario, ScenarioConfig, ScenarioReport, ScenarioStep};
pub use sem::{SemKey, SemaphoreSet, MAX_SET_SIZE};

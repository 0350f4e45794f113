//! Hoare monitors built from counting semaphores.
//!
//! A monitor pairs a mutual-exclusion region with condition variables that
//! follow signal-and-wait semantics: a signaler parks in an urgent queue and
//! regains the region before any thread that is merely waiting to enter.

mod hoare;
/// Scoped region guard.
pub mod guard;
/// Queue snapshots.
pub mod state;

pub use hoare::{Monitor, MAX_CONDITIONS};
pub use guard::MonitorGuard;
pub use state::{MonitorState, Occupancy};

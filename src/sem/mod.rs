//! Counting semaphores backed by System V semaphore sets.
//!
//! This is the only layer that talks to the kernel. Everything above it is
//! built from `wait` and `signal` on indexed semaphores.

mod key;
mod set;

pub use key::SemKey;
pub use set::{SemaphoreSet, MAX_SET_SIZE};

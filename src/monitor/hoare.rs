//! The monitor state machine.
//!
//! A monitor owns one semaphore set laid out as:
//!
//! | index   | semaphore      | initial |
//! |---------|----------------|---------|
//! | 0       | mutex          | 1       |
//! | 1       | urgent queue   | 0       |
//! | 2 + i   | condition `i`  | 0       |
//!
//! `next_count` and `wait_count[i]` are ordinary integers. They are only read
//! or written by the thread that holds the protected region; the semaphore
//! operation that hands the region over orders those accesses.

use std::cell::UnsafeCell;

use log::{error, trace};

use crate::error::SemError;
use crate::sem::{SemKey, SemaphoreSet, MAX_SET_SIZE};

use super::guard::MonitorGuard;
use super::state::{MonitorState, Occupancy};

pub(crate) const MUTEX: usize = 0;
pub(crate) const URGENT: usize = 1;
const RESERVED: usize = 2;

/// Largest number of condition variables a single monitor can carry.
pub const MAX_CONDITIONS: usize = MAX_SET_SIZE - RESERVED;

#[derive(Debug)]
struct Counters {
    next_count: usize,
    wait_count: Vec<usize>,
}

/// A Hoare monitor protecting a payload of type `T`.
///
/// Share it between threads with `Arc<Monitor<T>>`. The payload is only
/// reachable through a [`MonitorGuard`], which exists exactly while the
/// caller holds the protected region.
///
/// Deleting or dropping the monitor while any thread is inside it or blocked
/// on one of its queues is a caller error.
#[derive(Debug)]
pub struct Monitor<T> {
    sems: SemaphoreSet,
    counters: UnsafeCell<Counters>,
    payload: UnsafeCell<T>,
}

// SAFETY: `counters` and `payload` are only accessed by the thread holding the
// protected region, which the mutex and urgent semaphores make exclusive.
unsafe impl<T: Send> Sync for Monitor<T> {}

impl<T> Monitor<T> {
    /// Creates a monitor with `condition_count` condition variables around
    /// `payload`.
    ///
    /// # Errors
    /// - `SemError::InvalidCount` if `condition_count` exceeds [`MAX_CONDITIONS`]
    /// - `SemError::Allocation` if the semaphore set cannot be created, e.g.
    ///   a set for `key` already exists
    pub fn create(key: SemKey, condition_count: usize, payload: T) -> Result<Self, SemError> {
        if condition_count > MAX_CONDITIONS {
            return Err(SemError::InvalidCount {
                count: condition_count + RESERVED,
                max: MAX_SET_SIZE,
            });
        }

        let mut values = vec![0u16; RESERVED + condition_count];
        values[MUTEX] = 1;
        let sems = SemaphoreSet::create(key, &values)?;

        Ok(Self {
            sems,
            counters: UnsafeCell::new(Counters {
                next_count: 0,
                wait_count: vec![0; condition_count],
            }),
            payload: UnsafeCell::new(payload),
        })
    }

    /// Blocks until the caller exclusively holds the protected region.
    ///
    /// The region is released when the returned guard is dropped or
    /// [`MonitorGuard::leave`] is called.
    pub fn enter(&self) -> MonitorGuard<'_, T> {
        self.check(self.sems.wait(MUTEX));
        trace!("monitor {}: entered", self.key());
        MonitorGuard::new(self)
    }

    /// Runs `f` inside the protected region.
    pub fn with<R>(&self, f: impl FnOnce(&mut MonitorGuard<'_, T>) -> R) -> R {
        let mut guard = self.enter();
        f(&mut guard)
    }

    /// The key of the underlying semaphore set.
    #[must_use]
    pub const fn key(&self) -> SemKey {
        self.sems.key()
    }

    /// Number of condition variables.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.sems.len() - RESERVED
    }

    /// Snapshot of who holds or waits on the monitor, read from the kernel's
    /// per-semaphore counters.
    ///
    /// The snapshot is racy by nature: threads keep moving while it is taken.
    /// It is meant for diagnostics and for tests that wait for a thread to
    /// park somewhere.
    ///
    /// # Errors
    /// Returns `SemError::Operation` if the kernel counters cannot be read.
    pub fn state(&self) -> Result<MonitorState, SemError> {
        let occupancy = if self.sems.value(MUTEX)? == 1 {
            Occupancy::Idle
        } else {
            Occupancy::Occupied
        };
        let entry_waiters = self.sems.waiting(MUTEX)?;
        let urgent_waiters = self.sems.waiting(URGENT)?;
        let condition_waiters = (0..self.condition_count())
            .map(|cond| self.sems.waiting(RESERVED + cond))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MonitorState {
            occupancy,
            entry_waiters,
            urgent_waiters,
            condition_waiters,
        })
    }

    /// Direct access to the payload when no other thread can reach the monitor.
    pub fn get_mut(&mut self) -> &mut T {
        self.payload.get_mut()
    }

    /// Destroys the underlying semaphore set.
    ///
    /// # Errors
    /// Returns `SemError::Cleanup` if the kernel refuses the removal. The
    /// failure is also logged; it is safe to ignore.
    pub fn delete(self) -> Result<(), SemError> {
        self.sems.delete()
    }

    /// Destroys the underlying semaphore set and returns the payload.
    pub fn into_inner(self) -> T {
        let Self { sems, payload, .. } = self;
        // Cleanup failures are logged by delete() and never fatal.
        let _ = sems.delete();
        payload.into_inner()
    }

    /// Hands the region to the urgent queue if a signaler is parked there,
    /// otherwise to the next entrant.
    pub(super) fn release(&self) {
        // SAFETY: only called by the thread holding the region.
        let next_count = unsafe { self.counters().next_count };
        if next_count > 0 {
            trace!("monitor {}: handing off to urgent queue ({next_count} parked)", self.key());
            self.check(self.sems.signal(URGENT));
        } else {
            trace!("monitor {}: released", self.key());
            self.check(self.sems.signal(MUTEX));
        }
    }

    /// # Safety
    /// The caller must hold the protected region.
    pub(super) unsafe fn cond_wait(&self, cond: usize) {
        let index = self.condition_index(cond);

        self.counters().wait_count[cond] += 1;
        trace!("monitor {}: waiting on condition {cond}", self.key());
        self.release();
        self.check(self.sems.wait(index));
        self.counters().wait_count[cond] -= 1;
        trace!("monitor {}: resumed on condition {cond}", self.key());
    }

    /// # Safety
    /// The caller must hold the protected region.
    pub(super) unsafe fn cond_signal(&self, cond: usize) {
        let index = self.condition_index(cond);

        if self.counters().wait_count[cond] == 0 {
            trace!("monitor {}: signal on condition {cond} with no waiters", self.key());
            return;
        }

        self.counters().next_count += 1;
        trace!("monitor {}: signaling condition {cond}", self.key());
        self.check(self.sems.signal(index));
        self.check(self.sems.wait(URGENT));
        self.counters().next_count -= 1;
        trace!("monitor {}: signaler resumed from urgent queue", self.key());
    }

    /// # Safety
    /// The caller must hold the protected region.
    pub(super) unsafe fn waiting_on(&self, cond: usize) -> usize {
        self.condition_index(cond);
        self.counters().wait_count[cond]
    }

    /// # Safety
    /// The caller must hold the protected region.
    pub(super) unsafe fn urgent_count(&self) -> usize {
        self.counters().next_count
    }

    pub(super) fn payload(&self) -> *mut T {
        self.payload.get()
    }

    /// # Safety
    /// The caller must hold the protected region and must not keep the
    /// reference across a semaphore wait.
    #[allow(clippy::mut_from_ref)]
    unsafe fn counters(&self) -> &mut Counters {
        &mut *self.counters.get()
    }

    fn condition_index(&self, cond: usize) -> usize {
        let count = self.condition_count();
        assert!(cond < count, "condition {cond} out of range for a monitor with {count} conditions");
        RESERVED + cond
    }

    fn check(&self, result: Result<(), SemError>) {
        if let Err(err) = result {
            fatal(self.key(), &err);
        }
    }
}

/// A failed semaphore operation leaves the exclusion and condition invariants
/// unknowable, so the process cannot safely continue.
#[cold]
fn fatal(key: SemKey, err: &SemError) -> ! {
    error!("monitor {key}: {err}; aborting");
    eprintln!("monitor {key}: {err}; aborting");
    std::process::abort()
}

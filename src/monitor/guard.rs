//! Scoped proof of holding a monitor's protected region.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use super::hoare::Monitor;

/// Exclusive access to a monitor's payload.
///
/// Returned by [`Monitor::enter`]. Dropping the guard leaves the monitor,
/// handing the region to a parked signaler before any new entrant.
pub struct MonitorGuard<'a, T> {
    monitor: &'a Monitor<T>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> MonitorGuard<'a, T> {
    pub(super) fn new(monitor: &'a Monitor<T>) -> Self {
        Self {
            monitor,
            _not_send: PhantomData,
        }
    }

    /// The monitor this guard belongs to.
    #[must_use]
    pub fn monitor(&self) -> &'a Monitor<T> {
        self.monitor
    }

    /// Shared access to the payload.
    #[must_use]
    pub fn data(&self) -> &T {
        self
    }

    /// Mutable access to the payload.
    pub fn data_mut(&mut self) -> &mut T {
        self
    }

    /// Leaves the monitor.
    pub fn leave(self) {
        drop(self);
    }

    /// Blocks on condition `cond` until another thread signals it.
    ///
    /// The region is released while blocked and held again when this
    /// returns. The signaler stays parked until this thread leaves or blocks
    /// again, so the state that justified the signal is still in place.
    ///
    /// # Panics
    /// Panics if `cond` is not a valid condition index.
    pub fn cond_wait(&mut self, cond: usize) {
        // SAFETY: the guard proves this thread holds the region.
        unsafe { self.monitor.cond_wait(cond) }
    }

    /// Wakes one thread blocked on condition `cond` and parks the caller in
    /// the urgent queue until that thread leaves or blocks.
    ///
    /// Signaling a condition nobody waits on does nothing and returns
    /// immediately.
    ///
    /// # Panics
    /// Panics if `cond` is not a valid condition index.
    pub fn cond_signal(&mut self, cond: usize) {
        // SAFETY: the guard proves this thread holds the region.
        unsafe { self.monitor.cond_signal(cond) }
    }

    /// Number of threads blocked on condition `cond`.
    ///
    /// # Panics
    /// Panics if `cond` is not a valid condition index.
    #[must_use]
    pub fn waiting_on(&self, cond: usize) -> usize {
        // SAFETY: the guard proves this thread holds the region.
        unsafe { self.monitor.waiting_on(cond) }
    }

    /// Number of signalers parked in the urgent queue.
    #[must_use]
    pub fn urgent_count(&self) -> usize {
        // SAFETY: the guard proves this thread holds the region.
        unsafe { self.monitor.urgent_count() }
    }
}

impl<T> Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves this thread holds the region.
        unsafe { &*self.monitor.payload() }
    }
}

impl<T> DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves this thread holds the region.
        unsafe { &mut *self.monitor.payload() }
    }
}

impl<T> Drop for MonitorGuard<'_, T> {
    fn drop(&mut self) {
        self.monitor.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for MonitorGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorGuard")
            .field("key", &self.monitor.key())
            .field("data", self.data())
            .finish()
    }
}

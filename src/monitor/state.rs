//! Observable monitor state.

/// Whether some thread currently holds the protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    /// Nobody holds the region; the next `enter` succeeds immediately.
    Idle,
    /// A thread is inside, or the region is being handed to a parked signaler.
    Occupied,
}

/// Snapshot of a monitor's queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorState {
    /// Whether the region is held.
    pub occupancy: Occupancy,
    /// Threads blocked in `enter`.
    pub entry_waiters: usize,
    /// Signalers parked in the urgent queue.
    pub urgent_waiters: usize,
    /// Threads blocked on each condition, by index.
    pub condition_waiters: Vec<usize>,
}

impl MonitorState {
    /// Returns true if nobody holds the region.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.occupancy == Occupancy::Idle
    }

    /// Total number of threads blocked anywhere in the monitor.
    #[must_use]
    pub fn blocked(&self) -> usize {
        self.entry_waiters + self.urgent_waiters + self.condition_waiters.iter().sum::<usize>()
    }
}

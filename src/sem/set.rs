//! System V semaphore sets.
//!
//! A `SemaphoreSet` is a handle to a kernel-owned group of counting
//! semaphores. The handle that created the set owns it: dropping the owner
//! removes the set, so every unwinding exit path releases the OS resource.
//! Handles obtained with `open` only borrow the set.
//!
//! # Safety
//! - Deletion is guarded: `IPC_RMID` is issued at most once per handle, so a
//!   recycled id belonging to another key is never removed by a late call.
//! - Interrupted waits (`EINTR`) are retried.

use std::io;
use std::sync::atomic::{fence, AtomicBool, Ordering};

use log::{debug, warn};

use crate::error::SemError;

use super::key::SemKey;

/// Largest set this crate will allocate (the historical `SEMMSL` default).
pub const MAX_SET_SIZE: usize = 250;

const PERMISSIONS: libc::c_int = 0o660;

/// A handle to a System V semaphore set.
#[derive(Debug)]
pub struct SemaphoreSet {
    id: libc::c_int,
    key: SemKey,
    count: usize,
    owner: bool,
    removed: AtomicBool,
}

impl SemaphoreSet {
    /// Creates a new set with one semaphore per entry of `initial_values`.
    ///
    /// Fails if a set already exists for `key` (the key must be free) or the
    /// kernel refuses the allocation. This is a startup precondition and is
    /// never retried.
    ///
    /// # Errors
    /// - `SemError::InvalidCount` if `initial_values` is empty or too large
    /// - `SemError::Allocation` if the kernel rejects `semget` or `SETALL`
    pub fn create(key: SemKey, initial_values: &[u16]) -> Result<Self, SemError> {
        let count = initial_values.len();
        if count == 0 || count > MAX_SET_SIZE {
            return Err(SemError::InvalidCount {
                count,
                max: MAX_SET_SIZE,
            });
        }

        let flags = libc::IPC_CREAT | libc::IPC_EXCL | PERMISSIONS;
        let id = unsafe { libc::semget(key.raw(), count as libc::c_int, flags) };
        if id == -1 {
            return Err(SemError::Allocation {
                key,
                source: io::Error::last_os_error(),
            });
        }

        let mut values = initial_values.to_vec();
        let rc = unsafe { libc::semctl(id, 0, libc::SETALL, values.as_mut_ptr()) };
        if rc == -1 {
            let source = io::Error::last_os_error();
            unsafe {
                libc::semctl(id, 0, libc::IPC_RMID);
            }
            return Err(SemError::Allocation { key, source });
        }

        debug!("created semaphore set {id} for key {key} with values {initial_values:?}");

        Ok(Self {
            id,
            key,
            count,
            owner: true,
            removed: AtomicBool::new(false),
        })
    }

    /// Attaches to a set another participant created for `key`.
    ///
    /// The returned handle does not own the set; dropping it leaves the set
    /// in place.
    ///
    /// # Errors
    /// - `SemError::InvalidCount` if `count` is zero or too large
    /// - `SemError::Open` if no set exists for `key` or it has fewer than
    ///   `count` semaphores
    pub fn open(key: SemKey, count: usize) -> Result<Self, SemError> {
        if count == 0 || count > MAX_SET_SIZE {
            return Err(SemError::InvalidCount {
                count,
                max: MAX_SET_SIZE,
            });
        }

        let id = unsafe { libc::semget(key.raw(), count as libc::c_int, 0) };
        if id == -1 {
            return Err(SemError::Open {
                key,
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self {
            id,
            key,
            count,
            owner: false,
            removed: AtomicBool::new(false),
        })
    }

    /// Removes a set left behind for `key` by a run that never cleaned up.
    ///
    /// Returns `Ok(false)` if no such set exists.
    ///
    /// # Errors
    /// Returns `SemError::Open` or `SemError::Cleanup` if the set exists but
    /// cannot be removed (for instance, it belongs to another user).
    pub fn remove_existing(key: SemKey) -> Result<bool, SemError> {
        if key.is_private() {
            return Ok(false);
        }

        let id = unsafe { libc::semget(key.raw(), 0, 0) };
        if id == -1 {
            let source = io::Error::last_os_error();
            if source.kind() == io::ErrorKind::NotFound {
                return Ok(false);
            }
            return Err(SemError::Open { key, source });
        }

        if unsafe { libc::semctl(id, 0, libc::IPC_RMID) } == -1 {
            return Err(SemError::Cleanup {
                id,
                source: io::Error::last_os_error(),
            });
        }

        debug!("removed stale semaphore set {id} for key {key}");
        Ok(true)
    }

    /// The key this set was created or opened with.
    #[must_use]
    pub const fn key(&self) -> SemKey {
        self.key
    }

    /// The kernel identifier of this set.
    #[must_use]
    pub const fn id(&self) -> libc::c_int {
        self.id
    }

    /// Number of semaphores addressable through this handle.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Always false: sets hold at least one semaphore.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if this handle removes the set when dropped.
    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.owner
    }

    /// Returns true once `delete` has run through this handle.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Decrements semaphore `index`, blocking while its value is zero.
    ///
    /// # Errors
    /// Returns `SemError::Operation` if `semop` fails (for example, the set was
    /// removed underneath the caller).
    pub fn wait(&self, index: usize) -> Result<(), SemError> {
        self.semop("wait", index, -1)?;
        fence(Ordering::Acquire);
        Ok(())
    }

    /// Increments semaphore `index`, waking at most one blocked waiter.
    ///
    /// # Errors
    /// Returns `SemError::Operation` if `semop` fails.
    pub fn signal(&self, index: usize) -> Result<(), SemError> {
        fence(Ordering::Release);
        self.semop("signal", index, 1)
    }

    /// Blocks until semaphore `index` is exactly zero.
    ///
    /// # Errors
    /// Returns `SemError::Operation` if `semop` fails.
    pub fn wait_zero(&self, index: usize) -> Result<(), SemError> {
        self.semop("wait-zero", index, 0)?;
        fence(Ordering::Acquire);
        Ok(())
    }

    /// Decrements semaphore `index`, then blocks until it drains to zero.
    ///
    /// Every participant that passes the decrement waits for the rest of its
    /// cohort, which turns a semaphore initialised to N into an N-way
    /// rendezvous.
    ///
    /// # Errors
    /// Returns `SemError::Operation` if either `semop` fails.
    pub fn wait_then_zero(&self, index: usize) -> Result<(), SemError> {
        self.semop("wait", index, -1)?;
        self.wait_zero(index)
    }

    /// Current value of semaphore `index`.
    ///
    /// # Errors
    /// Returns `SemError::Operation` if `semctl(GETVAL)` fails.
    pub fn value(&self, index: usize) -> Result<usize, SemError> {
        self.query("get-value", index, libc::GETVAL)
    }

    /// Number of threads blocked decrementing semaphore `index`.
    ///
    /// # Errors
    /// Returns `SemError::Operation` if `semctl(GETNCNT)` fails.
    pub fn waiting(&self, index: usize) -> Result<usize, SemError> {
        self.query("get-ncount", index, libc::GETNCNT)
    }

    /// Number of threads blocked waiting for semaphore `index` to reach zero.
    ///
    /// # Errors
    /// Returns `SemError::Operation` if `semctl(GETZCNT)` fails.
    pub fn zero_waiting(&self, index: usize) -> Result<usize, SemError> {
        self.query("get-zcount", index, libc::GETZCNT)
    }

    /// Removes the set from the kernel.
    ///
    /// Only the first call through a handle issues `IPC_RMID`; later calls are
    /// no-ops. A failed removal is logged and returned, never escalated.
    ///
    /// # Errors
    /// Returns `SemError::Cleanup` if `IPC_RMID` fails (for example, another
    /// participant already removed the set).
    pub fn delete(&self) -> Result<(), SemError> {
        if self.removed.swap(true, Ordering::AcqRel) {
            debug!("semaphore set {} for key {} already deleted", self.id, self.key);
            return Ok(());
        }

        if unsafe { libc::semctl(self.id, 0, libc::IPC_RMID) } == -1 {
            let err = SemError::Cleanup {
                id: self.id,
                source: io::Error::last_os_error(),
            };
            warn!("{err}");
            return Err(err);
        }

        debug!("deleted semaphore set {} for key {}", self.id, self.key);
        Ok(())
    }

    fn index(&self, index: usize) -> Result<libc::c_ushort, SemError> {
        if index >= self.count {
            return Err(SemError::IndexOutOfRange {
                index,
                count: self.count,
            });
        }
        // count <= MAX_SET_SIZE, so the index always fits.
        Ok(index as libc::c_ushort)
    }

    fn semop(&self, op: &'static str, index: usize, delta: libc::c_short) -> Result<(), SemError> {
        let mut buf = libc::sembuf {
            sem_num: self.index(index)?,
            sem_op: delta,
            sem_flg: 0,
        };

        loop {
            if unsafe { libc::semop(self.id, &mut buf, 1) } == 0 {
                return Ok(());
            }
            let source = io::Error::last_os_error();
            if source.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(SemError::Operation { op, index, source });
        }
    }

    fn query(&self, op: &'static str, index: usize, cmd: libc::c_int) -> Result<usize, SemError> {
        let num = libc::c_int::from(self.index(index)?);
        let rc = unsafe { libc::semctl(self.id, num, cmd) };
        if rc < 0 {
            return Err(SemError::Operation {
                op,
                index,
                source: io::Error::last_os_error(),
            });
        }
        Ok(rc as usize)
    }
}

impl Drop for SemaphoreSet {
    fn drop(&mut self) {
        if self.owner && !self.is_deleted() {
            // Best-effort: failures are already logged by delete().
            let _ = self.delete();
        }
    }
}

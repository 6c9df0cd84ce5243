use super::raw::{RawAcquire, RawLock};
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;

use tracing::warn;

/// Outcome of acquiring a [`RobustLock`].
#[derive(Debug)]
pub enum Acquire<'a, T> {
    /// The lock was free and consistent.
    Clean(LockGuard<'a, T>),

    /// The previous holder terminated while holding the lock.
    /// The lock has already been marked consistent again.
    Recovered(LockGuard<'a, T>),

    /// Another thread holds the lock (only returned by [`RobustLock::try_acquire`]).
    WouldBlock,
}

impl<'a, T> Acquire<'a, T> {
    /// Returns the guard if the lock was acquired.
    pub fn into_guard(self) -> Option<LockGuard<'a, T>> {
        match self {
            Acquire::Clean(guard) | Acquire::Recovered(guard) => Some(guard),
            Acquire::WouldBlock => None,
        }
    }

    /// Returns `true` if acquiring the lock required a consistency recovery.
    pub fn is_recovered(&self) -> bool {
        matches!(self, Acquire::Recovered(_))
    }
}

/// A crash-tolerant, priority-inheriting mutex.
///
/// If a thread exits or panics while holding the lock, the next acquirer receives
/// [`Acquire::Recovered`] and the lock is marked consistent before the guard is handed out.
/// The blocking [`lock`](RobustLock::lock) helper performs that recovery silently.
///
/// On Linux waiters lend their priority to the holder, so a low priority task
/// holding an entity cannot stall a higher priority one indefinitely.
pub struct RobustLock<T> {
    raw: RawLock,
    poisoned: AtomicBool,
    recoveries: AtomicU32,
    value: UnsafeCell<T>,
}

// SAFETY: the value is only reached through a guard, and guards are exclusive
unsafe impl<T: Send> Send for RobustLock<T> {}
unsafe impl<T: Send> Sync for RobustLock<T> {}

impl<T> RobustLock<T> {
    /// Create a new lock protecting `value`.
    pub fn new(value: T) -> Self {
        Self {
            raw: RawLock::new(),
            poisoned: AtomicBool::new(false),
            recoveries: AtomicU32::new(0),
            value: UnsafeCell::new(value),
        }
    }

    /// Block until the lock is acquired.
    pub fn acquire(&self) -> Acquire<'_, T> {
        let acquired = self.raw.lock();
        self.guard(acquired)
    }

    /// Acquire the lock without blocking.
    pub fn try_acquire(&self) -> Acquire<'_, T> {
        let acquired = self.raw.try_lock();
        self.guard(acquired)
    }

    /// Block until the lock is acquired, recovering it if needed.
    /// The lock is released when the guard is dropped.
    pub fn lock(&self) -> LockGuard<'_, T> {
        match self.acquire() {
            Acquire::Clean(guard) | Acquire::Recovered(guard) => guard,
            Acquire::WouldBlock => unreachable!("blocking acquire returned without the lock"),
        }
    }

    /// Number of times this lock was recovered from a terminated holder.
    pub fn recoveries(&self) -> u32 {
        self.recoveries.load(Ordering::Relaxed)
    }

    fn guard(&self, acquired: RawAcquire) -> Acquire<'_, T> {
        let owner_died = match acquired {
            RawAcquire::Busy => return Acquire::WouldBlock,
            RawAcquire::Acquired => false,
            RawAcquire::OwnerDied => true,
        };

        let guard = LockGuard {
            lock: self,
            _owner: PhantomData,
        };
        // Only the holder touches the flag
        if self.poisoned.swap(false, Ordering::Relaxed) || owner_died {
            self.recoveries.fetch_add(1, Ordering::Relaxed);
            warn!("recovered a lock left behind by a terminated holder");
            Acquire::Recovered(guard)
        } else {
            Acquire::Clean(guard)
        }
    }
}

impl<T: Default> Default for RobustLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for RobustLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobustLock")
            .field("recoveries", &self.recoveries())
            .finish_non_exhaustive()
    }
}

impl<T: Copy + Default> RobustLock<T> {
    /// Copy the whole protected value out under the lock.
    pub fn snapshot(&self) -> T {
        *self.lock()
    }

    /// Copy `value` over the protected value under the lock.
    pub fn store(&self, value: &T) {
        *self.lock() = *value;
    }

    /// Zero the protected value under the lock.
    pub fn reset(&self) {
        *self.lock() = T::default();
    }

    /// Zero the protected value without locking.
    ///
    /// Exclusive access proves no other thread can be holding the lock.
    pub fn reset_unlocked(&mut self) {
        *self.value.get_mut() = T::default();
        *self.poisoned.get_mut() = false;
    }
}

/// Exclusive access to the value of a [`RobustLock`], released on drop.
///
/// The guard is tied to the thread that acquired the lock.
pub struct LockGuard<'a, T> {
    lock: &'a RobustLock<T>,
    _owner: PhantomData<*const ()>,
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: fmt::Debug> fmt::Debug for LockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Relaxed);
        }
        // SAFETY: the guard holds the lock
        unsafe { self.lock.raw.unlock() }
    }
}

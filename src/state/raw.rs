//! Raw lock primitive underneath [`RobustLock`](super::RobustLock).
//!
//! On Linux this is a pthread mutex using the priority-inheritance protocol and
//! robust semantics, so a holder that exits without unlocking hands the next
//! acquirer `EOWNERDEAD` instead of a deadlock.

/// Result of acquiring a raw lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawAcquire {
    Acquired,

    /// The previous owner exited while holding the lock. It has been marked consistent.
    OwnerDied,

    Busy,
}

#[cfg(target_os = "linux")]
pub use self::pthread::RawLock;

#[cfg(not(target_os = "linux"))]
pub use self::fallback::RawLock;

#[cfg(target_os = "linux")]
mod pthread {
    use super::RawAcquire;
    use std::cell::UnsafeCell;
    use std::io;
    use std::mem::MaybeUninit;
    use std::ptr;
    use tracing::warn;

    /// Mutex attributes: priority inheritance and robust.
    pub struct MutexAttr(libc::pthread_mutexattr_t);

    impl MutexAttr {
        pub fn robust_inherit() -> io::Result<Self> {
            let mut raw = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();

            // SAFETY: `raw` is initialized by `pthread_mutexattr_init` before it is read
            let mut attr = unsafe {
                check(libc::pthread_mutexattr_init(raw.as_mut_ptr()))?;
                Self(raw.assume_init())
            };

            // SAFETY: `attr.0` is an initialized attribute object
            unsafe {
                check(libc::pthread_mutexattr_setprotocol(
                    &mut attr.0,
                    libc::PTHREAD_PRIO_INHERIT,
                ))?;
                check(libc::pthread_mutexattr_setrobust(
                    &mut attr.0,
                    libc::PTHREAD_MUTEX_ROBUST,
                ))?;
            }
            Ok(attr)
        }

        /// The configured locking protocol (`PTHREAD_PRIO_*`).
        #[cfg(test)]
        pub fn protocol(&self) -> io::Result<libc::c_int> {
            let mut protocol = 0;
            // SAFETY: `self.0` is an initialized attribute object
            check(unsafe { libc::pthread_mutexattr_getprotocol(&self.0, &mut protocol) })?;
            Ok(protocol)
        }

        /// The configured robustness (`PTHREAD_MUTEX_STALLED` or `PTHREAD_MUTEX_ROBUST`).
        #[cfg(test)]
        pub fn robustness(&self) -> io::Result<libc::c_int> {
            let mut robustness = 0;
            // SAFETY: `self.0` is an initialized attribute object
            check(unsafe { libc::pthread_mutexattr_getrobust(&self.0, &mut robustness) })?;
            Ok(robustness)
        }
    }

    impl Drop for MutexAttr {
        fn drop(&mut self) {
            // SAFETY: `self.0` was initialized and is destroyed once
            unsafe {
                libc::pthread_mutexattr_destroy(&mut self.0);
            }
        }
    }

    fn check(code: libc::c_int) -> io::Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(code))
        }
    }

    /// A pthread mutex at a fixed heap address.
    pub struct RawLock {
        mutex: Box<UnsafeCell<libc::pthread_mutex_t>>,
    }

    // SAFETY: pthread mutexes may be locked and unlocked from any thread
    unsafe impl Send for RawLock {}
    unsafe impl Sync for RawLock {}

    impl RawLock {
        pub fn new() -> Self {
            let mutex = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));

            let initialized = MutexAttr::robust_inherit().and_then(|attr| {
                // SAFETY: the mutex is unlocked, unshared and never moves out of its box
                check(unsafe { libc::pthread_mutex_init(mutex.get(), &attr.0) })
            });
            if let Err(error) = initialized {
                warn!(%error, "priority-inheriting robust mutex unavailable, using a default mutex");
                // SAFETY: as above, and a failed init leaves the mutex untouched
                unsafe {
                    libc::pthread_mutex_init(mutex.get(), ptr::null());
                }
            }

            Self { mutex }
        }

        pub fn lock(&self) -> RawAcquire {
            // SAFETY: the mutex is initialized and lives as long as `self`
            let code = unsafe { libc::pthread_mutex_lock(self.mutex.get()) };
            self.acquired(code)
                .unwrap_or_else(|| panic!("pthread_mutex_lock failed: {}", io::Error::from_raw_os_error(code)))
        }

        pub fn try_lock(&self) -> RawAcquire {
            // SAFETY: the mutex is initialized and lives as long as `self`
            let code = unsafe { libc::pthread_mutex_trylock(self.mutex.get()) };
            if code == libc::EBUSY {
                return RawAcquire::Busy;
            }
            self.acquired(code)
                .unwrap_or_else(|| panic!("pthread_mutex_trylock failed: {}", io::Error::from_raw_os_error(code)))
        }

        /// # Safety
        ///
        /// The calling thread must hold the lock.
        pub unsafe fn unlock(&self) {
            libc::pthread_mutex_unlock(self.mutex.get());
        }

        fn acquired(&self, code: libc::c_int) -> Option<RawAcquire> {
            match code {
                0 => Some(RawAcquire::Acquired),
                libc::EOWNERDEAD => {
                    // SAFETY: `EOWNERDEAD` means this thread now holds the lock
                    unsafe {
                        libc::pthread_mutex_consistent(self.mutex.get());
                    }
                    Some(RawAcquire::OwnerDied)
                }
                _ => None,
            }
        }
    }

    impl Drop for RawLock {
        fn drop(&mut self) {
            // SAFETY: `&mut self` proves no guard is alive
            unsafe {
                libc::pthread_mutex_destroy(self.mutex.get());
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod fallback {
    use super::RawAcquire;
    use std::sync::{Condvar, Mutex, PoisonError};

    /// A lock flag guarded by a std mutex, without priority inheritance.
    #[derive(Default)]
    pub struct RawLock {
        locked: Mutex<bool>,
        released: Condvar,
    }

    impl RawLock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lock(&self) -> RawAcquire {
            let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
            while *locked {
                locked = self
                    .released
                    .wait(locked)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            *locked = true;
            RawAcquire::Acquired
        }

        pub fn try_lock(&self) -> RawAcquire {
            let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
            if *locked {
                RawAcquire::Busy
            } else {
                *locked = true;
                RawAcquire::Acquired
            }
        }

        /// # Safety
        ///
        /// The calling thread must hold the lock.
        pub unsafe fn unlock(&self) {
            *self.locked.lock().unwrap_or_else(PoisonError::into_inner) = false;
            self.released.notify_one();
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::pthread::MutexAttr;
    use super::*;

    #[test]
    fn attributes_inherit_priority_and_are_robust() {
        let attr = MutexAttr::robust_inherit().unwrap();
        assert_eq!(attr.protocol().unwrap(), libc::PTHREAD_PRIO_INHERIT);
        assert_eq!(attr.robustness().unwrap(), libc::PTHREAD_MUTEX_ROBUST);
    }

    #[test]
    fn try_lock_reports_busy() {
        let lock = RawLock::new();
        assert_eq!(lock.lock(), RawAcquire::Acquired);

        let contended = std::thread::scope(|s| s.spawn(|| lock.try_lock()).join().unwrap());
        assert_eq!(contended, RawAcquire::Busy);

        unsafe { lock.unlock() };
        assert_eq!(lock.try_lock(), RawAcquire::Acquired);
        unsafe { lock.unlock() };
    }
}

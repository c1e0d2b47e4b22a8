//! Linux futex-based worker parking
//!
//! Futex word semantics: a wrapping wake epoch.
//!
//! Parking:
//! 1. `prepare_park()` loads the epoch
//! 2. Worker re-checks its job queue
//! 3. FUTEX_WAIT on the epoch word, expecting the loaded value
//!
//! Waking bumps the epoch, then FUTEX_WAKEs if anybody is parked. A bump
//! between steps 1 and 3 makes FUTEX_WAIT fail with EAGAIN at once.

use super::WorkerParking;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

pub struct FutexParking {
    epoch: AtomicU32,
    parked: AtomicUsize,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            parked: AtomicUsize::new(0),
        }
    }

    fn wake(&self, count: i32) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        // Safety: the futex word lives as long as `self`
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.epoch.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                count,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FutexParking {
    fn prepare_park(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn park(&self, token: u32, timeout: Option<Duration>) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);

        if self.epoch.load(Ordering::SeqCst) != token {
            self.parked.fetch_sub(1, Ordering::SeqCst);
            return true;
        }

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Safety: valid futex word and (optional) relative timeout
        let result = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.epoch.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                token,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            )
        };
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);

        self.parked.fetch_sub(1, Ordering::SeqCst);

        if result == 0 {
            // FUTEX_WAKE, or a spurious return; the epoch tells which
            self.epoch.load(Ordering::SeqCst) != token
        } else if errno == libc::EAGAIN {
            // Epoch moved before we slept
            true
        } else {
            // ETIMEDOUT or EINTR
            self.epoch.load(Ordering::SeqCst) != token
        }
    }

    fn unpark_one(&self) {
        self.wake(1);
    }

    fn unpark_all(&self) {
        self.wake(i32::MAX);
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}

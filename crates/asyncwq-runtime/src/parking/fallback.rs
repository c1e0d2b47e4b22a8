//! Fallback parking using std::sync::Condvar
//!
//! Used on platforms without futex support. Same epoch protocol as the
//! futex implementation, with the epoch kept under a mutex.

use super::WorkerParking;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub struct FallbackParking {
    epoch: Mutex<u32>,
    condvar: Condvar,
    parked: AtomicUsize,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            epoch: Mutex::new(0),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    fn epoch(&self) -> MutexGuard<'_, u32> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        let mut epoch = self.epoch();
        *epoch = epoch.wrapping_add(1);
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FallbackParking {
    fn prepare_park(&self) -> u32 {
        *self.epoch()
    }

    fn park(&self, token: u32, timeout: Option<Duration>) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut guard = self.epoch();
        let woken = loop {
            if *guard != token {
                break true;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break false;
                    }
                    guard = self
                        .condvar
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    guard = self
                        .condvar
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        };
        drop(guard);

        self.parked.fetch_sub(1, Ordering::SeqCst);
        woken
    }

    fn unpark_one(&self) {
        self.bump();
        self.condvar.notify_one();
    }

    fn unpark_all(&self) {
        self.bump();
        self.condvar.notify_all();
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}

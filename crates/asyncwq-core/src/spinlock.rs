//! Spinlock for the engine's short critical sections
//!
//! Guards the ordered-completion list and the threshold bookkeeping.
//! Both are held for O(1) work only and never across a callback, so a
//! spinning lock keeps `queue_work` free of sleeping primitives.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Upper bound on pause hints issued per backoff round
const MAX_BACKOFF: u32 = 64;

/// A test-and-test-and-set spinlock with bounded exponential backoff.
///
/// # Warning
///
/// Never call a work item's primary, ordered or free function while
/// holding one of these. Callbacks may block.
pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// Safety: SpinLock hands out access to T only while `locked` is held
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning until it's available
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let mut backoff = 1u32;
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinLockGuard { lock: self };
            }

            while self.locked.load(Ordering::Relaxed) {
                for _ in 0..backoff {
                    core::hint::spin_loop();
                }
                backoff = (backoff << 1).min(MAX_BACKOFF);
            }
        }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }

    /// Run `f` with the lock held and return its result
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Exclusive access through `&mut self`; no locking needed
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        SpinLock::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("data", &*guard).finish(),
            None => f.debug_struct("SpinLock").field("data", &"<locked>").finish(),
        }
    }
}

/// Guard that releases the spinlock when dropped
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: We hold the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: We hold the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_spinlock_fifo_list() {
        let list = SpinLock::new(VecDeque::new());
        list.with(|l| l.push_back(1));
        list.with(|l| l.push_back(2));
        assert_eq!(list.with(|l| l.front().copied()), Some(1));
        assert_eq!(list.lock().pop_front(), Some(1));
        assert_eq!(list.into_inner(), VecDeque::from(vec![2]));
    }

    #[test]
    fn test_spinlock_try_lock() {
        let lock = SpinLock::new(0u32);

        let guard = lock.try_lock();
        assert!(guard.is_some());
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());

        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_spinlock_concurrent_appends_keep_order_per_thread() {
        let lock = Arc::new(SpinLock::new(Vec::new()));
        let mut handles = vec![];

        for t in 0..4u32 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for i in 0..500u32 {
                    lock.lock().push((t, i));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let all = Arc::try_unwrap(lock).unwrap().into_inner();
        assert_eq!(all.len(), 2000);
        for t in 0..4u32 {
            let seq: Vec<u32> = all.iter().filter(|(o, _)| *o == t).map(|(_, i)| *i).collect();
            assert!(seq.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

//! Worker parking mechanism
//!
//! Idle pool workers sleep here until a job is queued, the concurrency
//! ceiling changes or the pool shuts down.
//!
//! Wakeups are epoch based so none can be lost: a worker reads the epoch
//! with `prepare_park()`, re-checks the job queue, then calls `park()`
//! with that token. Any `unpark_*` in between bumps the epoch and the
//! park returns immediately.

use std::time::Duration;

/// Platform-specific worker parking mechanism
pub trait WorkerParking: Send + Sync {
    /// Snapshot the wake epoch before the final "is there work?" check
    fn prepare_park(&self) -> u32;

    /// Sleep until the epoch moves past `token` or `timeout` expires
    ///
    /// Returns `true` if woken by an unpark, `false` on timeout.
    /// Callers re-check for work either way.
    fn park(&self, token: u32, timeout: Option<Duration>) -> bool;

    /// Wake one parked worker
    fn unpark_one(&self);

    /// Wake every parked worker (resize, shutdown)
    fn unpark_all(&self);

    /// Number of currently parked workers (hint, may be stale)
    fn parked_count(&self) -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn WorkerParking> {
    Box::new(PlatformParking::new())
}

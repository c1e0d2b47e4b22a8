//! # asyncwq-core
//!
//! Core types and traits for the asyncwq deferred-work engine.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The thread pool that actually runs work lives in `asyncwq-runtime`;
//! the ordered/threshold engine on top of it lives in `asyncwq`.
//!
//! ## Modules
//!
//! - `flags` - Work item flag bits, lifecycle state and priority
//! - `error` - Error types
//! - `spinlock` - Short-critical-section spinlock
//! - `traits` - Executor seam between the engine and a thread pool
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod flags;
pub mod error;
pub mod spinlock;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use flags::{AtomicWorkFlags, Priority, WorkFlags, WorkState};
pub use error::{WqError, WqResult};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use traits::{Executor, ExecutorFactory, Job};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

/// Tuning constants shared by the runtime and the engine
pub mod constants {
    /// Thresholds below this value disable the adaptive controller.
    pub const DFT_THRESHOLD: usize = 32;

    /// Hard ceiling on concurrently active workers of a single pool.
    pub const MAX_ACTIVE: usize = 512;

    /// Suffix appended to the name of a workqueue's high-priority pool.
    pub const HIGH_SUFFIX: &str = "-high";
}

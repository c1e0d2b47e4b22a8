//! # asyncwq - Deferred-Work Queues with Ordered Completion
//!
//! Priority-aware, self-throttling work queues for I/O completion style
//! workloads.
//!
//! ## Features
//!
//! - **Ordered completion**: an item's ordered function runs in submission
//!   order, even when primary functions finish out of order
//! - **Adaptive concurrency**: active workers follow the backlog, one step
//!   at a time, between 1 and a configurable ceiling
//! - **Two priority classes**: optional high-priority pool per workqueue
//! - **Backpressure hint**: `normal_congested()` once the backlog passes
//!   twice the threshold
//!
//! ## Quick Start
//!
//! ```ignore
//! use asyncwq::{Owner, Work, Workqueue, WqFlags};
//!
//! let wq = Workqueue::alloc(&Owner::new("fs0"), "endio", WqFlags::HIGHPRI, 8, 32)?;
//!
//! for bio in bios {
//!     let mut work = Work::with_ordered(
//!         move || checksum(bio),
//!         move || complete(bio),
//!         move || release(bio),
//!     );
//!     if bio.is_sync() {
//!         work.set_high_priority();
//!     }
//!     wq.queue_work(work);
//! }
//!
//! wq.flush();
//! wq.destroy();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Producers                            │
//! │            Work::new / with_ordered, queue_work             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Workqueue                            │
//! │         routes by HIGH_PRIO, flush, set_max, teardown       │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                           │
//!                  ▼                           ▼
//!    ┌──────────────────────────┐  ┌──────────────────────────┐
//!    │       Pool (normal)      │  │      Pool (high)         │
//!    │ thresh hooks, ordered    │  │ thresh hooks, ordered    │
//!    │ FIFO, congestion         │  │ FIFO                     │
//!    └──────────────────────────┘  └──────────────────────────┘
//!                  │                           │
//!                  ▼                           ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                 Executor (ThreadPool)                   │
//!    │      lock-free queue, adjustable max_active, parking    │
//!    └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod owner;
pub mod pool;
pub mod work;
pub mod workqueue;

#[cfg(test)]
mod testing;

pub use config::WorkqueueConfig;
pub use owner::Owner;
pub use pool::{Pool, PoolStats};
pub use work::{Work, WorkFn, WorkHandle};
pub use workqueue::{Workqueue, WorkqueueStats, WqFlags};

// Re-export core types
pub use asyncwq_core::{constants, kprint};
pub use asyncwq_core::{
    Executor, ExecutorFactory, Job, Priority, WorkFlags, WorkState, WqError, WqResult,
};

// Re-export kprint macros for debug logging
pub use asyncwq_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};
pub use asyncwq_core::kprint::{
    init as init_logging, set_flush_enabled, set_log_level, set_thread_enabled, LogLevel,
};

// Re-export env utilities
pub use asyncwq_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use asyncwq_runtime::{ThreadPool, ThreadPoolConfig, ThreadPoolFactory};

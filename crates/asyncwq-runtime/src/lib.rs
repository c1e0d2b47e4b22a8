//! # asyncwq-runtime
//!
//! Platform-specific runtime for asyncwq.
//!
//! This crate provides:
//! - `ThreadPool`: the default `Executor`, with an adjustable
//!   active-worker ceiling and blocking drain/teardown
//! - Worker parking (futex on Linux, condvar elsewhere)
//! - Thread pool configuration with environment overrides

pub mod config;
pub mod parking;
pub mod pool;

// Re-exports
pub use config::ThreadPoolConfig;
pub use parking::{new_parking, WorkerParking};
pub use pool::{ThreadPool, ThreadPoolFactory};

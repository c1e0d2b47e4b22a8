//! Library defaults for `ThreadPoolConfig`

/// Initial concurrency ceiling
pub const MAX_ACTIVE: usize = 1;

/// How long an idle worker parks before re-checking the queue
pub const PARK_TIMEOUT_MS: u64 = 10;

/// Queue polls before an idle worker parks
pub const IDLE_SPINS: u32 = 64;

/// Worker thread stack size (0 = std default)
pub const STACK_SIZE: usize = 0;

/// Nice value requested by high-priority pool workers
pub const HIGH_PRIORITY_NICE: i32 = -20;

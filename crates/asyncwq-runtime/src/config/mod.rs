//! Thread pool configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables
//! 3. Library defaults (`defaults.rs`)
//!
//! # Example
//!
//! ```rust,ignore
//! use asyncwq_runtime::config::ThreadPoolConfig;
//!
//! let config = ThreadPoolConfig::from_env()
//!     .name("fs0-endio")
//!     .max_active(4)
//!     .park_timeout(Duration::from_millis(5));
//! ```

pub mod defaults;

use std::time::Duration;

use asyncwq_core::constants::MAX_ACTIVE;
use asyncwq_core::env::{env_get, env_get_ms};
use asyncwq_core::error::{WqError, WqResult};

/// Thread pool configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Pool name; worker threads are named `<name>/<n>`
    pub name: String,
    /// Jobs allowed to run concurrently
    pub max_active: usize,
    /// Idle worker park timeout
    pub park_timeout: Duration,
    /// Queue polls before parking
    pub idle_spins: u32,
    /// Worker stack size in bytes (0 = std default)
    pub stack_size: usize,
    /// Nice value requested for worker threads, if any
    pub nice: Option<i32>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ThreadPoolConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `AWQ_PARK_TIMEOUT_MS` - Idle park timeout in milliseconds
    /// - `AWQ_IDLE_SPINS` - Queue polls before parking
    /// - `AWQ_STACK_SIZE` - Worker stack size in bytes
    pub fn from_env() -> Self {
        Self {
            park_timeout: env_get_ms("AWQ_PARK_TIMEOUT_MS", defaults::PARK_TIMEOUT_MS),
            idle_spins: env_get("AWQ_IDLE_SPINS", defaults::IDLE_SPINS),
            stack_size: env_get("AWQ_STACK_SIZE", defaults::STACK_SIZE),
            ..Self::new()
        }
    }

    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            name: String::from("asyncwq"),
            max_active: defaults::MAX_ACTIVE,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            idle_spins: defaults::IDLE_SPINS,
            stack_size: defaults::STACK_SIZE,
            nice: None,
        }
    }

    // Builder methods

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn max_active(mut self, n: usize) -> Self {
        self.max_active = n;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn idle_spins(mut self, spins: u32) -> Self {
        self.idle_spins = spins;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn nice(mut self, nice: Option<i32>) -> Self {
        self.nice = nice;
        self
    }

    pub fn validate(&self) -> WqResult<()> {
        if self.name.is_empty() {
            return Err(WqError::InvalidConfig("name must not be empty"));
        }
        if self.max_active == 0 {
            return Err(WqError::InvalidConfig("max_active must be > 0"));
        }
        if self.max_active > MAX_ACTIVE {
            return Err(WqError::InvalidConfig("max_active must be <= 512"));
        }
        if self.park_timeout.is_zero() {
            return Err(WqError::InvalidConfig("park_timeout must be > 0"));
        }
        if self.stack_size != 0 && self.stack_size < 16 * 1024 {
            return Err(WqError::InvalidConfig("stack_size must be 0 or >= 16KB"));
        }
        if let Some(nice) = self.nice {
            if !(-20..=19).contains(&nice) {
                return Err(WqError::InvalidConfig("nice must be within -20..=19"));
            }
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("ThreadPool Configuration:");
        eprintln!("  name:          {}", self.name);
        eprintln!("  max_active:    {}", self.max_active);
        eprintln!("  park_timeout:  {:?}", self.park_timeout);
        eprintln!("  idle_spins:    {}", self.idle_spins);
        eprintln!("  stack_size:    {}", self.stack_size);
        eprintln!("  nice:          {:?}", self.nice);
    }
}

//! Workqueue configuration
//!
//! Environment variables (all optional):
//! - `AWQ_LIMIT_ACTIVE` - Active-worker ceiling per pool
//! - `AWQ_THRESH` - Pending threshold (below 32 disables thresholding)
//! - `AWQ_HIGHPRI` - Also create a high-priority pool (true/false)

use asyncwq_core::constants::{DFT_THRESHOLD, MAX_ACTIVE};
use asyncwq_core::env::{env_get, env_get_bool};
use asyncwq_core::error::{WqError, WqResult};

use crate::workqueue::WqFlags;

/// Parameters for `Workqueue::from_config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkqueueConfig {
    pub limit_active: usize,
    pub thresh: usize,
    pub flags: WqFlags,
}

impl Default for WorkqueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkqueueConfig {
    /// Library defaults: `min(nproc + 2, 8)` workers, default threshold,
    /// no high-priority pool.
    pub fn new() -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            limit_active: (num_cpus + 2).min(8),
            thresh: DFT_THRESHOLD,
            flags: WqFlags::empty(),
        }
    }

    pub fn from_env() -> Self {
        let base = Self::new();
        let mut flags = base.flags;
        flags.set(WqFlags::HIGHPRI, env_get_bool("AWQ_HIGHPRI", false));

        Self {
            limit_active: env_get("AWQ_LIMIT_ACTIVE", base.limit_active),
            thresh: env_get("AWQ_THRESH", base.thresh),
            flags,
        }
    }

    /// Single worker, no thresholding: strictly sequential execution
    pub fn ordered() -> Self {
        Self {
            limit_active: 1,
            thresh: 0,
            flags: WqFlags::empty(),
        }
    }

    pub fn limit_active(mut self, n: usize) -> Self {
        self.limit_active = n;
        self
    }

    pub fn thresh(mut self, thresh: usize) -> Self {
        self.thresh = thresh;
        self
    }

    pub fn flags(mut self, flags: WqFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn high_priority(mut self, enabled: bool) -> Self {
        self.flags.set(WqFlags::HIGHPRI, enabled);
        self
    }

    #[inline]
    pub fn thresholding_enabled(&self) -> bool {
        self.thresh >= DFT_THRESHOLD
    }

    pub fn validate(&self) -> WqResult<()> {
        if self.limit_active == 0 {
            return Err(WqError::InvalidConfig("limit_active must be > 0"));
        }
        if self.limit_active > MAX_ACTIVE {
            return Err(WqError::InvalidConfig("limit_active must be <= 512"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Workqueue Configuration:");
        eprintln!("  limit_active:  {}", self.limit_active);
        eprintln!(
            "  thresh:        {}{}",
            self.thresh,
            if self.thresholding_enabled() { "" } else { " (disabled)" }
        );
        eprintln!("  high_prio:     {}", self.flags.contains(WqFlags::HIGHPRI));
    }
}

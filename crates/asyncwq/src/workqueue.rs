//! Dual-priority workqueue
//!
//! A `Workqueue` is a normal pool plus, when created with
//! `WqFlags::HIGHPRI`, a second high-priority pool with the same limits.
//! Items flagged high priority go to the high pool when there is one and
//! to the normal pool otherwise. Ordering guarantees hold within a pool,
//! never across the two.

use bitflags::bitflags;

use asyncwq_core::error::WqResult;
use asyncwq_core::flags::Priority;
use asyncwq_core::traits::ExecutorFactory;
use asyncwq_runtime::ThreadPoolFactory;

use crate::config::WorkqueueConfig;
use crate::owner::Owner;
use crate::pool::{Pool, PoolStats};
use crate::work::{Work, WorkHandle};

bitflags! {
    /// Workqueue creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WqFlags: u32 {
        /// Create a high-priority pool alongside the normal one
        const HIGHPRI = 1 << 0;
    }
}

/// Counters of both pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkqueueStats {
    pub normal: PoolStats,
    pub high: Option<PoolStats>,
}

/// A normal pool and an optional high-priority pool
///
/// Dropping the workqueue destroys the high pool first, then the normal
/// pool; each waits for its queued work.
pub struct Workqueue {
    // Field order is teardown order
    high: Option<Pool>,
    normal: Pool,
}

impl Workqueue {
    /// Allocate a workqueue backed by thread pools configured from the
    /// environment.
    pub fn alloc(
        owner: &Owner,
        name: &str,
        flags: WqFlags,
        limit_active: usize,
        thresh: usize,
    ) -> WqResult<Workqueue> {
        Self::alloc_with(
            &ThreadPoolFactory::from_env(),
            owner,
            name,
            flags,
            limit_active,
            thresh,
        )
    }

    /// Allocate a workqueue whose pools run on executors from `factory`.
    ///
    /// If the high pool cannot be created the normal pool is torn down
    /// before the error is returned.
    pub fn alloc_with(
        factory: &dyn ExecutorFactory,
        owner: &Owner,
        name: &str,
        flags: WqFlags,
        limit_active: usize,
        thresh: usize,
    ) -> WqResult<Workqueue> {
        let normal = Pool::alloc(factory, owner, name, Priority::Normal, limit_active, thresh)?;
        // `normal` drops on the error path
        let high = flags
            .contains(WqFlags::HIGHPRI)
            .then(|| Pool::alloc(factory, owner, name, Priority::High, limit_active, thresh))
            .transpose()?;

        Ok(Workqueue { high, normal })
    }

    /// Single-worker workqueue without thresholding: items run one at a
    /// time, in submission order.
    pub fn alloc_ordered(owner: &Owner, name: &str, flags: WqFlags) -> WqResult<Workqueue> {
        let cfg = WorkqueueConfig::ordered().flags(flags);
        Self::from_config(owner, name, &cfg)
    }

    pub fn from_config(owner: &Owner, name: &str, config: &WorkqueueConfig) -> WqResult<Workqueue> {
        config.validate()?;
        Self::alloc(owner, name, config.flags, config.limit_active, config.thresh)
    }

    /// Submit an item. Never blocks.
    pub fn queue_work(&self, work: Work) -> WorkHandle {
        match &self.high {
            Some(high) if work.is_high_priority() => high.queue_work(work),
            _ => self.normal.queue_work(work),
        }
    }

    /// Set the active-worker ceiling of both pools
    pub fn set_max(&self, limit_active: usize) {
        self.normal.set_max(limit_active);
        if let Some(high) = &self.high {
            high.set_max(limit_active);
        }
    }

    /// Backpressure hint from the normal pool only
    pub fn normal_congested(&self) -> bool {
        self.normal.is_congested()
    }

    /// Wait for everything queued so far, high pool first
    pub fn flush(&self) {
        if let Some(high) = &self.high {
            high.flush();
        }
        self.normal.flush();
    }

    pub fn destroy(self) {
        drop(self);
    }

    #[inline]
    pub fn owner(&self) -> &Owner {
        self.normal.owner()
    }

    #[inline]
    pub fn has_high_priority(&self) -> bool {
        self.high.is_some()
    }

    #[inline]
    pub fn normal(&self) -> &Pool {
        &self.normal
    }

    #[inline]
    pub fn high(&self) -> Option<&Pool> {
        self.high.as_ref()
    }

    pub fn stats(&self) -> WorkqueueStats {
        WorkqueueStats {
            normal: self.normal.stats(),
            high: self.high.as_ref().map(Pool::stats),
        }
    }
}

impl std::fmt::Debug for Workqueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workqueue")
            .field("normal", &self.normal)
            .field("high", &self.high)
            .finish()
    }
}

//! Single-priority pool
//!
//! A `Pool` drives one `Executor` and adds two things on top of it:
//!
//! - **Threshold controller.** With thresholding enabled the executor
//!   starts with one active worker. Every dispatch decrements `pending`;
//!   every `thresh / 4` dispatches the controller compares `pending`
//!   against the threshold and moves the active-worker count one step
//!   towards demand, clamped to `[1, limit_active]`.
//!
//! - **Ordered completion.** Items with an ordered function are appended
//!   to a FIFO at submission. Whichever worker finishes a primary function
//!   drains the FIFO head as far as finished items allow, so ordered
//!   functions run in submission order no matter how primaries interleave.
//!
//! Locking: `ordered` and `thresh_state` are separate spinlocks, each held
//! for O(1) work. Callbacks and `Executor::set_max_active` always run with
//! neither held.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use asyncwq_core::constants::{DFT_THRESHOLD, HIGH_SUFFIX, MAX_ACTIVE};
use asyncwq_core::error::{WqError, WqResult};
use asyncwq_core::flags::{Priority, WorkFlags};
use asyncwq_core::spinlock::SpinLock;
use asyncwq_core::traits::{Executor, ExecutorFactory};
use asyncwq_core::{kdebug, ktrace, kwarn};

use crate::owner::Owner;
use crate::work::{Work, WorkHandle, WorkInner};

/// Identity of a pool, shared with every item queued on it
pub(crate) struct PoolTag {
    pub(crate) owner: Owner,
    pub(crate) name: Arc<str>,
    pub(crate) priority: Priority,
}

struct ThreshState {
    current_active: usize,
    /// Dispatches since the controller last ran, modulo `thresh / 4`
    count: usize,
}

/// Active-worker count proposed by the threshold controller.
///
/// One step up when the backlog exceeds `thresh`, one step down when it
/// falls under half of it, always within `[1, limit]`.
pub(crate) fn next_active(current: usize, pending: usize, thresh: usize, limit: usize) -> usize {
    let mut next = current;
    if pending > thresh {
        next += 1;
    }
    if pending < thresh / 2 {
        next = next.saturating_sub(1);
    }
    next.clamp(1, limit.max(1))
}

/// Point-in-time counters of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Submitted but not yet dispatched (0 when thresholding is off)
    pub pending: usize,
    pub current_active: usize,
    pub limit_active: usize,
    /// `None` when thresholding is disabled
    pub thresh: Option<usize>,
    /// Ordered items still waiting for their ordered function
    pub ordered_len: usize,
    /// Executor's concurrency ceiling
    pub max_active: usize,
    pub queued: u64,
    pub executed: u64,
    pub ordered_done: u64,
}

pub(crate) struct PoolShared {
    tag: Arc<PoolTag>,
    executor: Arc<dyn Executor>,
    ordered: SpinLock<VecDeque<Arc<WorkInner>>>,
    pending: AtomicUsize,
    thresh: Option<usize>,
    thresh_state: SpinLock<ThreshState>,
    limit_active: AtomicUsize,
    queued: AtomicU64,
    executed: AtomicU64,
    ordered_done: AtomicU64,
}

impl PoolShared {
    #[inline]
    fn name(&self) -> &str {
        &self.tag.name
    }

    fn thresh_queue_hook(&self) {
        if self.thresh.is_none() {
            return;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Runs once per item, just before its primary function
    fn thresh_exec_hook(&self) {
        let Some(thresh) = self.thresh else { return };

        self.pending.fetch_sub(1, Ordering::AcqRel);

        let changed = {
            let mut st = self.thresh_state.lock();
            st.count = (st.count + 1) % (thresh / 4);
            if st.count != 0 {
                None
            } else {
                // Racy read; the controller is a heuristic
                let pending = self.pending.load(Ordering::Relaxed);
                let limit = self.limit_active.load(Ordering::Relaxed);
                let next = next_active(st.current_active, pending, thresh, limit);
                if next != st.current_active {
                    st.current_active = next;
                    Some(next)
                } else {
                    None
                }
            }
        };

        if let Some(active) = changed {
            kdebug!("{}: current_active -> {}", self.name(), active);
            self.executor.set_max_active(active);
        }
    }

    /// Job body for every queued item
    fn execute(&self, work: Arc<WorkInner>) {
        let need_order = work.is_ordered();
        ktrace!("work sched: pool={} work={:p}", self.name(), Arc::as_ptr(&work));

        self.thresh_exec_hook();
        work.run_func();
        self.executed.fetch_add(1, Ordering::Relaxed);
        work.flags().set(WorkFlags::DONE);

        if need_order {
            self.run_ordered_work(&work);
        } else {
            work.release();
            ktrace!("all work done: pool={} work={:p}", self.name(), Arc::as_ptr(&work));
        }
    }

    /// Deliver ordered functions from the FIFO head for as long as the
    /// head item's primary function has finished.
    fn run_ordered_work(&self, self_work: &Arc<WorkInner>) {
        let mut free_self = false;

        loop {
            let work = {
                let list = self.ordered.lock();
                let Some(head) = list.front() else { break };
                if !head.flags().contains(WorkFlags::DONE) {
                    break;
                }
                // Another worker already owns this head
                if head.flags().test_and_set(WorkFlags::ORDER_DONE) {
                    break;
                }
                Arc::clone(head)
            };

            ktrace!("ordered sched: pool={} work={:p}", self.name(), Arc::as_ptr(&work));
            work.run_ordered_func();
            self.ordered_done.fetch_add(1, Ordering::Relaxed);

            {
                let mut list = self.ordered.lock();
                let head = list.pop_front();
                debug_assert!(head.is_some_and(|h| Arc::ptr_eq(&h, &work)));
            }

            // Our own item is released only once the loop is over
            if Arc::ptr_eq(&work, self_work) {
                free_self = true;
            } else {
                work.release();
                ktrace!("all work done: pool={} work={:p}", self.name(), Arc::as_ptr(&work));
            }
        }

        if free_self {
            self_work.release();
            ktrace!("all work done: pool={} work={:p}", self.name(), Arc::as_ptr(self_work));
        }
    }
}

/// One priority class: an executor plus threshold controller and ordered
/// FIFO. Dropping the pool tears down its executor, waiting for every
/// queued item.
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Allocate a pool.
    ///
    /// `thresh < DFT_THRESHOLD` disables the controller: the executor
    /// starts at `limit_active` and is never resized. Otherwise it starts
    /// at one active worker.
    pub fn alloc(
        factory: &dyn ExecutorFactory,
        owner: &Owner,
        name: &str,
        priority: Priority,
        limit_active: usize,
        thresh: usize,
    ) -> WqResult<Pool> {
        if limit_active == 0 {
            return Err(WqError::InvalidConfig("limit_active must be > 0"));
        }
        if limit_active > MAX_ACTIVE {
            return Err(WqError::InvalidConfig("limit_active must be <= 512"));
        }

        let (thresh, current_active) = if thresh < DFT_THRESHOLD {
            (None, limit_active)
        } else {
            (Some(thresh), 1)
        };

        let full_name: Arc<str> = match priority {
            Priority::High => format!("{}-{}{}", owner, name, HIGH_SUFFIX).into(),
            Priority::Normal => format!("{}-{}", owner, name).into(),
        };
        let executor = factory.create(&full_name, current_active, priority)?;

        kdebug!(
            "workqueue alloc: name={} priority={} limit_active={} thresh={:?}",
            full_name,
            priority,
            limit_active,
            thresh
        );

        Ok(Pool {
            shared: Arc::new(PoolShared {
                tag: Arc::new(PoolTag {
                    owner: owner.clone(),
                    name: full_name,
                    priority,
                }),
                executor,
                ordered: SpinLock::new(VecDeque::new()),
                pending: AtomicUsize::new(0),
                thresh,
                thresh_state: SpinLock::new(ThreshState {
                    current_active,
                    count: 0,
                }),
                limit_active: AtomicUsize::new(limit_active),
                queued: AtomicU64::new(0),
                executed: AtomicU64::new(0),
                ordered_done: AtomicU64::new(0),
            }),
        })
    }

    /// Submit an item. Never blocks.
    pub fn queue_work(&self, work: Work) -> WorkHandle {
        let work = work.into_inner();
        let shared = &self.shared;

        work.mark_queued(Arc::clone(&shared.tag));
        shared.thresh_queue_hook();
        if work.is_ordered() {
            shared.ordered.lock().push_back(Arc::clone(&work));
        }
        shared.queued.fetch_add(1, Ordering::Relaxed);
        ktrace!("work queued: pool={} work={:p}", shared.name(), Arc::as_ptr(&work));

        let handle = WorkHandle::from_inner(Arc::clone(&work));
        let job_pool = Arc::clone(shared);
        shared.executor.queue(Box::new(move || job_pool.execute(work)));
        handle
    }

    /// Update the active-worker ceiling.
    ///
    /// The executor is not resized here; the controller converges on its
    /// next evaluation.
    pub fn set_max(&self, limit_active: usize) {
        self.shared
            .limit_active
            .store(limit_active.clamp(1, MAX_ACTIVE), Ordering::Relaxed);
    }

    /// True when more than twice the threshold is waiting for dispatch
    pub fn is_congested(&self) -> bool {
        match self.shared.thresh {
            None => false,
            Some(thresh) => self.shared.pending.load(Ordering::Relaxed) > thresh * 2,
        }
    }

    /// Block until everything queued so far has run, ordered functions
    /// included. Must not be called from one of this pool's items.
    pub fn flush(&self) {
        self.shared.executor.drain();
    }

    /// Tear down the executor, waiting for in-flight work
    pub fn destroy(self) {
        drop(self);
    }

    #[inline]
    pub fn owner(&self) -> &Owner {
        &self.shared.tag.owner
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.shared.tag.priority
    }

    #[inline]
    pub fn thresh(&self) -> Option<usize> {
        self.shared.thresh
    }

    pub fn current_active(&self) -> usize {
        self.shared.thresh_state.lock().current_active
    }

    #[inline]
    pub fn limit_active(&self) -> usize {
        self.shared.limit_active.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            pending: self.pending(),
            current_active: self.current_active(),
            limit_active: self.limit_active(),
            thresh: shared.thresh,
            ordered_len: shared.ordered.lock().len(),
            max_active: shared.executor.max_active(),
            queued: shared.queued.load(Ordering::Relaxed),
            executed: shared.executed.load(Ordering::Relaxed),
            ordered_done: shared.ordered_done.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shared.executor.shutdown();

        let stranded = self.shared.ordered.lock().len();
        if stranded != 0 {
            kwarn!(
                "{}: destroyed with {} ordered items outstanding",
                self.name(),
                stranded
            );
        }
        kdebug!("workqueue destroy: name={}", self.name());
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualExecutor, ManualFactory};
    use asyncwq_core::flags::WorkState;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn manual_pool(limit_active: usize, thresh: usize) -> (Pool, Arc<ManualExecutor>) {
        let factory = ManualFactory::new();
        let pool = Pool::alloc(
            &factory,
            &Owner::new("fs0"),
            "endio",
            Priority::Normal,
            limit_active,
            thresh,
        )
        .unwrap();
        (pool, factory.executor(0))
    }

    fn noop() -> Work {
        Work::new(|| {})
    }

    /// Ordered item logging "func:i", "ordered:i", "free:i"
    fn logged(i: usize, log: &Arc<Mutex<Vec<String>>>) -> Work {
        let (a, b, c) = (Arc::clone(log), Arc::clone(log), Arc::clone(log));
        Work::with_ordered(
            move || a.lock().unwrap().push(format!("func:{i}")),
            move || b.lock().unwrap().push(format!("ordered:{i}")),
            move || c.lock().unwrap().push(format!("free:{i}")),
        )
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>, kind: &str) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(kind))
            .cloned()
            .collect()
    }

    #[test]
    fn test_alloc_low_thresh_disables_controller() {
        let (pool, exec) = manual_pool(4, 16);
        assert_eq!(pool.thresh(), None);
        assert_eq!(pool.current_active(), 4);
        assert_eq!(exec.max_active(), 4);
        assert_eq!(pool.name(), "fs0-endio");

        for _ in 0..2000 {
            pool.queue_work(noop());
        }
        assert_eq!(pool.pending(), 0);
        assert!(!pool.is_congested());
        assert_eq!(exec.run_all(), 2000);
        assert!(exec.resizes().is_empty());
        assert_eq!(pool.current_active(), 4);
    }

    #[test]
    fn test_alloc_zero_thresh_disables_controller() {
        let (pool, _) = manual_pool(3, 0);
        assert_eq!(pool.thresh(), None);
        assert_eq!(pool.current_active(), 3);
    }

    #[test]
    fn test_alloc_enabled_thresh_starts_at_one() {
        let (pool, exec) = manual_pool(8, 32);
        assert_eq!(pool.thresh(), Some(32));
        assert_eq!(pool.current_active(), 1);
        assert_eq!(exec.max_active(), 1);
    }

    #[test]
    fn test_alloc_rejects_zero_limit() {
        let factory = ManualFactory::new();
        let err = Pool::alloc(&factory, &Owner::new("fs0"), "x", Priority::Normal, 0, 32);
        assert!(matches!(err, Err(WqError::InvalidConfig(_))));
        assert_eq!(factory.created(), 0);
    }

    #[test]
    fn test_alloc_propagates_executor_failure() {
        let factory = ManualFactory::failing_at(0);
        let err = Pool::alloc(&factory, &Owner::new("fs0"), "x", Priority::Normal, 2, 32);
        assert!(matches!(err, Err(WqError::SpawnFailed(_))));
    }

    #[test]
    fn test_high_pool_name_has_suffix() {
        let factory = ManualFactory::new();
        let pool = Pool::alloc(&factory, &Owner::new("fs0"), "delalloc", Priority::High, 2, 0)
            .unwrap();
        assert_eq!(pool.name(), "fs0-delalloc-high");
        assert_eq!(factory.executor(0).priority, Some(Priority::High));
        assert_eq!(factory.executor(0).name, "fs0-delalloc-high");
    }

    #[test]
    fn test_controller_grows_one_step_per_quarter_thresh() {
        let (pool, exec) = manual_pool(4, 32);
        for _ in 0..200 {
            pool.queue_work(noop());
        }
        assert_eq!(pool.pending(), 200);

        let mut seen = vec![pool.current_active()];
        for _ in 0..40 {
            exec.run_one();
            seen.push(pool.current_active());
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        // Re-evaluated after dispatch 8, 16, 24; capped at 4 afterwards
        assert_eq!(exec.resizes(), vec![2, 3, 4]);
        assert_eq!(seen[7], 1);
        assert_eq!(seen[8], 2);
        assert_eq!(seen[16], 3);
        assert_eq!(seen[24], 4);
        assert_eq!(pool.current_active(), 4);
    }

    #[test]
    fn test_controller_shrinks_when_idle() {
        let (pool, exec) = manual_pool(4, 32);
        for _ in 0..200 {
            pool.queue_work(noop());
        }
        exec.run_all();
        assert_eq!(pool.pending(), 0);
        // Grew while the backlog lasted, then stepped down once it fell
        // under thresh / 2 (evaluations at 192 and 200 dispatches)
        assert_eq!(exec.resizes(), vec![2, 3, 4, 3, 2]);
        assert_eq!(pool.current_active(), 2);

        // A second quiet round steps the rest of the way down
        for _ in 0..16 {
            pool.queue_work(noop());
        }
        exec.run_all();
        assert_eq!(exec.resizes(), vec![2, 3, 4, 3, 2, 1]);
        assert_eq!(pool.current_active(), 1);
    }

    #[test]
    fn test_set_max_is_lazy() {
        let (pool, exec) = manual_pool(4, 32);
        for _ in 0..200 {
            pool.queue_work(noop());
        }
        for _ in 0..24 {
            exec.run_one();
        }
        assert_eq!(pool.current_active(), 4);

        pool.set_max(2);
        assert_eq!(pool.limit_active(), 2);
        assert_eq!(pool.current_active(), 4);
        assert_eq!(exec.max_active(), 4);

        for _ in 0..8 {
            exec.run_one();
        }
        assert_eq!(pool.current_active(), 2);
        assert_eq!(exec.max_active(), 2);
    }

    #[test]
    fn test_congestion_tracks_pending() {
        let (pool, exec) = manual_pool(4, 32);
        assert!(!pool.is_congested());

        for _ in 0..64 {
            pool.queue_work(noop());
        }
        assert!(!pool.is_congested());
        pool.queue_work(noop());
        assert!(pool.is_congested());

        exec.run_one();
        assert_eq!(pool.pending(), 64);
        assert!(!pool.is_congested());
    }

    #[test]
    fn test_ordered_functions_follow_submission_order() {
        let (pool, exec) = manual_pool(4, 0);
        let log = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (1..=3).map(|i| pool.queue_work(logged(i, &log))).collect();
        assert_eq!(pool.stats().ordered_len, 3);

        let mut jobs = exec.take_jobs();
        let j3 = jobs.pop().unwrap();
        let j2 = jobs.pop().unwrap();
        let j1 = jobs.pop().unwrap();

        // Third primary finishes first: nothing can be delivered yet
        j3();
        assert!(entries(&log, "ordered").is_empty());
        assert_eq!(handles[2].state(), WorkState::Done);

        // First primary: delivers only item 1, item 2 still running
        j1();
        assert_eq!(entries(&log, "ordered"), vec!["ordered:1"]);
        assert_eq!(handles[0].state(), WorkState::Freed);

        // Second primary: delivers 2 and the already finished 3
        j2();
        assert_eq!(entries(&log, "ordered"), vec!["ordered:1", "ordered:2", "ordered:3"]);
        assert_eq!(pool.stats().ordered_len, 0);
        assert!(handles.iter().all(|h| h.state() == WorkState::Freed));
    }

    #[test]
    fn test_own_item_is_freed_after_the_loop() {
        let (pool, exec) = manual_pool(4, 0);
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 1..=3 {
            pool.queue_work(logged(i, &log));
        }
        let mut jobs = exec.take_jobs();
        let j3 = jobs.pop().unwrap();
        let j2 = jobs.pop().unwrap();
        let j1 = jobs.pop().unwrap();

        j1();
        j3();
        j2();
        // j2 delivered 2 and 3, freeing 3 at once and itself last
        assert_eq!(entries(&log, "free"), vec!["free:1", "free:3", "free:2"]);
    }

    #[test]
    fn test_unordered_items_skip_the_fifo_and_free_fn() {
        let (pool, exec) = manual_pool(2, 0);
        let freed = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&freed);
        let work = Work::init(
            Box::new(|| {}),
            None,
            Some(Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let handle = pool.queue_work(work);
        assert_eq!(handle.state(), WorkState::Queued);
        assert_eq!(pool.stats().ordered_len, 0);

        exec.run_all();
        assert_eq!(handle.state(), WorkState::Freed);
        assert_eq!(freed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handle_reports_pool() {
        let (pool, exec) = manual_pool(2, 0);
        let handle = pool.queue_work(noop());
        assert_eq!(handle.priority(), Some(Priority::Normal));
        assert_eq!(handle.pool_name(), Some("fs0-endio"));
        assert_eq!(handle.owner().map(|o| o.label()), Some("fs0"));
        exec.run_all();
    }

    #[test]
    fn test_stats_count_work() {
        let (pool, exec) = manual_pool(2, 32);
        let log = Arc::new(Mutex::new(Vec::new()));
        pool.queue_work(noop());
        pool.queue_work(logged(1, &log));
        let before = pool.stats();
        assert_eq!(before.queued, 2);
        assert_eq!(before.pending, 2);
        assert_eq!(before.ordered_len, 1);

        exec.run_all();
        let after = pool.stats();
        assert_eq!(after.executed, 2);
        assert_eq!(after.ordered_done, 1);
        assert_eq!(after.pending, 0);
        assert_eq!(after.max_active, 1);
    }

    #[test]
    fn test_drop_shuts_down_executor_after_running_queue() {
        let (pool, exec) = manual_pool(2, 0);
        let log = Arc::new(Mutex::new(Vec::new()));
        pool.queue_work(logged(1, &log));
        pool.destroy();
        assert!(exec.is_shut_down());
        assert_eq!(exec.queued(), 0);
        assert_eq!(entries(&log, "ordered"), vec!["ordered:1"]);
    }

    #[test]
    fn test_next_active_examples() {
        assert_eq!(next_active(1, 100, 32, 4), 2);
        assert_eq!(next_active(4, 100, 32, 4), 4);
        assert_eq!(next_active(3, 10, 32, 4), 2);
        assert_eq!(next_active(1, 0, 32, 4), 1);
        assert_eq!(next_active(2, 20, 32, 4), 2);
        assert_eq!(next_active(6, 20, 32, 4), 4);
        assert_eq!(next_active(1, 100, 32, 0), 1);
    }

    proptest! {
        #[test]
        fn test_next_active_stays_in_bounds(
            current in 1usize..64,
            pending in 0usize..10_000,
            thresh in 32usize..1024,
            limit in 1usize..64,
        ) {
            let next = next_active(current, pending, thresh, limit);
            prop_assert!(next >= 1 && next <= limit);
            if current <= limit {
                prop_assert!(next.abs_diff(current) <= 1);
            }
            if pending > thresh {
                prop_assert!(next >= current.min(limit));
            }
            if pending < thresh / 2 {
                prop_assert!(next <= current);
            }
        }
    }
}

//! Work items
//!
//! A `Work` bundles a primary function with an optional ordered-completion
//! function and an optional ordered-free function. Submitting it moves it
//! into the engine, so an item cannot be queued twice and its priority
//! cannot change once it is in flight. A `WorkHandle` observes the item
//! after submission.
//!
//! Lifecycle per pool:
//!
//! ```text
//! CREATED -> QUEUED -> RUNNING -> DONE -> [ORDER_DONE] -> FREED
//! ```
//!
//! The bracketed step only applies to items with an ordered function.

use std::fmt;
use std::sync::{Arc, OnceLock};

use asyncwq_core::flags::{AtomicWorkFlags, Priority, WorkFlags, WorkState};
use asyncwq_core::spinlock::SpinLock;

use crate::owner::Owner;
use crate::pool::PoolTag;

/// Callback type for all three work functions
pub type WorkFn = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Callbacks {
    func: Option<WorkFn>,
    ordered_func: Option<WorkFn>,
    ordered_free: Option<WorkFn>,
}

/// Engine-side state of a work item, shared with its handles
pub(crate) struct WorkInner {
    callbacks: SpinLock<Callbacks>,
    flags: AtomicWorkFlags,
    ordered: bool,
    /// Pool the item was queued on; set once at submission
    pool: OnceLock<Arc<PoolTag>>,
}

impl WorkInner {
    #[inline]
    pub(crate) fn is_ordered(&self) -> bool {
        self.ordered
    }

    #[inline]
    pub(crate) fn flags(&self) -> &AtomicWorkFlags {
        &self.flags
    }

    pub(crate) fn mark_queued(&self, tag: Arc<PoolTag>) {
        let fresh = self.pool.set(tag).is_ok();
        debug_assert!(fresh, "work queued twice");
        self.flags.set(WorkFlags::QUEUED);
    }

    pub(crate) fn run_func(&self) {
        self.flags.set(WorkFlags::RUNNING);
        let func = self.callbacks.lock().func.take();
        if let Some(func) = func {
            func();
        }
    }

    pub(crate) fn run_ordered_func(&self) {
        let func = self.callbacks.lock().ordered_func.take();
        if let Some(func) = func {
            func();
        }
    }

    /// Mark the item freed, invoking its ordered-free function if it is
    /// an ordered item. Unordered items drop theirs uncalled.
    pub(crate) fn release(&self) {
        let free = self.callbacks.lock().ordered_free.take();
        if let Some(free) = free.filter(|_| self.ordered) {
            free();
        }
        self.flags.set(WorkFlags::FREED);
    }

    pub(crate) fn tag(&self) -> Option<&Arc<PoolTag>> {
        self.pool.get()
    }
}

/// A unit of deferred work
pub struct Work {
    inner: Arc<WorkInner>,
}

impl Work {
    /// Build a work item. All flags start cleared.
    ///
    /// `ordered_free` is only ever called for items that also have an
    /// `ordered_func`.
    pub fn init(func: WorkFn, ordered_func: Option<WorkFn>, ordered_free: Option<WorkFn>) -> Self {
        let ordered = ordered_func.is_some();
        Self {
            inner: Arc::new(WorkInner {
                callbacks: SpinLock::new(Callbacks {
                    func: Some(func),
                    ordered_func,
                    ordered_free,
                }),
                flags: AtomicWorkFlags::new(),
                ordered,
                pool: OnceLock::new(),
            }),
        }
    }

    /// Work with only a primary function
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::init(Box::new(func), None, None)
    }

    /// Work whose completion is delivered in submission order
    pub fn with_ordered<F, O, R>(func: F, ordered_func: O, ordered_free: R) -> Self
    where
        F: FnOnce() + Send + 'static,
        O: FnOnce() + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        Self::init(
            Box::new(func),
            Some(Box::new(ordered_func)),
            Some(Box::new(ordered_free)),
        )
    }

    /// Route this item to the high-priority pool, if the workqueue has one
    pub fn set_high_priority(&mut self) {
        self.inner.flags.set(WorkFlags::HIGH_PRIO);
    }

    #[inline]
    pub fn is_high_priority(&self) -> bool {
        self.inner.flags.contains(WorkFlags::HIGH_PRIO)
    }

    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.inner.ordered
    }

    /// Observer for this item that stays valid after submission
    pub fn handle(&self) -> WorkHandle {
        WorkHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    pub(crate) fn into_inner(self) -> Arc<WorkInner> {
        self.inner
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Work")
            .field("ordered", &self.inner.ordered)
            .field("flags", &self.inner.flags.load())
            .finish()
    }
}

/// Read-only view of a submitted work item
///
/// Offers no wait or cancel; producers synchronize through their own
/// state or `Workqueue::flush`.
#[derive(Clone)]
pub struct WorkHandle {
    inner: Arc<WorkInner>,
}

impl WorkHandle {
    pub(crate) fn from_inner(inner: Arc<WorkInner>) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn flags(&self) -> WorkFlags {
        self.inner.flags.load()
    }

    #[inline]
    pub fn state(&self) -> WorkState {
        WorkState::from_flags(self.flags())
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.inner.flags.contains(WorkFlags::DONE)
    }

    #[inline]
    pub fn is_high_priority(&self) -> bool {
        self.inner.flags.contains(WorkFlags::HIGH_PRIO)
    }

    /// Priority class of the pool the item was queued on
    pub fn priority(&self) -> Option<Priority> {
        self.inner.tag().map(|tag| tag.priority)
    }

    /// Name of the pool the item was queued on
    pub fn pool_name(&self) -> Option<&str> {
        self.inner.tag().map(|tag| &*tag.name)
    }

    /// Owner of the workqueue the item was queued on
    pub fn owner(&self) -> Option<&Owner> {
        self.inner.tag().map(|tag| &tag.owner)
    }

    /// True if both handles observe the same item
    pub fn ptr_eq(&self, other: &WorkHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for WorkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkHandle")
            .field("state", &self.state())
            .field("priority", &self.priority())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_init_clears_flags() {
        let work = Work::new(|| {});
        assert!(!work.is_ordered());
        assert!(!work.is_high_priority());
        assert_eq!(work.handle().state(), WorkState::Created);
        assert!(work.handle().priority().is_none());
        assert!(work.handle().owner().is_none());
    }

    #[test]
    fn test_set_high_priority() {
        let mut work = Work::with_ordered(|| {}, || {}, || {});
        work.set_high_priority();
        assert!(work.is_ordered());
        assert!(work.is_high_priority());
        assert!(work.handle().is_high_priority());
        assert_eq!(work.handle().state(), WorkState::Created);
    }

    #[test]
    fn test_callbacks_run_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (a, b, c) = (Arc::clone(&calls), Arc::clone(&calls), Arc::clone(&calls));
        let work = Work::with_ordered(
            move || {
                a.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                b.fetch_add(10, Ordering::SeqCst);
            },
            move || {
                c.fetch_add(100, Ordering::SeqCst);
            },
        );
        let handle = work.handle();
        let inner = work.into_inner();

        for _ in 0..2 {
            inner.run_func();
            inner.run_ordered_func();
            inner.release();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 111);
        assert_eq!(handle.state(), WorkState::Freed);
    }
}

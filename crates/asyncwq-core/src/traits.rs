//! Executor traits
//!
//! These traits define the interface between the workqueue engine and
//! whatever thread pool actually runs its jobs. The default implementation
//! is `asyncwq_runtime::ThreadPool`.

use std::sync::Arc;

use crate::error::WqResult;
use crate::flags::Priority;

/// A unit of execution handed to an executor
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A concurrent thread pool with an adjustable active-worker ceiling.
///
/// **Contract:**
/// - `queue()` must NEVER block the caller. It is called from the
///   engine's submission fast path.
/// - At most `max_active()` jobs run concurrently.
/// - `drain()` and `shutdown()` block. They must not be called from a
///   job running on the same executor.
pub trait Executor: Send + Sync {
    /// Queue a job for asynchronous execution
    fn queue(&self, job: Job);

    /// Change the number of jobs allowed to run concurrently (>= 1)
    ///
    /// May block briefly (e.g. to spawn threads). Never called with
    /// engine locks held.
    fn set_max_active(&self, max_active: usize);

    /// Current concurrency ceiling
    fn max_active(&self) -> usize;

    /// Block until every job queued so far has finished
    fn drain(&self);

    /// Drain, then stop all workers. Idempotent.
    fn shutdown(&self);
}

/// Creates executors for workqueue pools
pub trait ExecutorFactory: Send + Sync {
    /// Build an executor named `name` running `max_active` jobs at once.
    ///
    /// `priority` lets the factory give high-priority pools preferential
    /// OS scheduling.
    fn create(
        &self,
        name: &str,
        max_active: usize,
        priority: Priority,
    ) -> WqResult<Arc<dyn Executor>>;
}

//! Hand-stepped executor for deterministic engine tests
//!
//! Jobs sit in a queue until the test runs them, so tests control exactly
//! when each item is dispatched and in which order primaries complete.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use asyncwq_core::error::{WqError, WqResult};
use asyncwq_core::flags::Priority;
use asyncwq_core::traits::{Executor, ExecutorFactory, Job};

#[derive(Default)]
pub(crate) struct ManualExecutor {
    pub(crate) name: String,
    pub(crate) priority: Option<Priority>,
    jobs: Mutex<VecDeque<Job>>,
    max_active: AtomicUsize,
    resizes: Mutex<Vec<usize>>,
    shut_down: AtomicBool,
}

impl ManualExecutor {
    pub(crate) fn new(name: &str, max_active: usize, priority: Priority) -> Self {
        Self {
            name: name.to_string(),
            priority: Some(priority),
            max_active: AtomicUsize::new(max_active),
            ..Default::default()
        }
    }

    /// Run the oldest queued job; false if none
    pub(crate) fn run_one(&self) -> bool {
        let job = self.jobs.lock().unwrap().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    pub(crate) fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Remove all queued jobs so the test can run them in any order
    pub(crate) fn take_jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().drain(..).collect()
    }

    pub(crate) fn queued(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Every value passed to `set_max_active`, in call order
    pub(crate) fn resizes(&self) -> Vec<usize> {
        self.resizes.lock().unwrap().clone()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Executor for ManualExecutor {
    fn queue(&self, job: Job) {
        self.jobs.lock().unwrap().push_back(job);
    }

    fn set_max_active(&self, max_active: usize) {
        self.max_active.store(max_active, Ordering::SeqCst);
        self.resizes.lock().unwrap().push(max_active);
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn drain(&self) {
        self.run_all();
    }

    fn shutdown(&self) {
        self.run_all();
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out `ManualExecutor`s; can be told to fail the n-th
/// creation
#[derive(Default)]
pub(crate) struct ManualFactory {
    created: Mutex<Vec<Arc<ManualExecutor>>>,
    fail_at: Option<usize>,
}

impl ManualFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    pub(crate) fn executor(&self, index: usize) -> Arc<ManualExecutor> {
        Arc::clone(&self.created.lock().unwrap()[index])
    }

    pub(crate) fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl ExecutorFactory for ManualFactory {
    fn create(
        &self,
        name: &str,
        max_active: usize,
        priority: Priority,
    ) -> WqResult<Arc<dyn Executor>> {
        let mut created = self.created.lock().unwrap();
        if self.fail_at == Some(created.len()) {
            return Err(WqError::SpawnFailed(format!("{name}: refused by test")));
        }
        let exec = Arc::new(ManualExecutor::new(name, max_active, priority));
        created.push(Arc::clone(&exec));
        Ok(exec)
    }
}

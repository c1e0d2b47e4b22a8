//! Thread pool with an adjustable active-worker ceiling
//!
//! The default `Executor` behind every workqueue pool. Jobs go into a
//! lock-free MPMC queue; one OS thread per active slot pops and runs
//! them. Raising `max_active` spawns threads, lowering it lets surplus
//! workers retire once they finish their current job.
//!
//! Queueing never blocks: a ticket taken under a spinlock, a `SegQueue`
//! push and a futex wake.
//!
//! Every job carries a ticket. `drain` snapshots the next ticket on entry
//! and waits only until no job with a smaller ticket is still in flight,
//! so work queued while it waits does not extend the wait.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_queue::SegQueue;

use asyncwq_core::constants::MAX_ACTIVE;
use asyncwq_core::error::{WqError, WqResult};
use asyncwq_core::flags::Priority;
use asyncwq_core::spinlock::SpinLock;
use asyncwq_core::traits::{Executor, ExecutorFactory, Job};
use asyncwq_core::{kdebug, kerror, kwarn};

use crate::config::{defaults, ThreadPoolConfig};
use crate::parking::{new_parking, WorkerParking};

thread_local! {
    /// Address of the `Shared` this thread works for (0 = not a worker)
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

/// Tickets of queued and running jobs
#[derive(Default)]
struct Tickets {
    next: u64,
    in_flight: BTreeSet<u64>,
}

impl Tickets {
    /// True once every job ticketed before `target` has finished
    fn reached(&self, target: u64) -> bool {
        self.in_flight.first().map_or(true, |&oldest| oldest >= target)
    }
}

/// State shared between the pool handle and its workers
struct Shared {
    config: ThreadPoolConfig,
    queue: SegQueue<(u64, Job)>,
    tickets: SpinLock<Tickets>,
    /// Threads blocked in `drain`
    drainers: AtomicUsize,
    parking: Box<dyn WorkerParking>,
    max_active: AtomicUsize,
    /// Worker threads currently alive
    live: AtomicUsize,
    /// Monotonic id for thread names
    spawned: AtomicUsize,
    /// Jobs queued or running
    outstanding: AtomicUsize,
    idle: Mutex<()>,
    idle_cv: Condvar,
    shutdown: AtomicBool,
    executed: AtomicU64,
    panicked: AtomicU64,
    resizes: AtomicU64,
}

impl Shared {
    fn addr(&self) -> usize {
        self as *const Shared as usize
    }

    fn idle_lock(&self) -> MutexGuard<'_, ()> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a retirement slot if more workers are alive than allowed
    fn try_retire(&self) -> bool {
        let mut live = self.live.load(Ordering::Acquire);
        loop {
            if live <= self.max_active.load(Ordering::Acquire) {
                return false;
            }
            match self.live.compare_exchange_weak(
                live,
                live - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
    }

    fn take_ticket(&self) -> u64 {
        let mut tickets = self.tickets.lock();
        let ticket = tickets.next;
        tickets.next += 1;
        tickets.in_flight.insert(ticket);
        ticket
    }

    fn run(&self, ticket: u64, job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            self.panicked.fetch_add(1, Ordering::Relaxed);
            kerror!("{}: job panicked", self.config.name);
        }
        self.executed.fetch_add(1, Ordering::Relaxed);
        self.finish_one(ticket);
    }

    fn finish_one(&self, ticket: u64) {
        self.tickets.lock().in_flight.remove(&ticket);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);

        // Pairs with the fence in `drain`: either we see the drainer or
        // it sees our ticket gone
        atomic::fence(Ordering::SeqCst);
        if self.drainers.load(Ordering::Relaxed) != 0 {
            let _guard = self.idle_lock();
            self.idle_cv.notify_all();
        }
    }
}

/// Worker thread main loop
fn worker_loop(shared: Arc<Shared>) {
    CURRENT_POOL.with(|cell| cell.set(shared.addr()));
    apply_nice(shared.config.nice);

    let mut spins = 0u32;
    loop {
        if shared.try_retire() {
            kdebug!("{}: worker retired", shared.config.name);
            // A wake aimed at us may have been for a queued job
            if !shared.queue.is_empty() {
                shared.parking.unpark_one();
            }
            return;
        }

        if let Some((ticket, job)) = shared.queue.pop() {
            spins = 0;
            shared.run(ticket, job);
            continue;
        }

        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        if spins < shared.config.idle_spins {
            spins += 1;
            std::hint::spin_loop();
            continue;
        }
        spins = 0;

        let token = shared.parking.prepare_park();
        if !shared.queue.is_empty()
            || shared.shutdown.load(Ordering::Acquire)
            || shared.live.load(Ordering::Acquire) > shared.max_active.load(Ordering::Acquire)
        {
            continue;
        }
        shared.parking.park(token, Some(shared.config.park_timeout));
    }

    shared.live.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(target_os = "linux")]
fn apply_nice(nice: Option<i32>) {
    let Some(nice) = nice else { return };
    let tid = nix::unistd::gettid();
    // Safety: plain syscall on our own thread id
    let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid.as_raw() as libc::id_t, nice) };
    if ret != 0 {
        kdebug!(
            "setpriority({}) for tid {} failed: {}",
            nice,
            tid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_nice(_nice: Option<i32>) {}

/// OS thread pool implementing `Executor`
pub struct ThreadPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Create a pool and start `config.max_active` workers.
    ///
    /// Fails if the config is invalid or a worker thread cannot be
    /// spawned; workers started before the failure are torn down.
    pub fn new(config: ThreadPoolConfig) -> WqResult<Self> {
        config.validate()?;

        let initial = config.max_active;
        let pool = ThreadPool {
            shared: Arc::new(Shared {
                max_active: AtomicUsize::new(initial),
                queue: SegQueue::new(),
                tickets: SpinLock::new(Tickets::default()),
                drainers: AtomicUsize::new(0),
                parking: new_parking(),
                live: AtomicUsize::new(0),
                spawned: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
                idle: Mutex::new(()),
                idle_cv: Condvar::new(),
                shutdown: AtomicBool::new(false),
                executed: AtomicU64::new(0),
                panicked: AtomicU64::new(0),
                resizes: AtomicU64::new(0),
                config,
            }),
            handles: Mutex::new(Vec::with_capacity(initial)),
        };

        for _ in 0..initial {
            // On error `pool` drops here, joining what was started
            pool.spawn_worker()?;
        }

        kdebug!("{}: thread pool started, max_active={}", pool.name(), initial);
        Ok(pool)
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_worker(&self) -> WqResult<()> {
        if self.is_shutdown() {
            return Err(WqError::ShutDown);
        }
        let id = self.shared.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder = thread::Builder::new().name(format!("{}/{}", self.shared.config.name, id));
        if self.shared.config.stack_size != 0 {
            builder = builder.stack_size(self.shared.config.stack_size);
        }

        self.shared.live.fetch_add(1, Ordering::AcqRel);
        let shared = Arc::clone(&self.shared);
        match builder.spawn(move || worker_loop(shared)) {
            Ok(handle) => {
                let mut handles = self.handles();
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.live.fetch_sub(1, Ordering::AcqRel);
                Err(e.into())
            }
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Worker threads currently alive
    #[inline]
    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::Relaxed)
    }

    /// Jobs queued or running
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// Number of `set_max_active` calls so far
    #[inline]
    pub fn resize_count(&self) -> u64 {
        self.shared.resizes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// True when called from one of this pool's workers
    #[inline]
    pub fn is_current_worker(&self) -> bool {
        CURRENT_POOL.with(|cell| cell.get()) == self.shared.addr()
    }
}

impl Executor for ThreadPool {
    fn queue(&self, job: Job) {
        if self.is_shutdown() {
            kerror!("{}: job queued after shutdown, dropped", self.name());
            return;
        }
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        let ticket = self.shared.take_ticket();
        self.shared.queue.push((ticket, job));
        self.shared.parking.unpark_one();
    }

    fn set_max_active(&self, max_active: usize) {
        let max_active = max_active.clamp(1, MAX_ACTIVE);
        let old = self.shared.max_active.swap(max_active, Ordering::AcqRel);
        self.shared.resizes.fetch_add(1, Ordering::Relaxed);
        if self.is_shutdown() || old == max_active {
            return;
        }
        kdebug!("{}: max_active {} -> {}", self.name(), old, max_active);

        let live = self.shared.live.load(Ordering::Acquire);
        if max_active > live {
            for _ in live..max_active {
                if let Err(e) = self.spawn_worker() {
                    kwarn!("{}: could not grow to {} workers: {}", self.name(), max_active, e);
                    break;
                }
            }
        } else {
            self.shared.parking.unpark_all();
        }
    }

    fn max_active(&self) -> usize {
        self.shared.max_active.load(Ordering::Acquire)
    }

    fn drain(&self) {
        if self.is_current_worker() {
            kerror!("{}: drain from own worker would deadlock, skipped", self.name());
            return;
        }
        let shared = &self.shared;
        let target = shared.tickets.lock().next;

        shared.drainers.fetch_add(1, Ordering::Relaxed);
        atomic::fence(Ordering::SeqCst);
        let mut guard = shared.idle_lock();
        while !shared.tickets.lock().reached(target) {
            guard = shared
                .idle_cv
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(guard);
        shared.drainers.fetch_sub(1, Ordering::Relaxed);
    }

    fn shutdown(&self) {
        self.drain();
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.parking.unpark_all();

        let handles = std::mem::take(&mut *self.handles());
        let me = thread::current().id();
        for handle in handles {
            if handle.thread().id() != me {
                let _ = handle.join();
            }
        }
        kdebug!(
            "{}: thread pool stopped, executed={} panicked={}",
            self.name(),
            self.executed(),
            self.panicked()
        );
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds a `ThreadPool` per workqueue pool from a base config
#[derive(Debug, Clone, Default)]
pub struct ThreadPoolFactory {
    base: ThreadPoolConfig,
}

impl ThreadPoolFactory {
    pub fn new(base: ThreadPoolConfig) -> Self {
        Self { base }
    }

    pub fn from_env() -> Self {
        Self::new(ThreadPoolConfig::from_env())
    }

    pub fn base(&self) -> &ThreadPoolConfig {
        &self.base
    }
}

impl ExecutorFactory for ThreadPoolFactory {
    fn create(
        &self,
        name: &str,
        max_active: usize,
        priority: Priority,
    ) -> WqResult<Arc<dyn Executor>> {
        let nice = if priority.is_high() {
            Some(defaults::HIGH_PRIORITY_NICE)
        } else {
            self.base.nice
        };
        let config = self
            .base
            .clone()
            .name(name)
            .max_active(max_active)
            .nice(nice);
        Ok(Arc::new(ThreadPool::new(config)?))
    }
}

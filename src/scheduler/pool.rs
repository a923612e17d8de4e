//! Fork-Join Worker Pool
//!
//! # Architecture
//!
//! ```text
//!   caller thread (member 0)            worker threads (members 1..T)
//!          │                                     │
//!          │ broadcast(job)                      │ spin → yield → park
//!          │  1. publish job, pending = T-1      │
//!          │  2. epoch += 1, unpark all  ───────►│ epoch changed
//!          │  3. run job(0)                      │ run job(id)
//!          │  4. wait pending == 0   ◄───────────│ pending -= 1
//!          │  5. clear job, re-raise panics      │
//!          ▼                                     ▼
//! ```
//!
//! - The team is created once; a parallel region costs one epoch bump and
//!   T-1 wakeups, not T-1 thread spawns.
//! - `broadcast` is a full barrier: it returns only after every member has
//!   finished the job, so the job may borrow from the caller's stack.
//! - Regions are serialized per pool; nested regions are rejected.
//!
//! # Correctness Invariants
//!
//! - **Each member runs each job exactly once**: a worker cannot miss an
//!   epoch because the next broadcast cannot start before it decremented
//!   `pending` for the current one.
//! - **Visibility**: members decrement `pending` with `AcqRel`; the caller
//!   observes zero with `Acquire`, so all writes made inside the job
//!   happen-before `broadcast` returns.
//! - **Panic isolation**: panics are caught per member; the first one is
//!   re-raised on the caller after the barrier.

use super::worker_id::{set_current_worker_id, WorkerIdGuard};
use crossbeam_utils::sync::{Parker, Unparker};
use crossbeam_utils::{Backoff, CachePadded};
use std::any::Any;
use std::cell::Cell;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Worker pool configuration.
///
/// | Knob         | Trade-off                                              |
/// |--------------|--------------------------------------------------------|
/// | spin_iters   | back-to-back regions wake faster vs. idle CPU burn     |
/// | park_timeout | responsiveness if an unpark is missed vs. wakeups      |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Team size including the calling thread.
    pub workers: usize,

    /// Spin iterations before a worker starts parking between regions.
    pub spin_iters: u32,

    /// Park timeout once spinning gave up.
    pub park_timeout: Duration,

    /// Pin worker `i` to core `i % cores` (requires the `affinity` feature).
    pub pin_threads: bool,
}

impl PoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.workers > 0, "workers must be > 0");
        assert!(self.spin_iters > 0, "spin_iters must be > 0");
        assert!(
            self.park_timeout > Duration::ZERO,
            "park_timeout must be > 0"
        );
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            spin_iters: 4096,
            park_timeout: Duration::from_micros(100),
            pin_threads: false,
        }
    }
}

// ============================================================================
// Job handoff
// ============================================================================

thread_local! {
    static IN_REGION: Cell<bool> = const { Cell::new(false) };
}

struct RegionGuard;

impl RegionGuard {
    fn enter() -> Self {
        IN_REGION.with(|r| r.set(true));
        RegionGuard
    }
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        IN_REGION.with(|r| r.set(false));
    }
}

/// Lifetime-erased pointer to the job of the current region.
#[derive(Clone, Copy)]
struct JobRef {
    ptr: *const (dyn Fn(usize) + Sync + 'static),
}

// SAFETY: the pointee is `Sync`, and `broadcast` guarantees it outlives
// every dereference (see `JobRef::erase`).
unsafe impl Send for JobRef {}
unsafe impl Sync for JobRef {}

impl JobRef {
    /// # Safety
    ///
    /// The caller must keep `job` alive until every member has returned
    /// from [`JobRef::call`].
    unsafe fn erase<'a>(job: &'a (dyn Fn(usize) + Sync + 'a)) -> Self {
        let job: &'static (dyn Fn(usize) + Sync + 'static) = std::mem::transmute(job);
        Self { ptr: job }
    }

    /// # Safety
    ///
    /// Only valid while the broadcast that produced this ref is in flight.
    unsafe fn call(self, worker: usize) {
        (*self.ptr)(worker)
    }
}

struct Shared {
    /// Job of the region in flight, `None` between regions.
    job: Mutex<Option<JobRef>>,
    /// Bumped once per region; workers compare against the last one they ran.
    epoch: CachePadded<AtomicU64>,
    /// Workers that have not finished the current region.
    pending: CachePadded<AtomicUsize>,
    shutdown: AtomicBool,
    unparkers: Vec<Unparker>,
    /// First panic captured from any worker in the current region.
    panic: Mutex<Option<Box<dyn Any + Send + 'static>>>,
}

impl Shared {
    fn unpark_all(&self) {
        for u in &self.unparkers {
            u.unpark();
        }
    }

    fn record_panic(&self, p: Box<dyn Any + Send + 'static>) {
        let mut guard = self.panic.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(p);
        }
    }
}

// ============================================================================
// WorkerPool
// ============================================================================

/// Persistent fork-join team.
///
/// # Example
///
/// ```
/// use loop_sched::scheduler::{PoolConfig, WorkerPool};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let pool = WorkerPool::new(PoolConfig::with_workers(4)).unwrap();
/// let hits = AtomicUsize::new(0);
/// pool.broadcast(|_worker| {
///     hits.fetch_add(1, Ordering::Relaxed);
/// });
/// assert_eq!(hits.load(Ordering::Relaxed), 4);
/// ```
pub struct WorkerPool {
    cfg: PoolConfig,
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    dispatch: Mutex<()>,
}

impl WorkerPool {
    /// Spawn `cfg.workers - 1` worker threads.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a worker thread cannot be spawned. Workers
    /// spawned before the failure are shut down.
    pub fn new(cfg: PoolConfig) -> io::Result<Self> {
        cfg.validate();

        let spawned = cfg.workers - 1;
        let mut parkers = Vec::with_capacity(spawned);
        let mut unparkers = Vec::with_capacity(spawned);
        for _ in 0..spawned {
            let p = Parker::new();
            unparkers.push(p.unparker().clone());
            parkers.push(p);
        }

        let shared = Arc::new(Shared {
            job: Mutex::new(None),
            epoch: CachePadded::new(AtomicU64::new(0)),
            pending: CachePadded::new(AtomicUsize::new(0)),
            shutdown: AtomicBool::new(false),
            unparkers,
            panic: Mutex::new(None),
        });

        let mut pool = Self {
            cfg,
            shared,
            threads: Vec::with_capacity(spawned),
            dispatch: Mutex::new(()),
        };

        for (i, parker) in parkers.into_iter().enumerate() {
            let worker_id = i + 1;
            let shared = Arc::clone(&pool.shared);
            let th = thread::Builder::new()
                .name(format!("loop-worker-{worker_id}"))
                .spawn(move || {
                    #[cfg(feature = "affinity")]
                    if cfg.pin_threads {
                        pin_current_thread(worker_id);
                    }
                    worker_loop(worker_id, cfg, &shared, &parker);
                })?;
            pool.threads.push(th);
        }

        tracing::debug!(
            workers = cfg.workers,
            pin_threads = cfg.pin_threads,
            "worker pool started"
        );
        Ok(pool)
    }

    /// Team size, including the calling thread.
    #[inline]
    pub fn workers(&self) -> usize {
        self.cfg.workers
    }

    pub fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    /// Number of parallel regions run so far (single-member pools run
    /// regions inline and do not count them).
    pub fn regions(&self) -> u64 {
        self.shared.epoch.load(Ordering::Relaxed)
    }

    /// Run `job(member_id)` once on every team member and wait for all.
    ///
    /// The calling thread is member 0.
    ///
    /// # Panics
    ///
    /// - If called from inside a running job (nested regions).
    /// - Re-raises the first panic raised by any member, after all members
    ///   have finished.
    pub fn broadcast<F>(&self, job: F)
    where
        F: Fn(usize) + Sync,
    {
        assert!(
            !IN_REGION.with(|r| r.get()),
            "nested parallel regions are not supported"
        );

        if self.threads.is_empty() {
            let _id = WorkerIdGuard::enter(0);
            let _region = RegionGuard::enter();
            job(0);
            return;
        }

        let _serial = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);

        let job_ref: &(dyn Fn(usize) + Sync) = &job;
        // SAFETY: `job` lives on this frame, and this function does not
        // return or unwind before `wait_for_workers` saw every worker finish.
        let erased = unsafe { JobRef::erase(job_ref) };

        *self.shared.job.lock().unwrap_or_else(PoisonError::into_inner) = Some(erased);
        self.shared
            .pending
            .store(self.threads.len(), Ordering::Release);
        self.shared.epoch.fetch_add(1, Ordering::Release);
        self.shared.unpark_all();

        let caller = {
            let _id = WorkerIdGuard::enter(0);
            let _region = RegionGuard::enter();
            panic::catch_unwind(AssertUnwindSafe(|| job(0)))
        };

        self.wait_for_workers();
        *self.shared.job.lock().unwrap_or_else(PoisonError::into_inner) = None;

        if let Err(p) = caller {
            // Drop whatever the workers captured; the caller's panic wins.
            self.shared
                .panic
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            panic::resume_unwind(p);
        }
        let worker_panic = self
            .shared
            .panic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(p) = worker_panic {
            panic::resume_unwind(p);
        }
    }

    fn wait_for_workers(&self) {
        let backoff = Backoff::new();
        while self.shared.pending.load(Ordering::Acquire) != 0 {
            if backoff.is_completed() {
                thread::yield_now();
            } else {
                backoff.snooze();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.unpark_all();
        for th in self.threads.drain(..) {
            // Jobs never unwind out of a worker; a join error is a bug in the loop itself.
            if th.join().is_err() {
                tracing::error!("worker thread exited abnormally");
            }
        }
        tracing::debug!(workers = self.cfg.workers, "worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("cfg", &self.cfg)
            .field("regions", &self.regions())
            .finish()
    }
}

// ============================================================================
// Worker loop
// ============================================================================

/// Wait for a new epoch, run the job, report completion.
///
/// Idle strategy matches the executor convention: spin with `spin_loop()`,
/// yield every 16th round after the spin budget, then park with timeout.
fn worker_loop(worker_id: usize, cfg: PoolConfig, shared: &Shared, parker: &Parker) {
    set_current_worker_id(Some(worker_id));

    let mut seen_epoch = 0u64;
    let mut idle_rounds = 0u32;

    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let epoch = shared.epoch.load(Ordering::Acquire);
        if epoch != seen_epoch {
            seen_epoch = epoch;
            idle_rounds = 0;

            let job = *shared.job.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(job) = job {
                let _region = RegionGuard::enter();
                // SAFETY: the broadcasting caller waits for `pending` to hit
                // zero before the job's borrow ends.
                let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe { job.call(worker_id) }));
                if let Err(p) = result {
                    shared.record_panic(p);
                }
            }
            shared.pending.fetch_sub(1, Ordering::AcqRel);
            continue;
        }

        idle_rounds = idle_rounds.saturating_add(1);
        if idle_rounds <= cfg.spin_iters {
            std::hint::spin_loop();
            continue;
        }
        if (idle_rounds & 0xF) == 0 {
            thread::yield_now();
        }
        parker.park_timeout(cfg.park_timeout);
    }

    set_current_worker_id(None);
}

#[cfg(feature = "affinity")]
fn pin_current_thread(worker_id: usize) {
    let cores = match core_affinity::get_core_ids() {
        Some(v) if !v.is_empty() => v,
        _ => {
            tracing::warn!(worker_id, "failed to get core ids, skipping affinity");
            return;
        }
    };
    let core = cores[worker_id % cores.len()];
    if !core_affinity::set_for_current(core) {
        tracing::warn!(worker_id, core = core.id, "failed to pin worker");
    }
}

// ============================================================================
// Tests
// ============================================================================

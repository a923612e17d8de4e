//! Loop runtime: schedule + worker team behind one parallel-for seam.
//!
//! The kernels never see a schedule or a thread. They hand a range and a
//! chunk body to a [`LoopScheduler`]; which policy splits the range, and on
//! how many threads, is decided here from the environment.

use super::partition::{cyclic_chunks, static_block, ChunkCursor};
use super::pool::{PoolConfig, WorkerPool};
use super::schedule::{Schedule, ScheduleKind};
use crate::error::{ConfigError, ConfigResult};
use serde::Serialize;
use std::fmt;
use std::io;
use std::ops::Range;
use std::sync::Once;

// ============================================================================
// LoopScheduler
// ============================================================================

/// Partition-and-dispatch capability for one parallel loop.
///
/// # Safety
///
/// Implementations must, for every call to [`parallel_for`]:
///
/// - invoke `body` only with non-empty sub-ranges of `range`,
/// - make those sub-ranges pairwise disjoint and cover `range` exactly,
/// - return only after every invocation of `body` has returned.
///
/// Kernels hand out `&mut` access to row `i` inside `body` without locks;
/// a violating implementation causes data races.
///
/// [`parallel_for`]: LoopScheduler::parallel_for
pub unsafe trait LoopScheduler: Sync {
    /// Team size this scheduler distributes over.
    fn team_size(&self) -> usize;

    /// Schedule in effect.
    fn schedule(&self) -> Schedule;

    /// Split `range` into chunks and run `body` on each, possibly in parallel.
    fn parallel_for(&self, range: Range<usize>, body: &(dyn Fn(Range<usize>) + Sync));
}

/// Runs the whole range on the calling thread. Single-thread reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialScheduler;

// SAFETY: one invocation with the full range (or none if empty).
unsafe impl LoopScheduler for SerialScheduler {
    fn team_size(&self) -> usize {
        1
    }

    fn schedule(&self) -> Schedule {
        Schedule::static_blocks()
    }

    fn parallel_for(&self, range: Range<usize>, body: &(dyn Fn(Range<usize>) + Sync)) {
        if !range.is_empty() {
            body(range);
        }
    }
}

// ============================================================================
// RuntimeEnv
// ============================================================================

/// Raw runtime settings, as read from `OMP_*` style variables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeEnv {
    pub num_threads: Option<usize>,
    pub schedule: Option<Schedule>,
    pub proc_bind: bool,
}

impl RuntimeEnv {
    pub const NUM_THREADS_VAR: &'static str = "OMP_NUM_THREADS";
    pub const SCHEDULE_VAR: &'static str = "OMP_SCHEDULE";
    pub const PROC_BIND_VAR: &'static str = "OMP_PROC_BIND";

    /// Read from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary key lookup.
    ///
    /// Empty values count as unset. `OMP_NUM_THREADS` may be a
    /// comma-separated list (one entry per nesting level); only the first
    /// entry applies.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let num_threads = get(Self::NUM_THREADS_VAR)
            .map(|v| {
                let first = v.split(',').next().unwrap_or_default().trim().to_string();
                parse_threads(&first)
            })
            .transpose()?;

        let schedule = get(Self::SCHEDULE_VAR)
            .map(|v| v.parse::<Schedule>())
            .transpose()?;

        let proc_bind = get(Self::PROC_BIND_VAR)
            .map(|v| parse_proc_bind(&v))
            .transpose()?
            .unwrap_or(false);

        Ok(Self {
            num_threads,
            schedule,
            proc_bind,
        })
    }

    /// Team size to use: explicit setting, else processor count.
    pub fn resolved_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(available_processors)
    }

    pub fn resolved_schedule(&self) -> Schedule {
        self.schedule.unwrap_or_default()
    }
}

/// Parse a thread count, rejecting zero.
pub fn parse_threads(s: &str) -> ConfigResult<usize> {
    match s.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidThreads(s.to_string())),
    }
}

fn parse_proc_bind(s: &str) -> ConfigResult<bool> {
    let first = s.split(',').next().unwrap_or_default().trim();
    match first.to_ascii_lowercase().as_str() {
        "false" => Ok(false),
        "true" | "close" | "spread" | "master" | "primary" => Ok(true),
        _ => Err(ConfigError::InvalidProcBind(s.to_string())),
    }
}

/// Logical processors available to this process.
pub fn available_processors() -> usize {
    num_cpus::get().max(1)
}

// ============================================================================
// RuntimeInfo
// ============================================================================

/// Snapshot of the active runtime configuration, for annotating runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    pub threads: usize,
    pub procs: usize,
    pub schedule: ScheduleKind,
    pub chunk: usize,
}

impl RuntimeInfo {
    pub fn of<S: LoopScheduler + ?Sized>(scheduler: &S) -> Self {
        let schedule = scheduler.schedule();
        Self {
            threads: scheduler.team_size(),
            procs: available_processors(),
            schedule: schedule.kind,
            chunk: schedule.effective_chunk(),
        }
    }

    /// What a runtime built from `env` would report, without starting it.
    pub fn from_env(env: &RuntimeEnv) -> Self {
        let schedule = env.resolved_schedule();
        Self {
            threads: env.resolved_threads(),
            procs: available_processors(),
            schedule: schedule.kind,
            chunk: schedule.effective_chunk(),
        }
    }
}

impl fmt::Display for RuntimeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OMP config: threads={} procs={} schedule={} chunk={}",
            self.threads, self.procs, self.schedule, self.chunk
        )
    }
}

// ============================================================================
// LoopRuntime
// ============================================================================

/// Pinning was asked for but this build cannot do it.
fn pinning_unavailable(cfg: &PoolConfig) -> bool {
    cfg.pin_threads && !cfg!(feature = "affinity")
}

/// Worker team plus the schedule it applies to every parallel loop.
#[derive(Debug)]
pub struct LoopRuntime {
    pool: WorkerPool,
    schedule: Schedule,
}

impl LoopRuntime {
    /// Build a runtime with an explicit team size and schedule.
    pub fn new(workers: usize, schedule: Schedule) -> io::Result<Self> {
        Self::with_pool_config(PoolConfig::with_workers(workers), schedule)
    }

    pub fn with_pool_config(cfg: PoolConfig, schedule: Schedule) -> io::Result<Self> {
        if pinning_unavailable(&cfg) {
            static WARNED: Once = Once::new();
            WARNED.call_once(|| {
                tracing::warn!(
                    "{} requested but built without the `affinity` feature; workers are not pinned",
                    RuntimeEnv::PROC_BIND_VAR
                );
            });
        }
        Ok(Self {
            pool: WorkerPool::new(cfg)?,
            schedule,
        })
    }

    /// Build from resolved environment settings.
    pub fn from_runtime_env(env: &RuntimeEnv) -> io::Result<Self> {
        let cfg = PoolConfig {
            workers: env.resolved_threads(),
            pin_threads: env.proc_bind,
            ..PoolConfig::default()
        };
        let runtime = Self::with_pool_config(cfg, env.resolved_schedule())?;
        tracing::debug!(
            threads = runtime.team_size(),
            schedule = %runtime.schedule,
            "loop runtime ready"
        );
        Ok(runtime)
    }

    /// Swap the schedule; the team is kept.
    pub fn set_schedule(&mut self, schedule: Schedule) {
        self.schedule = schedule;
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn info(&self) -> RuntimeInfo {
        RuntimeInfo::of(self)
    }
}

// SAFETY: every branch hands each iteration of `range` to exactly one body
// call: block and cyclic plans are disjoint by construction, and cursor
// claims are disjoint because each successful CAS advances past the chunk
// it returns. `broadcast` returns only after all members are done.
unsafe impl LoopScheduler for LoopRuntime {
    fn team_size(&self) -> usize {
        self.pool.workers()
    }

    fn schedule(&self) -> Schedule {
        self.schedule
    }

    fn parallel_for(&self, range: Range<usize>, body: &(dyn Fn(Range<usize>) + Sync)) {
        if range.is_empty() {
            return;
        }
        let team = self.pool.workers();

        match self.schedule.kind {
            ScheduleKind::Static if self.schedule.chunk > 0 => {
                let chunk = self.schedule.chunk;
                self.pool.broadcast(|w| {
                    for c in cyclic_chunks(range.clone(), chunk, team, w) {
                        body(c);
                    }
                });
            }
            ScheduleKind::Static | ScheduleKind::Auto => {
                self.pool.broadcast(|w| {
                    let block = static_block(range.clone(), team, w);
                    if !block.is_empty() {
                        body(block);
                    }
                });
            }
            ScheduleKind::Dynamic => {
                let chunk = self.schedule.effective_chunk();
                let cursor = ChunkCursor::new(range);
                self.pool.broadcast(|_| {
                    while let Some(c) = cursor.claim(chunk) {
                        body(c);
                    }
                });
            }
            ScheduleKind::Guided => {
                let chunk = self.schedule.effective_chunk();
                let cursor = ChunkCursor::new(range);
                self.pool.broadcast(|_| {
                    while let Some(c) = cursor.claim_guided(chunk, team) {
                        body(c);
                    }
                });
            }
        }
    }
}

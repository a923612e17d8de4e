//! Loop scheduler: fork-join team plus OpenMP-style chunk policies.
//!
//! # Architecture
//!
//! - [`schedule`]: the `(kind, chunk)` model and its `kind[,chunk]` syntax
//! - [`partition`]: pure chunk arithmetic and the shared claim cursor
//! - [`pool`]: persistent worker team, one epoch bump per parallel region
//! - [`runtime`]: the [`LoopScheduler`] seam and environment resolution
//! - [`rusage`]: CPU accounting at phase boundaries
//!
//! The kernels depend only on [`LoopScheduler`]. Everything else here is an
//! implementation of it.

pub mod partition;
pub mod pool;
pub mod runtime;
pub mod rusage;
pub mod schedule;
pub mod worker_id;

pub use partition::{cyclic_chunks, guided_chunk_len, simulate_plan, static_block, ChunkCursor};
pub use pool::{PoolConfig, WorkerPool};
pub use runtime::{
    available_processors, parse_threads, LoopRuntime, LoopScheduler, RuntimeEnv, RuntimeInfo,
    SerialScheduler,
};
pub use rusage::{CpuDelta, CpuSample};
pub use schedule::{Schedule, ScheduleKind};
pub use worker_id::current_worker_id;

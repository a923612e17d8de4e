//! Loop-scheduling benchmark: two imbalanced kernels over a pluggable
//! parallel-for.
//!
//! ## Scope
//! Measures how chunk policies (static blocks, fixed-chunk round-robin,
//! dynamic, guided, auto) cope with two row loops of very different cost
//! shapes. The kernels take a row range and an injected [`LoopScheduler`];
//! the scheduler decides how rows are chunked and which worker runs them.
//!
//! ## Key invariants
//! - Every scheduler hands each row of `[lo, hi)` to exactly one body call.
//!   Rows are mutated through a shared raw view without locks or atomics,
//!   so this is a safety requirement (`unsafe trait LoopScheduler`).
//! - A row's cells are always updated in the same order, so checksums are
//!   bit-identical across schedules and team sizes.
//! - A kernel call returns only after every chunk has finished.
//!
//! ## Flow
//! `RuntimeEnv (OMP_*) -> LoopRuntime -> harness -> kernels -> RunReport`
//!
//! ## Notable entry points
//! - [`Workload`], [`run_kernel_a`], [`run_kernel_b`]: the core.
//! - [`scheduler::LoopRuntime`] / [`scheduler::SerialScheduler`]: schedulers.
//! - [`harness::run_benchmark`], [`harness::run_sweep`]: timed runs.

pub mod config;
pub mod error;
pub mod harness;
pub mod kernels;
pub mod report;
pub mod scheduler;
pub mod workload;

pub use config::{BenchConfig, KernelSelection, Preset, RepsSweepConfig, SweepConfig};
pub use error::{BenchError, ConfigError, ReportError};
pub use kernels::{kernel_a_row, kernel_b_row, run_kernel_a, run_kernel_b, Kernel};
pub use report::{KernelReport, RunReport};
pub use scheduler::{
    LoopRuntime, LoopScheduler, RuntimeEnv, RuntimeInfo, Schedule, ScheduleKind, SerialScheduler,
};
pub use workload::{jmax_for_row, Workload};

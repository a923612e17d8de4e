//! Benchmark parameters.
//!
//! Runtime settings (team size, schedule) live in
//! [`RuntimeEnv`](crate::scheduler::RuntimeEnv). This module covers what
//! the harness does with them: problem size, repetitions, which kernels,
//! and the sweep grids.

use crate::error::{ConfigError, ConfigResult};
use crate::kernels::Kernel;
use crate::scheduler::{available_processors, PoolConfig, RuntimeEnv, ScheduleKind};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Which kernels a run executes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelSelection {
    A,
    B,
    #[default]
    Both,
}

impl KernelSelection {
    /// Kernels in execution order.
    pub const fn kernels(self) -> &'static [Kernel] {
        match self {
            KernelSelection::A => &[Kernel::A],
            KernelSelection::B => &[Kernel::B],
            KernelSelection::Both => &[Kernel::A, Kernel::B],
        }
    }
}

impl FromStr for KernelSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "1" | "loop1" => Ok(KernelSelection::A),
            "b" | "2" | "loop2" => Ok(KernelSelection::B),
            "both" | "all" => Ok(KernelSelection::Both),
            _ => Err(ConfigError::InvalidParameter {
                name: "kernel",
                reason: format!("'{s}' is not one of a, b, both"),
            }),
        }
    }
}

impl fmt::Display for KernelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KernelSelection::A => "a",
            KernelSelection::B => "b",
            KernelSelection::Both => "both",
        })
    }
}

/// Named parameter sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Preset {
    /// `N = 729`, 100 reps.
    #[default]
    Default,
    /// Small and fast, for CI smoke runs.
    Ci,
    /// Large, for publication-grade numbers.
    Paper,
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Preset::Default),
            "ci" => Ok(Preset::Ci),
            "paper" => Ok(Preset::Paper),
            _ => Err(ConfigError::InvalidParameter {
                name: "preset",
                reason: format!("'{s}' is not one of default, ci, paper"),
            }),
        }
    }
}

/// Parameters of one benchmark run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BenchConfig {
    /// Matrix dimension.
    pub n: usize,
    /// Timed kernel calls per kernel.
    pub reps: usize,
    /// Untimed calls before the timed phase. Inputs are re-initialized
    /// after warmup, so checksums do not depend on this.
    pub warmup: usize,
    pub kernels: KernelSelection,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            n: 729,
            reps: 100,
            warmup: 0,
            kernels: KernelSelection::Both,
        }
    }
}

impl BenchConfig {
    pub fn ci() -> Self {
        Self {
            n: 256,
            reps: 10,
            warmup: 1,
            ..Self::default()
        }
    }

    pub fn paper() -> Self {
        Self {
            n: 2048,
            reps: 1000,
            warmup: 2,
            ..Self::default()
        }
    }

    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Default => Self::default(),
            Preset::Ci => Self::ci(),
            Preset::Paper => Self::paper(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.n == 0 {
            return Err(invalid("n", "must be >= 1"));
        }
        if self.n.checked_mul(self.n).is_none() {
            return Err(invalid("n", format!("{} x {} does not fit in memory", self.n, self.n)));
        }
        if self.reps == 0 {
            return Err(invalid("reps", "must be >= 1"));
        }
        Ok(())
    }
}

/// Grid for a schedule-by-size sweep.
///
/// For every size, every kind is run with each listed chunk and then with
/// the runtime default chunk. A single-thread baseline row closes each size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepConfig {
    pub sizes: Vec<usize>,
    pub kinds: Vec<ScheduleKind>,
    pub chunks: Vec<usize>,
    pub threads: usize,
    pub reps: usize,
    pub include_default_chunk: bool,
    pub include_baseline: bool,
    /// Applies to the team and to the baseline pool alike.
    pub pin_threads: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sizes: vec![256, 512, 729, 1024, 1440, 2048, 2880, 4096, 6144, 8192],
            kinds: vec![ScheduleKind::Static, ScheduleKind::Dynamic, ScheduleKind::Guided],
            chunks: vec![1, 16, 64],
            threads: available_processors(),
            reps: 1000,
            include_default_chunk: true,
            include_baseline: true,
            pin_threads: false,
        }
    }
}

impl SweepConfig {
    /// Default grid with team size and pinning taken from `env`. The
    /// schedule in `env` is not used; the grid sets it per point.
    pub fn from_runtime_env(env: &RuntimeEnv) -> Self {
        Self {
            threads: env.resolved_threads(),
            pin_threads: env.proc_bind,
            ..Self::default()
        }
    }

    /// Pool settings for a team of `workers` under this sweep.
    pub fn pool_config(&self, workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            pin_threads: self.pin_threads,
            ..PoolConfig::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.sizes.is_empty() {
            return Err(invalid("sizes", "at least one size is required"));
        }
        if let Some(&bad) = self.sizes.iter().find(|&&n| n == 0) {
            return Err(invalid("sizes", format!("size {bad} must be >= 1")));
        }
        if self.kinds.is_empty() {
            return Err(invalid("schedules", "at least one schedule kind is required"));
        }
        if self.chunks.contains(&0) {
            return Err(invalid(
                "chunks",
                "chunk 0 is the runtime default; it is always included",
            ));
        }
        if self.threads == 0 {
            return Err(invalid("threads", "must be >= 1"));
        }
        if self.reps == 0 {
            return Err(invalid("reps", "must be >= 1"));
        }
        Ok(())
    }

    /// Number of measured points, baseline included.
    pub fn points(&self) -> usize {
        let per_kind = self.chunks.len() + usize::from(self.include_default_chunk);
        self.sizes.len() * (self.kinds.len() * per_kind + usize::from(self.include_baseline))
    }
}

/// Grid for a single-thread repetition-count sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepsSweepConfig {
    pub n: usize,
    pub reps_values: Vec<usize>,
    pub pin_threads: bool,
}

impl Default for RepsSweepConfig {
    fn default() -> Self {
        Self {
            n: 2048,
            reps_values: vec![1, 5, 10, 50, 100, 200],
            pin_threads: false,
        }
    }
}

impl RepsSweepConfig {
    /// Pool settings for the single-thread team.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: 1,
            pin_threads: self.pin_threads,
            ..PoolConfig::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.n == 0 {
            return Err(invalid("n", "must be >= 1"));
        }
        if self.reps_values.is_empty() || self.reps_values.contains(&0) {
            return Err(invalid("reps", "need a non-empty list of values >= 1"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

//! Timed benchmark phases, single runs and sweeps.
//!
//! # Timed phase
//!
//! ```text
//! init -> warmup reps (untimed) -> init again -> reps (timed) -> checksum
//! ```
//!
//! Kernel A runs before Kernel B and both share one [`Workload`]: Kernel B's
//! init overwrites B, exactly as a sequential program with global arrays
//! would. Every timed rep covers the full range `[0, n)`.

use crate::config::{BenchConfig, RepsSweepConfig, SweepConfig};
use crate::error::{BenchError, ConfigResult};
use crate::kernels::Kernel;
use crate::report::{
    ChunkLabel, CsvWriter, KernelReport, RepsRow, RunReport, ScheduleLabel, SweepRow,
    REPS_CSV_HEADER, SWEEP_CSV_HEADER,
};
use crate::scheduler::{
    CpuSample, LoopRuntime, LoopScheduler, PoolConfig, RuntimeInfo, Schedule,
};
use crate::workload::Workload;
use std::io::Write;
use std::time::{Duration, Instant};

/// Run one kernel's timed phase on an existing workload.
pub fn time_kernel<S>(
    workload: &mut Workload,
    kernel: Kernel,
    cfg: &BenchConfig,
    scheduler: &S,
) -> KernelReport
where
    S: LoopScheduler + ?Sized,
{
    let n = workload.n();

    kernel.init(workload);
    if cfg.warmup > 0 {
        for _ in 0..cfg.warmup {
            kernel.run(workload, 0, n, scheduler);
        }
        kernel.init(workload);
    }

    let mut rep_times = Vec::with_capacity(cfg.reps);
    let cpu_before = CpuSample::now();
    let start = Instant::now();
    for _ in 0..cfg.reps {
        let rep_start = Instant::now();
        kernel.run(workload, 0, n, scheduler);
        rep_times.push(rep_start.elapsed());
    }
    let total = start.elapsed();
    let cpu = CpuSample::now().since(&cpu_before);

    let checksum = kernel.checksum(workload);
    tracing::debug!(
        kernel = %kernel,
        n,
        reps = cfg.reps,
        total_s = total.as_secs_f64(),
        checksum,
        "timed phase done"
    );
    KernelReport::new(kernel, checksum, total, rep_times, cpu)
}

/// Run the selected kernels on a caller-owned workload of size `cfg.n`.
///
/// # Panics
/// Panics if `workload.n() != cfg.n`.
pub fn run_benchmark_on<S>(workload: &mut Workload, cfg: &BenchConfig, scheduler: &S) -> RunReport
where
    S: LoopScheduler + ?Sized,
{
    assert_eq!(workload.n(), cfg.n, "workload size does not match config");
    let runtime = RuntimeInfo::of(scheduler);
    tracing::info!(n = cfg.n, reps = cfg.reps, warmup = cfg.warmup, %runtime, "benchmark start");

    let kernels = cfg
        .kernels
        .kernels()
        .iter()
        .map(|&k| time_kernel(workload, k, cfg, scheduler))
        .collect();

    RunReport {
        runtime,
        config: *cfg,
        kernels,
    }
}

/// Validate `cfg`, allocate a workload and run it.
pub fn run_benchmark<S>(cfg: &BenchConfig, scheduler: &S) -> ConfigResult<RunReport>
where
    S: LoopScheduler + ?Sized,
{
    cfg.validate()?;
    let mut workload = Workload::new(cfg.n);
    Ok(run_benchmark_on(&mut workload, cfg, scheduler))
}

fn start_runtime(cfg: PoolConfig, schedule: Schedule) -> Result<LoopRuntime, BenchError> {
    LoopRuntime::with_pool_config(cfg, schedule).map_err(|source| BenchError::Spawn {
        threads: cfg.workers,
        source,
    })
}

/// The sweep team and, if requested, the single-thread baseline team.
/// Both follow `cfg.pin_threads`.
fn sweep_runtimes(cfg: &SweepConfig) -> Result<(LoopRuntime, Option<LoopRuntime>), BenchError> {
    let team = start_runtime(cfg.pool_config(cfg.threads), Schedule::default())?;
    let baseline = if cfg.include_baseline {
        Some(start_runtime(cfg.pool_config(1), Schedule::default())?)
    } else {
        None
    };
    Ok((team, baseline))
}

fn kernel_totals(report: &RunReport) -> (Duration, Duration) {
    let total = |k| report.kernel(k).map_or(Duration::ZERO, |r| r.total);
    (total(Kernel::A), total(Kernel::B))
}

/// Schedule-by-size sweep. Writes the header and one CSV line per point as
/// it goes, and returns all rows.
pub fn run_sweep<W: Write>(
    cfg: &SweepConfig,
    out: &mut CsvWriter<W>,
) -> Result<Vec<SweepRow>, BenchError> {
    cfg.validate()?;
    tracing::info!(
        sizes = ?cfg.sizes,
        kinds = ?cfg.kinds,
        chunks = ?cfg.chunks,
        threads = cfg.threads,
        pin_threads = cfg.pin_threads,
        reps = cfg.reps,
        points = cfg.points(),
        "sweep start"
    );

    out.line(SWEEP_CSV_HEADER)?;
    let (mut runtime, baseline) = sweep_runtimes(cfg)?;

    let mut rows = Vec::with_capacity(cfg.points());
    for &n in &cfg.sizes {
        let bench = BenchConfig {
            n,
            reps: cfg.reps,
            ..BenchConfig::default()
        };
        let mut workload = Workload::new(n);

        for &kind in &cfg.kinds {
            let labelled = cfg
                .chunks
                .iter()
                .map(|&k| (Schedule::new(kind, k), ChunkLabel::Size(k)))
                .chain(
                    cfg.include_default_chunk
                        .then_some((Schedule::new(kind, 0), ChunkLabel::Default)),
                );

            for (schedule, chunk) in labelled {
                runtime.set_schedule(schedule);
                tracing::info!(n, schedule = %schedule, "sweep point");
                let report = run_benchmark_on(&mut workload, &bench, &runtime);
                let (loop1, loop2) = kernel_totals(&report);
                let row = SweepRow {
                    n,
                    schedule: ScheduleLabel::Kind(kind),
                    chunk,
                    threads: cfg.threads,
                    reps: cfg.reps,
                    loop1,
                    loop2,
                };
                out.line(&row.to_csv())?;
                rows.push(row);
            }
        }

        if let Some(baseline) = &baseline {
            tracing::info!(n, "sweep baseline");
            let report = run_benchmark_on(&mut workload, &bench, baseline);
            let (loop1, loop2) = kernel_totals(&report);
            let row = SweepRow {
                n,
                schedule: ScheduleLabel::Baseline,
                chunk: ChunkLabel::NotApplicable,
                threads: 1,
                reps: cfg.reps,
                loop1,
                loop2,
            };
            out.line(&row.to_csv())?;
            rows.push(row);
        }
    }

    tracing::info!(rows = rows.len(), "sweep done");
    Ok(rows)
}

/// Single-thread sweep over repetition counts at a fixed size.
pub fn run_reps_sweep<W: Write>(
    cfg: &RepsSweepConfig,
    out: &mut CsvWriter<W>,
) -> Result<Vec<RepsRow>, BenchError> {
    cfg.validate()?;
    tracing::info!(n = cfg.n, reps = ?cfg.reps_values, "reps sweep start");

    out.line(REPS_CSV_HEADER)?;
    let runtime = start_runtime(cfg.pool_config(), Schedule::default())?;
    let mut workload = Workload::new(cfg.n);

    let mut rows = Vec::with_capacity(cfg.reps_values.len());
    for &reps in &cfg.reps_values {
        let bench = BenchConfig {
            n: cfg.n,
            reps,
            ..BenchConfig::default()
        };
        let report = run_benchmark_on(&mut workload, &bench, &runtime);
        let (loop1, loop2) = kernel_totals(&report);
        let row = RepsRow {
            reps,
            n: cfg.n,
            loop1,
            loop2,
        };
        out.line(&row.to_csv())?;
        rows.push(row);
    }
    Ok(rows)
}

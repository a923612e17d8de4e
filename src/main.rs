//! Loop scheduling benchmark CLI
//!
//! Runs Kernel A (decreasing triangle) and Kernel B (sparse heavy rows)
//! under the schedule and team size taken from `OMP_SCHEDULE` /
//! `OMP_NUM_THREADS`, or from the flags below.
//!
//! # Usage
//!
//! ```bash
//! # Classic run: N = 729, 100 reps, env-selected schedule
//! OMP_NUM_THREADS=8 OMP_SCHEDULE=guided,4 loop-sched
//!
//! # Same, flags instead of env, JSON out
//! loop-sched run --threads 8 --schedule dynamic,16 --json
//!
//! # Schedule-by-size sweep into a CSV
//! loop-sched sweep --sizes 256,729 --chunks 1,16,64 --reps 100 -o sweep.csv
//!
//! # Show the resolved configuration and a simulated chunk plan
//! loop-sched info --plan 729
//! ```
//!
//! # Output
//!
//! Results go to stdout; diagnostics (`RUST_LOG`) go to stderr.
//!
//! # Exit Codes
//!
//! - `0`: Success
//! - `1`: Output or thread start failure
//! - `2`: Invalid arguments or configuration

use clap::{Args, Parser, Subcommand};
use loop_sched::config::{BenchConfig, KernelSelection, Preset, RepsSweepConfig, SweepConfig};
use loop_sched::error::{BenchError, ConfigError, ReportError};
use loop_sched::harness;
use loop_sched::report::CsvWriter;
use loop_sched::scheduler::{
    parse_threads, simulate_plan, LoopRuntime, RuntimeEnv, RuntimeInfo, Schedule, ScheduleKind,
};
use loop_sched::workload::jmax_for_row;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Benchmark parallel-loop scheduling policies on load-imbalanced kernels
#[derive(Parser, Debug)]
#[command(name = "loop-sched")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Team size (overrides OMP_NUM_THREADS)
    #[arg(long, global = true, value_parser = parse_threads)]
    threads: Option<usize>,

    /// Schedule as kind[,chunk] (overrides OMP_SCHEDULE)
    #[arg(long, global = true, value_name = "KIND[,CHUNK]")]
    schedule: Option<Schedule>,

    /// Pin workers to cores (overrides OMP_PROC_BIND; needs the affinity feature)
    #[arg(long, global = true)]
    proc_bind: bool,

    /// Debug logging and per-kernel breakdown on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run both kernels once and print the classic report (default)
    Run(RunArgs),
    /// Sweep sizes x schedule kinds x chunk sizes, CSV out
    Sweep(SweepArgs),
    /// Single-thread sweep over repetition counts, CSV out
    RepsSweep(RepsSweepArgs),
    /// Print the resolved runtime configuration
    Info(InfoArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Parameter preset: default, ci or paper
    #[arg(long)]
    preset: Option<Preset>,

    /// CI mode: ci preset plus a bench_summary line
    #[arg(long)]
    ci: bool,

    /// Matrix dimension
    #[arg(short, long)]
    n: Option<usize>,

    /// Timed repetitions per kernel
    #[arg(long)]
    reps: Option<usize>,

    /// Untimed repetitions before the timed phase
    #[arg(long)]
    warmup: Option<usize>,

    /// Kernels to run: a, b or both
    #[arg(long)]
    kernel: Option<KernelSelection>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Matrix sizes
    #[arg(long, value_delimiter = ',')]
    sizes: Vec<usize>,

    /// Schedule kinds
    #[arg(long, value_delimiter = ',')]
    kinds: Vec<ScheduleKind>,

    /// Explicit chunk sizes (the runtime default is added unless disabled)
    #[arg(long, value_delimiter = ',')]
    chunks: Vec<usize>,

    /// Timed repetitions per point
    #[arg(long)]
    reps: Option<usize>,

    /// Skip the kind-only (default chunk) points
    #[arg(long)]
    no_default_chunk: bool,

    /// Skip the single-thread baseline row
    #[arg(long)]
    no_baseline: bool,

    /// CSV destination (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RepsSweepArgs {
    /// Matrix dimension
    #[arg(short, long)]
    n: Option<usize>,

    /// Repetition counts
    #[arg(long, value_delimiter = ',')]
    reps: Vec<usize>,

    /// CSV destination (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Also print the chunk plan for rows [0, N) (dynamic and guided are simulated)
    #[arg(long, value_name = "N")]
    plan: Option<usize>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn resolve_env(cli: &Cli) -> Result<RuntimeEnv, ConfigError> {
    let mut env = RuntimeEnv::from_env()?;
    if let Some(threads) = cli.threads {
        env.num_threads = Some(threads);
    }
    if let Some(schedule) = cli.schedule {
        env.schedule = Some(schedule);
    }
    if cli.proc_bind {
        env.proc_bind = true;
    }
    Ok(env)
}

fn stdout_error(e: io::Error) -> BenchError {
    ReportError::io("<stdout>", e).into()
}

fn open_csv(path: Option<&Path>) -> Result<CsvWriter<Box<dyn Write>>, ReportError> {
    match path {
        Some(p) => {
            let name = p.display().to_string();
            let file = File::create(p).map_err(|e| ReportError::io(name.clone(), e))?;
            Ok(CsvWriter::new(Box::new(BufWriter::new(file)), name))
        }
        None => Ok(CsvWriter::new(Box::new(io::stdout()), "<stdout>")),
    }
}

fn cmd_run(args: &RunArgs, env: &RuntimeEnv, verbose: bool) -> Result<(), BenchError> {
    let preset = if args.ci {
        Preset::Ci
    } else {
        args.preset.unwrap_or_default()
    };
    let mut cfg = BenchConfig::from_preset(preset);
    if let Some(n) = args.n {
        cfg.n = n;
    }
    if let Some(reps) = args.reps {
        cfg.reps = reps;
    }
    if let Some(warmup) = args.warmup {
        cfg.warmup = warmup;
    }
    if let Some(kernels) = args.kernel {
        cfg.kernels = kernels;
    }
    cfg.validate()?;

    let runtime = LoopRuntime::from_runtime_env(env).map_err(|source| BenchError::Spawn {
        threads: env.resolved_threads(),
        source,
    })?;
    let report = harness::run_benchmark(&cfg, &runtime)?;

    let mut out = io::stdout().lock();
    if args.json {
        writeln!(out, "{}", report.to_json()?).map_err(stdout_error)?;
    } else {
        report.write_console(&mut out)?;
    }
    if args.ci {
        writeln!(out, "{}", report.summary()).map_err(stdout_error)?;
    }
    if verbose {
        eprint!("{}", report.detailed());
    }
    Ok(())
}

/// Sweeps set the schedule per point; a configured one is dropped.
fn warn_schedule_ignored(env: &RuntimeEnv, command: &str) {
    if let Some(schedule) = env.schedule {
        tracing::warn!(
            %schedule,
            "--schedule / {} has no effect on `{command}`; the grid sets the schedule",
            RuntimeEnv::SCHEDULE_VAR
        );
    }
}

fn cmd_sweep(args: &SweepArgs, env: &RuntimeEnv) -> Result<(), BenchError> {
    warn_schedule_ignored(env, "sweep");
    let defaults = SweepConfig::from_runtime_env(env);
    let cfg = SweepConfig {
        sizes: if args.sizes.is_empty() {
            defaults.sizes
        } else {
            args.sizes.clone()
        },
        kinds: if args.kinds.is_empty() {
            defaults.kinds
        } else {
            args.kinds.clone()
        },
        chunks: if args.chunks.is_empty() {
            defaults.chunks
        } else {
            args.chunks.clone()
        },
        threads: defaults.threads,
        reps: args.reps.unwrap_or(defaults.reps),
        include_default_chunk: !args.no_default_chunk,
        include_baseline: !args.no_baseline,
        pin_threads: defaults.pin_threads,
    };
    cfg.validate()?;

    let mut out = open_csv(args.output.as_deref())?;
    harness::run_sweep(&cfg, &mut out)?;
    if let Some(path) = &args.output {
        tracing::info!(path = %path.display(), "sweep written");
    }
    Ok(())
}

fn cmd_reps_sweep(args: &RepsSweepArgs, env: &RuntimeEnv) -> Result<(), BenchError> {
    warn_schedule_ignored(env, "reps-sweep");
    if env.num_threads.is_some_and(|t| t != 1) {
        tracing::warn!("reps-sweep always runs on one thread; the team size is ignored");
    }
    let defaults = RepsSweepConfig::default();
    let cfg = RepsSweepConfig {
        n: args.n.unwrap_or(defaults.n),
        reps_values: if args.reps.is_empty() {
            defaults.reps_values
        } else {
            args.reps.clone()
        },
        pin_threads: env.proc_bind,
    };
    cfg.validate()?;

    let mut out = open_csv(args.output.as_deref())?;
    harness::run_reps_sweep(&cfg, &mut out)?;
    Ok(())
}

fn cmd_info(args: &InfoArgs, env: &RuntimeEnv) -> Result<(), BenchError> {
    let info = RuntimeInfo::from_env(env);
    let mut out = io::stdout().lock();
    writeln!(out, "{info}").map_err(stdout_error)?;

    let Some(n) = args.plan else {
        return Ok(());
    };
    if n == 0 {
        return Err(ConfigError::InvalidParameter {
            name: "plan",
            reason: "must be >= 1".into(),
        }
        .into());
    }

    // Work units per row: inner iterations for A, inner-loop pairs for B.
    let cost_a = |i: usize| (n - 1 - i) as u64;
    let cost_b = |i: usize| {
        let m = jmax_for_row(i, n) as u64;
        m * m.saturating_sub(1) / 2
    };

    let schedule = env.resolved_schedule();
    let plan = simulate_plan(schedule, 0..n, info.threads);
    writeln!(out, "plan: n={n} schedule={schedule}").map_err(stdout_error)?;
    for (worker, chunks) in plan.iter().enumerate() {
        let rows: usize = chunks.iter().map(|c| c.len()).sum();
        let work_a: u64 = chunks.iter().flat_map(|c| c.clone()).map(cost_a).sum();
        let work_b: u64 = chunks.iter().flat_map(|c| c.clone()).map(cost_b).sum();
        writeln!(
            out,
            "  worker {worker}: chunks={} rows={rows} work_a={work_a} work_b={work_b}",
            chunks.len()
        )
        .map_err(stdout_error)?;
    }
    Ok(())
}

fn dispatch(cli: Cli) -> Result<(), BenchError> {
    let env = resolve_env(&cli)?;
    tracing::debug!(?env, "runtime environment");

    match cli.command {
        None => cmd_run(&RunArgs::default(), &env, cli.verbose),
        Some(Command::Run(args)) => cmd_run(&args, &env, cli.verbose),
        Some(Command::Sweep(args)) => cmd_sweep(&args, &env),
        Some(Command::RepsSweep(args)) => cmd_reps_sweep(&args, &env),
        Some(Command::Info(args)) => cmd_info(&args, &env),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

//! Kernel throughput under each schedule.
//!
//! One group per kernel; each parameter is a schedule string. Team size
//! comes from `OMP_NUM_THREADS` (default: all cores) so runs are comparable
//! with the CLI.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loop_sched::scheduler::{LoopRuntime, RuntimeEnv, Schedule, SerialScheduler};
use loop_sched::{Kernel, LoopScheduler, Workload};

const N: usize = 729;

fn schedules() -> Vec<Schedule> {
    vec![
        Schedule::static_blocks(),
        Schedule::fixed_chunk(16),
        Schedule::dynamic(1),
        Schedule::dynamic(16),
        Schedule::guided(1),
        Schedule::guided(16),
        Schedule::auto(),
    ]
}

fn team_size() -> usize {
    match RuntimeEnv::from_env() {
        Ok(env) => env.resolved_threads(),
        Err(e) => {
            eprintln!("ignoring runtime environment ({e}); benchmarking one thread");
            1
        }
    }
}

fn bench_one<S: LoopScheduler>(
    group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>,
    kernel: Kernel,
    label: &str,
    scheduler: &S,
) {
    let mut workload = Workload::new(N);
    kernel.init(&mut workload);
    group.bench_with_input(BenchmarkId::from_parameter(label), &kernel, |b, &kernel| {
        // Accumulators grow across iterations; only timing matters here.
        b.iter(|| kernel.run(&mut workload, 0, N, scheduler));
    });
}

fn bench_kernel(c: &mut Criterion, kernel: Kernel) {
    let threads = team_size();
    let mut group = c.benchmark_group(format!("kernel_{}/t{threads}", kernel.output_name()));
    group.throughput(Throughput::Elements(N as u64));
    group.sample_size(20);

    bench_one(&mut group, kernel, "serial", &SerialScheduler);

    let Ok(mut runtime) = LoopRuntime::new(threads, Schedule::default()) else {
        eprintln!("could not start {threads} workers; parallel cases skipped");
        group.finish();
        return;
    };
    for schedule in schedules() {
        runtime.set_schedule(schedule);
        bench_one(&mut group, kernel, &schedule.to_string(), &runtime);
    }
    group.finish();
}

fn bench_kernel_a(c: &mut Criterion) {
    bench_kernel(c, Kernel::A);
}

fn bench_kernel_b(c: &mut Criterion) {
    bench_kernel(c, Kernel::B);
}

criterion_group!(benches, bench_kernel_a, bench_kernel_b);
criterion_main!(benches);

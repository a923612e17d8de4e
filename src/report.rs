//! Benchmark results and their output formats.
//!
//! Three shapes:
//!
//! - console lines identical in form to the classic loop benchmark output
//!   (`Loop 1 check: ...`, `Total time for ... reps of loop 1 = ...`),
//!   so existing scrapers keep working;
//! - a single `bench_summary:` line for CI logs;
//! - JSON (`--json`) and CSV rows for sweeps.

use crate::config::BenchConfig;
use crate::error::ReportError;
use crate::kernels::Kernel;
use crate::scheduler::{CpuDelta, RuntimeInfo, ScheduleKind};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::Write;
use std::time::Duration;

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Nearest-rank percentile over sorted samples: `idx = round((len - 1) * p)`.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let p = p.clamp(0.0, 1.0);
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

// ============================================================================
// Per-kernel results
// ============================================================================

/// Timed phase of one kernel.
#[derive(Clone, Debug, Serialize)]
pub struct KernelReport {
    pub kernel: Kernel,
    pub reps: usize,
    pub checksum: f64,
    /// Wall time of all timed reps together.
    #[serde(rename = "total_s", serialize_with = "serialize_secs")]
    pub total: Duration,
    #[serde(rename = "p50_s", serialize_with = "serialize_secs")]
    pub p50: Duration,
    #[serde(rename = "p95_s", serialize_with = "serialize_secs")]
    pub p95: Duration,
    #[serde(rename = "p99_s", serialize_with = "serialize_secs")]
    pub p99: Duration,
    pub cpu: CpuDelta,
}

impl KernelReport {
    pub fn new(
        kernel: Kernel,
        checksum: f64,
        total: Duration,
        mut rep_times: Vec<Duration>,
        cpu: CpuDelta,
    ) -> Self {
        rep_times.sort();
        Self {
            kernel,
            reps: rep_times.len(),
            checksum,
            total,
            p50: percentile(&rep_times, 0.50),
            p95: percentile(&rep_times, 0.95),
            p99: percentile(&rep_times, 0.99),
            cpu,
        }
    }

    /// `Loop 1 check: Sum of a is 12.345678`
    pub fn check_line(&self) -> String {
        format!(
            "Loop {} check: Sum of {} is {:.6}",
            self.kernel.loop_number(),
            self.kernel.output_name(),
            self.checksum
        )
    }

    /// `Total time for 100 reps of loop 1 = 0.123456`
    pub fn time_line(&self) -> String {
        format!(
            "Total time for {} reps of {} = {:.6}",
            self.reps,
            self.kernel,
            self.total.as_secs_f64()
        )
    }

    pub fn avg_ms(&self) -> f64 {
        if self.reps == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1000.0 / self.reps as f64
    }
}

// ============================================================================
// Whole run
// ============================================================================

/// Everything one `run` produced.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub runtime: RuntimeInfo,
    pub config: BenchConfig,
    pub kernels: Vec<KernelReport>,
}

impl RunReport {
    pub fn kernel(&self, kernel: Kernel) -> Option<&KernelReport> {
        self.kernels.iter().find(|k| k.kernel == kernel)
    }

    /// Console output: config line, then check and time lines per kernel.
    pub fn console_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(1 + 2 * self.kernels.len());
        lines.push(self.runtime.to_string());
        for k in &self.kernels {
            lines.push(k.check_line());
            lines.push(k.time_line());
        }
        lines
    }

    pub fn write_console<W: Write>(&self, mut out: W) -> Result<(), ReportError> {
        for line in self.console_lines() {
            writeln!(out, "{line}").map_err(|e| ReportError::io("<stdout>", e))?;
        }
        Ok(())
    }

    /// One-line key=value summary for CI logs.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "bench_summary: n={} reps={} threads={} schedule={} chunk={}",
            self.config.n,
            self.config.reps,
            self.runtime.threads,
            self.runtime.schedule,
            self.runtime.chunk
        );
        for k in &self.kernels {
            let tag = format!("loop{}", k.kernel.loop_number());
            out.push_str(&format!(
                " {tag}_s={:.6} {tag}_p50_ms={:.3} {tag}_p95_ms={:.3} {tag}_cpu_s={:.3} {tag}_checksum={:.6e}",
                k.total.as_secs_f64(),
                k.p50.as_secs_f64() * 1000.0,
                k.p95.as_secs_f64() * 1000.0,
                k.cpu.total().as_secs_f64(),
                k.checksum
            ));
        }
        out
    }

    /// Per-kernel breakdown for `--verbose`.
    pub fn detailed(&self) -> String {
        let mut out = format!(
            "Benchmark: n={} warmup={} reps={}\n{}\n",
            self.config.n, self.config.warmup, self.config.reps, self.runtime
        );
        for k in &self.kernels {
            let wall = k.total;
            out.push_str(&format!(
                "  {}: total={:.3}s avg={:.3}ms p50={:.3}ms p95={:.3}ms p99={:.3}ms cpu[{}] busy_cores={:.2}\n",
                k.kernel,
                wall.as_secs_f64(),
                k.avg_ms(),
                k.p50.as_secs_f64() * 1000.0,
                k.p95.as_secs_f64() * 1000.0,
                k.p99.as_secs_f64() * 1000.0,
                k.cpu,
                k.cpu.utilization(wall),
            ));
        }
        out
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Sweep rows
// ============================================================================

/// Chunk column of a sweep row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkLabel {
    Size(usize),
    /// Kind given without a chunk; the runtime picks.
    Default,
    /// Baseline row, no schedule in play.
    NotApplicable,
}

impl fmt::Display for ChunkLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkLabel::Size(k) => write!(f, "{k}"),
            ChunkLabel::Default => f.write_str("default"),
            ChunkLabel::NotApplicable => f.write_str("n/a"),
        }
    }
}

/// Schedule column of a sweep row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleLabel {
    Kind(ScheduleKind),
    Baseline,
}

impl fmt::Display for ScheduleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleLabel::Kind(kind) => write!(f, "{kind}"),
            ScheduleLabel::Baseline => f.write_str("baseline"),
        }
    }
}

pub const SWEEP_CSV_HEADER: &str = "N,schedule,chunk_size,threads,reps,loop1_time_s,loop2_time_s";

pub const REPS_CSV_HEADER: &str = "reps,N,schedule,chunk_size,threads,loop1_time_s,loop2_time_s,\
loop1_avg_time_ms,loop2_avg_time_ms";

/// One point of a schedule-by-size sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepRow {
    pub n: usize,
    pub schedule: ScheduleLabel,
    pub chunk: ChunkLabel,
    pub threads: usize,
    pub reps: usize,
    pub loop1: Duration,
    pub loop2: Duration,
}

impl SweepRow {
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{:.6},{:.6}",
            self.n,
            self.schedule,
            self.chunk,
            self.threads,
            self.reps,
            self.loop1.as_secs_f64(),
            self.loop2.as_secs_f64()
        )
    }
}

/// One point of a repetition-count sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RepsRow {
    pub reps: usize,
    pub n: usize,
    pub loop1: Duration,
    pub loop2: Duration,
}

impl RepsRow {
    pub fn to_csv(&self) -> String {
        let avg_ms = |d: Duration| d.as_secs_f64() * 1000.0 / self.reps.max(1) as f64;
        format!(
            "{},{},{},{},1,{:.6},{:.6},{:.6},{:.6}",
            self.reps,
            self.n,
            ScheduleLabel::Baseline,
            ChunkLabel::NotApplicable,
            self.loop1.as_secs_f64(),
            self.loop2.as_secs_f64(),
            avg_ms(self.loop1),
            avg_ms(self.loop2)
        )
    }
}

/// Line-oriented CSV output that remembers its destination name for errors.
pub struct CsvWriter<W: Write> {
    out: W,
    dest: String,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W, dest: impl Into<String>) -> Self {
        Self {
            out,
            dest: dest.into(),
        }
    }

    /// Write one line and flush, so partial sweeps survive interruption.
    pub fn line(&mut self, line: &str) -> Result<(), ReportError> {
        writeln!(self.out, "{line}")
            .and_then(|()| self.out.flush())
            .map_err(|e| ReportError::io(self.dest.clone(), e))
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelSelection;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn sample_report() -> RunReport {
        let a = KernelReport::new(
            Kernel::A,
            -12.5,
            ms(300),
            vec![ms(100), ms(120), ms(80)],
            CpuDelta::default(),
        );
        let b = KernelReport::new(Kernel::B, -3.25, ms(900), vec![ms(300); 3], CpuDelta::default());
        RunReport {
            runtime: RuntimeInfo {
                threads: 4,
                procs: 8,
                schedule: ScheduleKind::Dynamic,
                chunk: 1,
            },
            config: BenchConfig {
                n: 64,
                reps: 3,
                warmup: 0,
                kernels: KernelSelection::Both,
            },
            kernels: vec![a, b],
        }
    }

    #[test]
    fn percentile_nearest_rank() {
        let data: Vec<Duration> = (1..=100).map(ms).collect();
        assert_eq!(percentile(&data, 0.5), ms(51));
        assert_eq!(percentile(&data, 0.95), ms(95));
        assert_eq!(percentile(&data, 0.99), ms(99));
        assert_eq!(percentile(&[], 0.5), Duration::ZERO);
        assert_eq!(percentile(&[ms(42)], 1.0), ms(42));
    }

    #[test]
    fn kernel_report_sorts_rep_times() {
        let r = KernelReport::new(Kernel::A, 0.0, ms(300), vec![ms(120), ms(80), ms(100)], CpuDelta::default());
        assert_eq!(r.reps, 3);
        assert_eq!(r.p50, ms(100));
        assert_eq!(r.p99, ms(120));
        assert!((r.avg_ms() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn console_lines_keep_classic_shape() {
        let lines = sample_report().console_lines();
        assert_eq!(
            lines,
            vec![
                "OMP config: threads=4 procs=8 schedule=dynamic chunk=1",
                "Loop 1 check: Sum of a is -12.500000",
                "Total time for 3 reps of loop 1 = 0.300000",
                "Loop 2 check: Sum of c is -3.250000",
                "Total time for 3 reps of loop 2 = 0.900000",
            ]
        );
    }

    #[test]
    fn summary_is_single_line_with_both_loops() {
        let s = sample_report().summary();
        assert!(s.starts_with("bench_summary: n=64 reps=3 threads=4 schedule=dynamic chunk=1"));
        assert!(s.contains("loop1_s=0.300000"));
        assert!(s.contains("loop2_p50_ms=300.000"));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn json_has_expected_fields() {
        let json = sample_report().to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["runtime"]["schedule"], "dynamic");
        assert_eq!(v["config"]["kernels"], "both");
        assert_eq!(v["kernels"][0]["kernel"], "a");
        assert_eq!(v["kernels"][1]["total_s"], 0.9);
    }

    #[test]
    fn sweep_rows_render_labels() {
        let row = SweepRow {
            n: 729,
            schedule: ScheduleLabel::Kind(ScheduleKind::Guided),
            chunk: ChunkLabel::Default,
            threads: 8,
            reps: 1000,
            loop1: ms(1500),
            loop2: ms(2250),
        };
        assert_eq!(row.to_csv(), "729,guided,default,8,1000,1.500000,2.250000");

        let base = SweepRow {
            schedule: ScheduleLabel::Baseline,
            chunk: ChunkLabel::NotApplicable,
            threads: 1,
            ..row
        };
        assert_eq!(base.to_csv(), "729,baseline,n/a,1,1000,1.500000,2.250000");
        assert_eq!(SWEEP_CSV_HEADER.split(',').count(), 7);
    }

    #[test]
    fn reps_row_includes_averages() {
        let row = RepsRow {
            reps: 10,
            n: 2048,
            loop1: ms(500),
            loop2: ms(2000),
        };
        assert_eq!(
            row.to_csv(),
            "10,2048,baseline,n/a,1,0.500000,2.000000,50.000000,200.000000"
        );
        assert_eq!(REPS_CSV_HEADER.split(',').count(), 9);
    }

    #[test]
    fn csv_writer_collects_lines() {
        let mut w = CsvWriter::new(Vec::new(), "<memory>");
        w.line(SWEEP_CSV_HEADER).unwrap();
        w.line("1,static,1,1,1,0.1,0.2").unwrap();
        let text = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}

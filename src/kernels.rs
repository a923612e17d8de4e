//! The two loop kernels.
//!
//! Both take an outer range `[lo, hi)` and let the injected
//! [`LoopScheduler`] decide how rows are grouped into chunks and which
//! worker runs each chunk. The row bodies never look at the schedule.
//!
//! | Kernel | Row `i` cost         | Shape                                    |
//! |--------|----------------------|------------------------------------------|
//! | A      | `n - 1 - i`          | decreasing triangle, row 0 heaviest      |
//! | B      | `jmax[i]^2 / 2`      | sparse heavy rows among trivial ones     |
//!
//! Each row writes only its own slots (A row `i`, or `C[i]`), and each cell
//! is updated in the same order no matter how rows are distributed, so
//! results are bit-identical across schedules and team sizes.

use crate::scheduler::LoopScheduler;
use crate::workload::{SharedRows, Workload};
use std::fmt;
use std::ops::Range;

/// Kernel A body for one row: `a[j] += cos(b[j])` for `j` in `(i, n)`,
/// walking `j` downwards.
#[inline]
pub fn kernel_a_row(a_row: &mut [f64], b_row: &[f64], i: usize) {
    let start = (i + 1).min(a_row.len());
    for (a, &b) in a_row[start..].iter_mut().zip(&b_row[start..]).rev() {
        *a += b.cos();
    }
}

/// Kernel B body for one row: accumulates
/// `(k + 1) * ln(b[j]) * rn2` into `c_i` for `j < jmax`, `k < j`.
#[inline]
pub fn kernel_b_row(c_i: &mut f64, b_row: &[f64], jmax: usize, rn2: f64) {
    let mut acc = *c_i;
    for (j, &b) in b_row[..jmax].iter().enumerate() {
        debug_assert!(b > 0.0, "kernel B input must be positive, got {b} at column {j}");
        let ln_b = b.ln();
        for k in 0..j {
            acc += (k + 1) as f64 * ln_b * rn2;
        }
    }
    *c_i = acc;
}

#[inline]
fn check_range(lo: usize, hi: usize, n: usize) -> Range<usize> {
    assert!(lo <= hi && hi <= n, "row range {lo}..{hi} invalid for n = {n}");
    lo..hi
}

/// Run Kernel A over rows `[lo, hi)`.
///
/// Accumulates into A; repeated calls keep adding.
///
/// # Panics
/// Panics if `lo > hi` or `hi > n`.
pub fn run_kernel_a<S>(workload: &mut Workload, lo: usize, hi: usize, scheduler: &S)
where
    S: LoopScheduler + ?Sized,
{
    let n = workload.n();
    let range = check_range(lo, hi, n);
    if range.is_empty() {
        return;
    }

    let (a, b) = workload.kernel_a_buffers();
    let a_rows = SharedRows::new(a, n);
    scheduler.parallel_for(range, &|chunk| {
        for i in chunk {
            // SAFETY: the scheduler passes each row index to exactly one call.
            let a_row = unsafe { a_rows.row_mut(i) };
            kernel_a_row(a_row, &b[i * n..(i + 1) * n], i);
        }
    });
}

/// Run Kernel B over rows `[lo, hi)`.
///
/// Requires `init_for_kernel_b` (or an equivalent `jmax` and a strictly
/// positive B). Accumulates into C.
///
/// # Panics
/// Panics if `lo > hi` or `hi > n`.
pub fn run_kernel_b<S>(workload: &mut Workload, lo: usize, hi: usize, scheduler: &S)
where
    S: LoopScheduler + ?Sized,
{
    let n = workload.n();
    let range = check_range(lo, hi, n);
    if range.is_empty() {
        return;
    }

    let rn2 = 1.0 / (n * n) as f64;
    let (c, b, jmax) = workload.kernel_b_buffers();
    let c_slots = SharedRows::new(c, 1);
    scheduler.parallel_for(range, &|chunk| {
        for i in chunk {
            // SAFETY: as above; slot `i` belongs to row `i` alone.
            let c_i = unsafe { &mut c_slots.row_mut(i)[0] };
            kernel_b_row(c_i, &b[i * n..(i + 1) * n], jmax[i], rn2);
        }
    });
}

/// Kernel selector used by the harness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    A,
    B,
}

impl Kernel {
    /// Loop number in console output (`loop 1`, `loop 2`).
    pub const fn loop_number(self) -> u8 {
        match self {
            Kernel::A => 1,
            Kernel::B => 2,
        }
    }

    /// Name of the buffer its checksum sums.
    pub const fn output_name(self) -> &'static str {
        match self {
            Kernel::A => "a",
            Kernel::B => "c",
        }
    }

    pub fn init(self, workload: &mut Workload) {
        match self {
            Kernel::A => workload.init_for_kernel_a(),
            Kernel::B => workload.init_for_kernel_b(),
        }
    }

    pub fn run<S>(self, workload: &mut Workload, lo: usize, hi: usize, scheduler: &S)
    where
        S: LoopScheduler + ?Sized,
    {
        match self {
            Kernel::A => run_kernel_a(workload, lo, hi, scheduler),
            Kernel::B => run_kernel_b(workload, lo, hi, scheduler),
        }
    }

    pub fn checksum(self, workload: &Workload) -> f64 {
        match self {
            Kernel::A => workload.checksum_a(),
            Kernel::B => workload.checksum_c(),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop {}", self.loop_number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{LoopRuntime, Schedule, SerialScheduler};

    #[test]
    fn kernel_a_row_touches_only_upper_part() {
        let b = vec![0.0; 5];
        let mut a = vec![0.0; 5];
        kernel_a_row(&mut a, &b, 2);
        assert_eq!(a, vec![0.0, 0.0, 0.0, 1.0, 1.0]);

        let mut last = vec![0.0; 5];
        kernel_a_row(&mut last, &b, 4);
        assert!(last.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn kernel_b_row_light_row_does_nothing() {
        let mut c = 0.0;
        kernel_b_row(&mut c, &[0.5, 0.5], 1, 1.0);
        assert_eq!(c, 0.0);
    }

    #[test]
    fn kernel_b_row_matches_closed_form() {
        // j = 1: k = 0 -> 1 * ln(b1); j = 2: k = 0, 1 -> (1 + 2) * ln(b2).
        let b = [0.9, 0.5, 0.25];
        let mut c = 0.0;
        kernel_b_row(&mut c, &b, 3, 1.0);
        let want = 0.5f64.ln() + 3.0 * 0.25f64.ln();
        assert!((c - want).abs() < 1e-15);
    }

    #[test]
    fn empty_ranges_leave_buffers_untouched() {
        let mut w = Workload::new(16);
        w.init_for_kernel_a();
        run_kernel_a(&mut w, 0, 0, &SerialScheduler);
        assert_eq!(w.checksum_a(), 0.0);

        w.init_for_kernel_b();
        run_kernel_b(&mut w, 16, 16, &SerialScheduler);
        assert_eq!(w.checksum_c(), 0.0);
    }

    #[test]
    #[should_panic(expected = "invalid for n")]
    fn reversed_range_panics() {
        let mut w = Workload::new(4);
        run_kernel_a(&mut w, 3, 2, &SerialScheduler);
    }

    #[test]
    #[should_panic(expected = "invalid for n")]
    fn range_past_end_panics() {
        let mut w = Workload::new(4);
        run_kernel_b(&mut w, 0, 5, &SerialScheduler);
    }

    #[test]
    fn partial_range_only_writes_its_rows() {
        let mut w = Workload::new(12);
        w.init_for_kernel_a();
        let rt = LoopRuntime::new(3, Schedule::dynamic(2)).unwrap();
        run_kernel_a(&mut w, 4, 8, &rt);
        for i in 0..12 {
            let touched = w.a_row(i).iter().any(|&v| v != 0.0);
            assert_eq!(touched, (4..8).contains(&i), "row {i}");
        }
    }

    #[test]
    fn parallel_matches_serial_bitwise() {
        let n = 96;
        let mut serial = Workload::new(n);
        Kernel::A.init(&mut serial);
        Kernel::A.run(&mut serial, 0, n, &SerialScheduler);
        Kernel::B.init(&mut serial);
        Kernel::B.run(&mut serial, 0, n, &SerialScheduler);

        let rt = LoopRuntime::new(4, Schedule::guided(3)).unwrap();
        let mut par = Workload::new(n);
        Kernel::A.init(&mut par);
        Kernel::A.run(&mut par, 0, n, &rt);
        Kernel::B.init(&mut par);
        Kernel::B.run(&mut par, 0, n, &rt);

        // Kernel B init overwrote B, but A is still intact in both.
        assert_eq!(par.a(), serial.a());
        assert_eq!(par.c(), serial.c());
    }

    #[test]
    fn display_names_loops() {
        assert_eq!(Kernel::A.to_string(), "loop 1");
        assert_eq!(Kernel::B.output_name(), "c");
    }
}

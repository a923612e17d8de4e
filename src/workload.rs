//! Owned benchmark buffers.
//!
//! One [`Workload`] holds every array both kernels touch, so independent
//! benchmark instances (parallel tests, sweeps) never share state.
//!
//! Matrices are stored row-major in flat `Vec<f64>`s: row `i` is
//! `[i * n, (i + 1) * n)`. Rows are the unit of ownership during a kernel
//! call; see [`SharedRows`].

use std::marker::PhantomData;

/// Bound on the inner `j` loop of Kernel B for row `i`.
///
/// `n` when `i mod (3 * (i / 30) + 1) == 0`, else 1. The pattern yields a
/// sparse set of heavy rows among mostly trivial ones.
#[inline]
pub fn jmax_for_row(i: usize, n: usize) -> usize {
    if i % (3 * (i / 30) + 1) == 0 {
        n
    } else {
        1
    }
}

/// Kernel A input value at `(i, j)`.
#[inline]
pub fn kernel_a_input(i: usize, j: usize) -> f64 {
    3.142 * (i + j) as f64
}

/// Kernel B input value at `(i, j)`. Strictly positive.
#[inline]
pub fn kernel_b_input(i: usize, j: usize, n: usize) -> f64 {
    (i * j + 1) as f64 / (n * n) as f64
}

/// Buffers for both kernels.
#[derive(Clone, Debug)]
pub struct Workload {
    n: usize,
    /// N x N accumulator written by Kernel A.
    a: Vec<f64>,
    /// N x N input, refilled by each kernel's init.
    b: Vec<f64>,
    /// Per-row accumulator written by Kernel B.
    c: Vec<f64>,
    jmax: Vec<usize>,
}

impl Workload {
    /// Allocate zeroed buffers for an `n x n` problem.
    ///
    /// Nothing is initialized for either kernel yet.
    pub fn new(n: usize) -> Self {
        let cells = n
            .checked_mul(n)
            .unwrap_or_else(|| panic!("matrix size {n} x {n} overflows usize"));
        Self {
            n,
            a: vec![0.0; cells],
            b: vec![0.0; cells],
            c: vec![0.0; n],
            jmax: vec![0; n],
        }
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Mutable input matrix, for callers that supply their own B.
    ///
    /// Kernel B requires every entry it reads to stay strictly positive.
    pub fn b_mut(&mut self) -> &mut [f64] {
        &mut self.b
    }

    pub fn c(&self) -> &[f64] {
        &self.c
    }

    pub fn jmax(&self) -> &[usize] {
        &self.jmax
    }

    #[inline]
    pub fn a_row(&self, i: usize) -> &[f64] {
        &self.a[i * self.n..(i + 1) * self.n]
    }

    #[inline]
    pub fn b_row(&self, i: usize) -> &[f64] {
        &self.b[i * self.n..(i + 1) * self.n]
    }

    /// Zero A and fill B with `3.142 * (i + j)`.
    pub fn init_for_kernel_a(&mut self) {
        let n = self.n;
        self.a.fill(0.0);
        for (i, row) in self.b.chunks_exact_mut(n.max(1)).enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = kernel_a_input(i, j);
            }
        }
    }

    /// Compute `jmax`, zero C and fill B with `(i * j + 1) / n^2`.
    pub fn init_for_kernel_b(&mut self) {
        let n = self.n;
        self.compute_jmax();
        self.c.fill(0.0);
        for (i, row) in self.b.chunks_exact_mut(n.max(1)).enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = kernel_b_input(i, j, n);
            }
        }
    }

    /// Recompute the per-row bounds of Kernel B.
    pub fn compute_jmax(&mut self) {
        let n = self.n;
        for (i, bound) in self.jmax.iter_mut().enumerate() {
            *bound = jmax_for_row(i, n);
        }
    }

    /// Rows whose bound is the full width.
    pub fn heavy_rows(&self) -> usize {
        self.jmax.iter().filter(|&&m| m == self.n).count()
    }

    /// Sum of A in row-major order.
    pub fn checksum_a(&self) -> f64 {
        let mut sum = 0.0;
        for &v in &self.a {
            sum += v;
        }
        sum
    }

    /// Sum of C in row order.
    pub fn checksum_c(&self) -> f64 {
        let mut sum = 0.0;
        for &v in &self.c {
            sum += v;
        }
        sum
    }

    /// Split borrows for Kernel A: `(a, b)`.
    pub(crate) fn kernel_a_buffers(&mut self) -> (&mut [f64], &[f64]) {
        (&mut self.a, &self.b)
    }

    /// Split borrows for Kernel B: `(c, b, jmax)`.
    pub(crate) fn kernel_b_buffers(&mut self) -> (&mut [f64], &[f64], &[usize]) {
        (&mut self.c, &self.b, &self.jmax)
    }
}

/// Row-granular mutable view shared across a worker team.
///
/// Holds the exclusive borrow of a buffer for `'a` and hands out one
/// `&mut` row at a time. Exclusivity per row is not checked here; it comes
/// from the scheduler handing each row index to exactly one body call.
pub(crate) struct SharedRows<'a> {
    ptr: *mut f64,
    rows: usize,
    width: usize,
    _borrow: PhantomData<&'a mut [f64]>,
}

// SAFETY: the view only produces disjoint rows under the `row_mut`
// contract; f64 is Send.
unsafe impl Send for SharedRows<'_> {}
unsafe impl Sync for SharedRows<'_> {}

impl<'a> SharedRows<'a> {
    pub(crate) fn new(buf: &'a mut [f64], width: usize) -> Self {
        assert!(width > 0, "row width must be > 0");
        assert_eq!(buf.len() % width, 0, "buffer is not a whole number of rows");
        Self {
            ptr: buf.as_mut_ptr(),
            rows: buf.len() / width,
            width,
            _borrow: PhantomData,
        }
    }

    /// Row `i`.
    ///
    /// # Safety
    ///
    /// No other reference to row `i` may be live while the returned slice
    /// is in use.
    #[inline]
    pub(crate) unsafe fn row_mut(&self, i: usize) -> &'a mut [f64] {
        debug_assert!(i < self.rows, "row {i} out of range for {}", self.rows);
        // SAFETY: `i < rows` keeps the slice inside the borrowed buffer;
        // uniqueness is the caller's obligation.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(i * self.width), self.width) }
    }
}

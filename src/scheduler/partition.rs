//! # Chunk Partitioning
//!
//! Chunk arithmetic for splitting an outer iteration range `[lo, hi)` among a
//! team of `T` workers.
//!
//! ## Correctness Invariant
//!
//! For every policy, the chunks handed out across all workers are pairwise
//! disjoint and their union is exactly `[lo, hi)`. The kernels rely on this
//! to give each worker exclusive access to its rows without locks.
//!
//! ## Policies
//!
//! - **Block** (`static`, no chunk): worker `w` gets one contiguous block.
//!   The first `len % T` workers get one extra iteration.
//! - **Cyclic** (`static,k`): chunk `c` goes to worker `c % T`.
//! - **Dynamic** (`dynamic,k`): workers claim `k` iterations from a shared
//!   [`ChunkCursor`] until it runs dry.
//! - **Guided** (`guided,k`): like dynamic, but each claim takes
//!   `max(ceil(remaining / T), k)`, so chunks shrink as work drains.
//!
//! Block and cyclic plans are pure functions of `(range, T, w)`: no shared
//! state, no atomics.

use super::schedule::{Schedule, ScheduleKind};
use crossbeam_utils::CachePadded;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Contiguous balanced block for `worker` out of `workers`.
///
/// # Panics
/// Panics if `workers == 0` or `worker >= workers`.
#[inline]
pub fn static_block(range: Range<usize>, workers: usize, worker: usize) -> Range<usize> {
    assert!(workers > 0, "workers must be > 0");
    assert!(worker < workers, "worker {worker} out of range for {workers}");

    let len = range.end.saturating_sub(range.start);
    let q = len / workers;
    let r = len % workers;
    let start = range.start + worker * q + worker.min(r);
    let end = start + q + usize::from(worker < r);
    start..end
}

/// Iterator over one worker's round-robin chunks.
#[derive(Clone, Debug)]
pub struct CyclicChunks {
    next: usize,
    end: usize,
    chunk: usize,
    stride: usize,
}

impl Iterator for CyclicChunks {
    type Item = Range<usize>;

    #[inline]
    fn next(&mut self) -> Option<Range<usize>> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.chunk).min(self.end);
        self.next = start.saturating_add(self.stride);
        Some(start..end)
    }
}

/// Chunks `worker`, `worker + T`, `worker + 2T`, ... of size `chunk`.
///
/// # Panics
/// Panics if `chunk == 0`, `workers == 0` or `worker >= workers`.
pub fn cyclic_chunks(
    range: Range<usize>,
    chunk: usize,
    workers: usize,
    worker: usize,
) -> CyclicChunks {
    assert!(chunk > 0, "chunk must be > 0");
    assert!(workers > 0, "workers must be > 0");
    assert!(worker < workers, "worker {worker} out of range for {workers}");

    CyclicChunks {
        next: range.start.saturating_add(worker.saturating_mul(chunk)),
        end: range.end,
        chunk,
        stride: chunk.saturating_mul(workers),
    }
}

/// Size of the next guided chunk.
///
/// `max(ceil(remaining / workers), min_chunk)`, clamped to `remaining`.
#[inline]
pub fn guided_chunk_len(remaining: usize, workers: usize, min_chunk: usize) -> usize {
    debug_assert!(workers > 0);
    remaining
        .div_ceil(workers)
        .max(min_chunk.max(1))
        .min(remaining)
}

/// Shared claim cursor for dynamic and guided schedules.
///
/// One cursor lives for exactly one parallel loop. It is padded to its own
/// cache line because every worker hammers it.
#[derive(Debug)]
pub struct ChunkCursor {
    next: CachePadded<AtomicUsize>,
    end: usize,
}

impl ChunkCursor {
    pub fn new(range: Range<usize>) -> Self {
        Self {
            next: CachePadded::new(AtomicUsize::new(range.start)),
            end: range.end,
        }
    }

    /// Claim up to `chunk` iterations.
    #[inline]
    pub fn claim(&self, chunk: usize) -> Option<Range<usize>> {
        let chunk = chunk.max(1);
        self.claim_with(|_| chunk)
    }

    /// Claim a guided chunk sized for a team of `workers`.
    #[inline]
    pub fn claim_guided(&self, min_chunk: usize, workers: usize) -> Option<Range<usize>> {
        self.claim_with(|remaining| guided_chunk_len(remaining, workers, min_chunk))
    }

    /// Iterations not yet claimed.
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.next.load(Ordering::Relaxed))
    }

    // CAS rather than fetch_add so the cursor never runs past `end`.
    #[inline]
    fn claim_with(&self, size: impl Fn(usize) -> usize) -> Option<Range<usize>> {
        let mut start = self.next.load(Ordering::Relaxed);
        loop {
            if start >= self.end {
                return None;
            }
            let remaining = self.end - start;
            let len = size(remaining).clamp(1, remaining);
            match self.next.compare_exchange_weak(
                start,
                start + len,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(start..start + len),
                Err(actual) => start = actual,
            }
        }
    }
}

/// Serial simulation of the chunks each worker would receive.
///
/// Dynamic and guided claims are dealt to workers in round-robin order,
/// which is one of the many valid interleavings. Used for plan previews and
/// for checking the coverage invariant in tests.
pub fn simulate_plan(
    schedule: Schedule,
    range: Range<usize>,
    workers: usize,
) -> Vec<Vec<Range<usize>>> {
    assert!(workers > 0, "workers must be > 0");
    let mut plan = vec![Vec::new(); workers];

    match schedule.kind {
        ScheduleKind::Static if schedule.chunk > 0 => {
            for (w, chunks) in plan.iter_mut().enumerate() {
                chunks.extend(cyclic_chunks(range.clone(), schedule.chunk, workers, w));
            }
        }
        ScheduleKind::Static | ScheduleKind::Auto => {
            for (w, chunks) in plan.iter_mut().enumerate() {
                let block = static_block(range.clone(), workers, w);
                if !block.is_empty() {
                    chunks.push(block);
                }
            }
        }
        ScheduleKind::Dynamic | ScheduleKind::Guided => {
            let cursor = ChunkCursor::new(range);
            let chunk = schedule.effective_chunk();
            let mut w = 0;
            loop {
                let claimed = if schedule.kind == ScheduleKind::Dynamic {
                    cursor.claim(chunk)
                } else {
                    cursor.claim_guided(chunk, workers)
                };
                let Some(c) = claimed else { break };
                plan[w].push(c);
                w = (w + 1) % workers;
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten_sorted(plan: &[Vec<Range<usize>>]) -> Vec<Range<usize>> {
        let mut all: Vec<Range<usize>> = plan.iter().flatten().cloned().collect();
        all.sort_by_key(|r| r.start);
        all
    }

    fn assert_exact_cover(plan: &[Vec<Range<usize>>], range: Range<usize>) {
        let mut expected = range.start;
        for c in flatten_sorted(plan) {
            assert!(!c.is_empty(), "empty chunk {c:?}");
            assert_eq!(c.start, expected, "gap or overlap at {expected}");
            expected = c.end;
        }
        assert_eq!(expected, range.end);
    }

    #[test]
    fn static_block_balances_remainder_to_first_workers() {
        let sizes: Vec<usize> = (0..4).map(|w| static_block(0..10, 4, w).len()).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
        assert_eq!(static_block(0..10, 4, 0), 0..3);
        assert_eq!(static_block(0..10, 4, 3), 8..10);
    }

    #[test]
    fn static_block_more_workers_than_iterations() {
        assert_eq!(static_block(5..7, 4, 0), 5..6);
        assert_eq!(static_block(5..7, 4, 1), 6..7);
        assert!(static_block(5..7, 4, 2).is_empty());
        assert!(static_block(5..7, 4, 3).is_empty());
    }

    #[test]
    fn cyclic_chunks_round_robin() {
        let w0: Vec<_> = cyclic_chunks(0..10, 2, 2, 0).collect();
        let w1: Vec<_> = cyclic_chunks(0..10, 2, 2, 1).collect();
        assert_eq!(w0, vec![0..2, 4..6, 8..10]);
        assert_eq!(w1, vec![2..4, 6..8]);
    }

    #[test]
    fn cyclic_chunks_truncates_last_chunk() {
        let w0: Vec<_> = cyclic_chunks(3..10, 4, 1, 0).collect();
        assert_eq!(w0, vec![3..7, 7..10]);
    }

    #[test]
    fn guided_chunks_shrink_to_minimum() {
        assert_eq!(guided_chunk_len(100, 4, 1), 25);
        assert_eq!(guided_chunk_len(3, 4, 1), 1);
        assert_eq!(guided_chunk_len(3, 4, 16), 3);
        assert_eq!(guided_chunk_len(100, 4, 0), 25);
    }

    #[test]
    fn cursor_claims_until_exhausted() {
        let cursor = ChunkCursor::new(10..15);
        assert_eq!(cursor.claim(2), Some(10..12));
        assert_eq!(cursor.claim(2), Some(12..14));
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor.claim(2), Some(14..15));
        assert_eq!(cursor.claim(2), None);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn guided_cursor_sequence() {
        let cursor = ChunkCursor::new(0..100);
        let sizes: Vec<usize> = std::iter::from_fn(|| cursor.claim_guided(1, 4))
            .map(|r| r.len())
            .collect();
        assert_eq!(sizes.iter().sum::<usize>(), 100);
        assert_eq!(sizes[0], 25);
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn every_policy_covers_range_exactly() {
        let schedules = [
            Schedule::static_blocks(),
            Schedule::fixed_chunk(7),
            Schedule::dynamic(1),
            Schedule::dynamic(16),
            Schedule::guided(1),
            Schedule::guided(5),
            Schedule::auto(),
        ];
        for schedule in schedules {
            for workers in [1, 2, 3, 8] {
                let plan = simulate_plan(schedule, 4..729, workers);
                assert_eq!(plan.len(), workers);
                assert_exact_cover(&plan, 4..729);
            }
        }
    }

    #[test]
    fn empty_range_yields_no_chunks() {
        for schedule in [Schedule::static_blocks(), Schedule::dynamic(4), Schedule::guided(2)] {
            let plan = simulate_plan(schedule, 7..7, 4);
            assert!(plan.iter().all(|c| c.is_empty()));
        }
    }
}

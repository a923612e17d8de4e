//! Property tests for chunk arithmetic.
//!
//! For any range, team size and chunk, every policy must hand out
//! non-empty, pairwise disjoint chunks that cover the range exactly.

use std::ops::Range;

use proptest::prelude::*;

use loop_sched::scheduler::{
    cyclic_chunks, guided_chunk_len, simulate_plan, static_block, ChunkCursor, Schedule,
    ScheduleKind,
};

fn schedule_strategy() -> impl Strategy<Value = Schedule> {
    let kind = prop_oneof![
        Just(ScheduleKind::Static),
        Just(ScheduleKind::Dynamic),
        Just(ScheduleKind::Guided),
        Just(ScheduleKind::Auto),
    ];
    (kind, 0usize..40).prop_map(|(kind, chunk)| Schedule::new(kind, chunk))
}

fn range_strategy() -> impl Strategy<Value = Range<usize>> {
    (0usize..500, 0usize..1500).prop_map(|(lo, len)| lo..lo + len)
}

fn covers_exactly(plan: &[Vec<Range<usize>>], range: &Range<usize>) -> Result<(), String> {
    let mut chunks: Vec<Range<usize>> = plan.iter().flatten().cloned().collect();
    chunks.sort_by_key(|c| c.start);
    let mut next = range.start;
    for c in chunks {
        if c.is_empty() {
            return Err(format!("empty chunk {c:?}"));
        }
        if c.start != next {
            return Err(format!("expected chunk at {next}, got {c:?}"));
        }
        next = c.end;
    }
    if next != range.end {
        return Err(format!("coverage stops at {next}, range ends at {}", range.end));
    }
    Ok(())
}

proptest! {
    #[test]
    fn every_plan_is_an_exact_partition(
        schedule in schedule_strategy(),
        range in range_strategy(),
        workers in 1usize..17,
    ) {
        let plan = simulate_plan(schedule, range.clone(), workers);
        prop_assert_eq!(plan.len(), workers);
        if let Err(msg) = covers_exactly(&plan, &range) {
            prop_assert!(false, "{} over {:?} x{}: {}", schedule, range, workers, msg);
        }
    }

    #[test]
    fn static_blocks_are_balanced(range in range_strategy(), workers in 1usize..33) {
        let len = range.len();
        let sizes: Vec<usize> = (0..workers)
            .map(|w| static_block(range.clone(), workers, w).len())
            .collect();
        let extra = len % workers;
        for (w, &size) in sizes.iter().enumerate() {
            prop_assert_eq!(size, len / workers + usize::from(w < extra));
        }
        // Blocks are laid out in worker order.
        for w in 1..workers {
            prop_assert_eq!(
                static_block(range.clone(), workers, w - 1).end,
                static_block(range.clone(), workers, w).start
            );
        }
    }

    #[test]
    fn cyclic_chunks_are_full_except_the_last(
        range in range_strategy(),
        chunk in 1usize..64,
        workers in 1usize..9,
    ) {
        let mut all: Vec<Range<usize>> = (0..workers)
            .flat_map(|w| cyclic_chunks(range.clone(), chunk, workers, w))
            .collect();
        all.sort_by_key(|c| c.start);
        if let Some((last, rest)) = all.split_last() {
            prop_assert!(rest.iter().all(|c| c.len() == chunk));
            prop_assert!(last.len() <= chunk && !last.is_empty());
            prop_assert_eq!(last.end, range.end);
        } else {
            prop_assert!(range.is_empty());
        }
    }

    #[test]
    fn guided_claims_shrink_but_respect_minimum(
        len in 1usize..5000,
        min_chunk in 1usize..50,
        workers in 1usize..17,
    ) {
        let cursor = ChunkCursor::new(0..len);
        let mut prev = usize::MAX;
        let mut total = 0;
        while let Some(c) = cursor.claim_guided(min_chunk, workers) {
            let remaining = len - c.start;
            prop_assert_eq!(c.len(), guided_chunk_len(remaining, workers, min_chunk));
            prop_assert!(c.len() >= min_chunk.min(remaining));
            prop_assert!(c.len() <= prev);
            prev = c.len();
            total += c.len();
        }
        prop_assert_eq!(total, len);
        prop_assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn schedule_display_parses_back(schedule in schedule_strategy()) {
        let text = schedule.to_string();
        prop_assert_eq!(text.parse::<Schedule>().unwrap(), schedule);
    }
}

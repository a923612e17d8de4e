//! Property tests for real dispatch through the worker pool.
//!
//! Counts how often each index reaches a body call; every index in the
//! range must be seen exactly once and nothing outside it at all.

use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;

use loop_sched::scheduler::{LoopRuntime, Schedule, ScheduleKind};
use loop_sched::LoopScheduler;

const SPACE: usize = 600;

fn kind_strategy() -> impl Strategy<Value = ScheduleKind> {
    prop_oneof![
        Just(ScheduleKind::Static),
        Just(ScheduleKind::Dynamic),
        Just(ScheduleKind::Guided),
        Just(ScheduleKind::Auto),
    ]
}

proptest! {
    // Each case starts a team of threads; keep the case count modest.
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn each_index_dispatched_exactly_once(
        kind in kind_strategy(),
        chunk in 0usize..20,
        workers in 1usize..6,
        lo in 0usize..SPACE,
        len in 0usize..SPACE,
    ) {
        let hi = (lo + len).min(SPACE);
        let rt = LoopRuntime::new(workers, Schedule::new(kind, chunk)).unwrap();
        let hits: Vec<AtomicUsize> = (0..SPACE).map(|_| AtomicUsize::new(0)).collect();
        let calls = AtomicUsize::new(0);

        rt.parallel_for(lo..hi, &|r| {
            calls.fetch_add(1, Ordering::Relaxed);
            for i in r {
                hits[i].fetch_add(1, Ordering::Relaxed);
            }
        });

        for (i, h) in hits.iter().enumerate() {
            let want = usize::from(i >= lo && i < hi);
            prop_assert_eq!(h.load(Ordering::Relaxed), want, "index {}", i);
        }
        if lo == hi {
            prop_assert_eq!(calls.load(Ordering::Relaxed), 0);
        }
    }
}

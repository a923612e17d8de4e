//! Thread-local team member id.
//!
//! Pool workers set their id at startup; the thread that calls
//! [`WorkerPool::broadcast`](super::pool::WorkerPool::broadcast) is member 0
//! for the duration of the call. Any other thread sees `None`.

use std::cell::Cell;

const NO_WORKER: usize = usize::MAX;

thread_local! {
    static WORKER_ID: Cell<usize> = const { Cell::new(NO_WORKER) };
}

#[inline]
pub fn set_current_worker_id(id: Option<usize>) {
    WORKER_ID.with(|c| c.set(id.unwrap_or(NO_WORKER)));
}

/// Team member id of the current thread, if it is inside a parallel region
/// or is a pool worker.
#[inline]
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(|c| {
        let v = c.get();
        (v != NO_WORKER).then_some(v)
    })
}

/// Restores the previous id on drop.
///
/// The caller of a broadcast temporarily becomes member 0; nested or
/// sequential broadcasts from a pool worker must get its own id back.
pub(crate) struct WorkerIdGuard {
    prev: Option<usize>,
}

impl WorkerIdGuard {
    pub(crate) fn enter(id: usize) -> Self {
        let prev = current_worker_id();
        set_current_worker_id(Some(id));
        Self { prev }
    }
}

impl Drop for WorkerIdGuard {
    fn drop(&mut self) {
        set_current_worker_id(self.prev);
    }
}

// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The dispatch queue interface consumed by a timer factory: work
//! submission as the host's runtime provides it. `engine/dispatch`
//! implements this trait for its own queue types; the timer crate only
//! needs the single `queue_work_item` operation and does not depend on
//! `engine/dispatch` itself, keeping the dependency edge one-directional.

/// A sink that accepts zero-argument work items and guarantees eventual
/// execution on some worker, barring shutdown.
pub trait DispatchQueue: Send + Sync {
    /// Submits `action` for execution. Returns `false` if the queue is
    /// shutting down and cannot accept more work.
    fn queue_work_item(&self, action: Box<dyn FnOnce() + Send>) -> bool;
}

/// A [`DispatchQueue`] that runs every item inline, on whichever thread
/// calls `queue_work_item` — the "Immediate" variant. Used as the
/// default executor for a timer factory when no real dispatch queue has
/// been injected, matching `task_executor`'s preference for an explicit,
/// caller-visible fallback over a silently spawned thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatchQueue;

impl DispatchQueue for InlineDispatchQueue {
    fn queue_work_item(&self, action: Box<dyn FnOnce() + Send>) -> bool {
        action();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn inline_queue_runs_synchronously() {
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let queue = InlineDispatchQueue;
        assert!(queue.queue_work_item(Box::new(move || r.store(true, Ordering::SeqCst))));
        assert!(ran.load(Ordering::SeqCst));
    }
}

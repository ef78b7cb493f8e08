// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};

use crate::suspend::Suspend;

/// A reusable auto-reset event backing one blocking wait. Pooled rather
/// than allocated fresh per call, since a busy runtime may block many
/// worker threads on [`Suspend`] points concurrently.
struct WaitSlot {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl WaitSlot {
    fn new() -> Self {
        WaitSlot { ready: Mutex::new(false), condvar: Condvar::new() }
    }

    fn reset(&self) {
        *self.ready.lock() = false;
    }

    fn signal(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.condvar.notify_one();
    }

    fn wait(&self) {
        let mut ready = self.ready.lock();
        while !*ready {
            self.condvar.wait(&mut ready);
        }
    }

    /// Returns `true` if signalled before `timeout` elapsed.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.lock();
        if *ready {
            return true;
        }
        let result = self.condvar.wait_for(&mut ready, timeout);
        *ready || !result.timed_out()
    }
}

/// A free list of [`WaitSlot`]s backing blocking waits on any [`Suspend`]
/// point, per the "blocking accessor" contract — the bridge a
/// plain, non-coroutine thread uses to wait on a [`crate::DreamValue`] or
/// any other suspension point without spinning. Before parking, every wait
/// calls [`dispatch::drain_local_pending`] so a pool-worker thread runs its
/// own queued work rather than blocking on something only that same local
/// work could ever resolve.
pub struct BlockingWaitPool {
    free: Mutex<Vec<Arc<WaitSlot>>>,
}

static GLOBAL: OnceCell<BlockingWaitPool> = OnceCell::new();

impl BlockingWaitPool {
    pub fn new() -> Self {
        BlockingWaitPool { free: Mutex::new(Vec::new()) }
    }

    pub fn global() -> &'static BlockingWaitPool {
        GLOBAL.get_or_init(BlockingWaitPool::new)
    }

    /// Blocks the calling thread until `suspend` is ready, with no timeout.
    pub fn block(&self, suspend: &(impl Suspend + ?Sized)) {
        if suspend.poll_ready() {
            return;
        }
        dispatch::drain_local_pending();
        let slot = self.acquire_slot();
        let signal = slot.clone();
        suspend.register(Box::new(move || signal.signal()));
        slot.wait();
        self.release_slot(slot);
    }

    /// Blocks the calling thread until `suspend` is ready or `timeout`
    /// elapses. Returns `true` if `suspend` became ready.
    ///
    /// Note the returned slot may still be signalled after a timeout races
    /// with the caller giving up — harmless, since the slot is reset before
    /// its next use.
    pub fn wait_timeout(&self, suspend: &(impl Suspend + ?Sized), timeout: Duration) -> bool {
        if suspend.poll_ready() {
            return true;
        }
        dispatch::drain_local_pending();
        let slot = self.acquire_slot();
        let signal = slot.clone();
        suspend.register(Box::new(move || signal.signal()));
        let ready = slot.wait_timeout(timeout);
        self.release_slot(slot);
        ready || suspend.poll_ready()
    }

    fn acquire_slot(&self) -> Arc<WaitSlot> {
        let slot = self.free.lock().pop().unwrap_or_else(|| Arc::new(WaitSlot::new()));
        slot.reset();
        slot
    }

    fn release_slot(&self, slot: Arc<WaitSlot>) {
        self.free.lock().push(slot);
    }
}

impl Default for BlockingWaitPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DreamValue;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn block_returns_once_value_resolves() {
        let pool = BlockingWaitPool::new();
        let value: DreamValue<i32> = DreamValue::new();
        let producer = value.clone();
        thread::spawn(move || {
            thread::sleep(StdDuration::from_millis(20));
            producer.try_return(11);
        });
        pool.block(&value);
        assert!(value.has_finished());
    }

    #[test]
    fn wait_timeout_returns_false_when_never_resolved() {
        let pool = BlockingWaitPool::new();
        let value: DreamValue<i32> = DreamValue::new();
        assert!(!pool.wait_timeout(&value, StdDuration::from_millis(10)));
    }

    #[test]
    fn wait_timeout_returns_true_when_resolved_in_time() {
        let pool = BlockingWaitPool::new();
        let value: DreamValue<i32> = DreamValue::new();
        assert!(value.try_return(1));
        assert!(pool.wait_timeout(&value, StdDuration::from_millis(10)));
    }

    /// A single-worker `ElasticPool` cannot resolve a future by stealing —
    /// there is nobody else to steal for it. If a job running on that one
    /// worker pushes the resolving job onto its own deque and then blocks,
    /// the block must drain that local deque itself or deadlock forever.
    #[test]
    fn block_drains_its_own_workers_pending_item_instead_of_deadlocking() {
        use crate::Outcome;
        use std::sync::mpsc;

        let pool = Arc::new(dispatch::ElasticPool::with_defaults(1, 1));
        let env = task_env::TaskEnv::new(pool.clone(), timer::TimerFactory::global().clone());
        let value: DreamValue<i32> = DreamValue::new();

        let (done_tx, done_rx) = mpsc::channel();
        let inner_value = value.clone();
        let inner_env = env.acquire();
        env.invoke(move || {
            // Runs on the pool's single worker. This recursive submission
            // lands on that same worker's own deque, since no other worker
            // exists — exactly the case the drain must cover.
            let resolver = inner_value.clone();
            inner_env.invoke(move || {
                resolver.try_return(7);
            });
            BlockingWaitPool::new().block(&inner_value);
            done_tx.send(()).unwrap();
        });

        done_rx
            .recv_timeout(StdDuration::from_secs(2))
            .expect("block() must drain the worker's own deque instead of deadlocking");
        assert!(value.has_finished());
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        value.when_done(task_env::TaskEnv::none(), move |outcome| *s.lock() = Some(outcome));
        assert!(matches!(*seen.lock(), Some(Outcome::Value(7))));
        pool.shutdown();
    }
}

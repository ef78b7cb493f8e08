// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::error;
use lockfree::MsQueue;
use parking_lot::{Condvar, Mutex};
use timer::DispatchQueue;

type Job = Box<dyn FnOnce() + Send>;

struct Shared {
    queue: MsQueue<Job>,
    wake_lock: Mutex<()>,
    wake: Condvar,
    shutdown: AtomicBool,
}

/// A fixed-size, non-work-stealing thread pool: every worker pulls from the
/// same shared queue, FIFO, with no per-worker deques and no stealing.
///
/// The `threadpool` configuration key chooses between `elastic` and this
/// plain legacy pool as the fallback, grounded on
/// `task_executor::Executor`'s distinction between a runtime you own
/// outright and one you only hold a handle to — here the split is between
/// a pool that steals work (`ElasticPool`) and one that doesn't.
pub struct LegacyThreadPool {
    shared: Arc<Shared>,
    thread_count: usize,
}

impl LegacyThreadPool {
    pub fn new(thread_count: usize) -> Self {
        Self::with_stack_size(thread_count, None)
    }

    /// Like [`new`](Self::new), but spawns every worker thread with
    /// `stack_size` bytes of stack when given (the `max-stacksize`
    /// configuration key), instead of the host platform's default.
    pub fn with_stack_size(thread_count: usize, stack_size: Option<usize>) -> Self {
        assert!(thread_count >= 1, "a legacy pool needs at least one worker");
        let shared = Arc::new(Shared {
            queue: MsQueue::new(),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        for i in 0..thread_count {
            let shared = shared.clone();
            let mut builder = std::thread::Builder::new().name(format!("dream-legacy-pool-{i}"));
            if let Some(stack_size) = stack_size {
                builder = builder.stack_size(stack_size);
            }
            builder
                .spawn(move || worker_loop(shared))
                .expect("failed to spawn legacy pool worker");
        }
        LegacyThreadPool { shared, thread_count }
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _guard = self.shared.wake_lock.lock();
        self.shared.wake.notify_all();
    }
}

impl DispatchQueue for LegacyThreadPool {
    fn queue_work_item(&self, action: Job) -> bool {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        self.shared.queue.enqueue(action);
        let _guard = self.shared.wake_lock.lock();
        self.shared.wake.notify_one();
        true
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        if let Some(job) = shared.queue.dequeue() {
            run_job(job);
            continue;
        }
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let mut guard = shared.wake_lock.lock();
        shared.wake.wait_for(&mut guard, std::time::Duration::from_millis(500));
    }
}

fn run_job(job: Job) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!("panic in legacy pool worker: {message}");
    }
}

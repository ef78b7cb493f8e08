// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::error;
use lockfree::{DequeStats, MsQueue, StealResult, WorkStealingDeque};
use parking_lot::{Condvar, Mutex};
use timer::DispatchQueue;

type Job = Box<dyn FnOnce() + Send>;

/// Default idle period before a worker above `min_threads` exits, matching
/// the elastic pool's documented "threads exit after an idle period"
/// behavior.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

struct Worker {
    deque: Arc<WorkStealingDeque<Job>>,
}

struct Shared {
    pool_id: u64,
    overflow: MsQueue<Job>,
    workers: Mutex<Vec<Arc<Worker>>>,
    wake: Condvar,
    wake_lock: Mutex<()>,
    min_threads: usize,
    max_threads: usize,
    idle_timeout: Duration,
    stack_size: Option<usize>,
    idle_workers: AtomicUsize,
    next_worker_seq: AtomicUsize,
    shutdown: AtomicBool,
}

thread_local! {
    static CURRENT: RefCell<Option<(u64, Arc<WorkStealingDeque<Job>>)>> = const { RefCell::new(None) };
}

/// A work-stealing thread pool: each worker owns a
/// [`lockfree::WorkStealingDeque`], submissions from a pool thread go onto
/// its own deque, submissions from anywhere else go onto a shared overflow
/// [`lockfree::MsQueue`], and idle workers steal from their peers before
/// giving up and parking.
pub struct ElasticPool {
    shared: Arc<Shared>,
}

impl ElasticPool {
    /// Creates a pool with `min_threads` always-running workers, growing up
    /// to `max_threads` under load and shrinking back to `min_threads` after
    /// `idle_timeout` of inactivity per extra worker.
    pub fn new(min_threads: usize, max_threads: usize, idle_timeout: Duration) -> Self {
        Self::with_stack_size(min_threads, max_threads, idle_timeout, None)
    }

    /// Like [`new`](Self::new), but spawns every worker thread with
    /// `stack_size` bytes of stack when given (the `max-stacksize`
    /// configuration key), instead of the host platform's default.
    pub fn with_stack_size(
        min_threads: usize,
        max_threads: usize,
        idle_timeout: Duration,
        stack_size: Option<usize>,
    ) -> Self {
        assert!(min_threads >= 1, "an elastic pool needs at least one worker");
        assert!(max_threads >= min_threads, "max_threads must be >= min_threads");
        static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(0);
        let pool_id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed) as u64;
        let shared = Arc::new(Shared {
            pool_id,
            overflow: MsQueue::new(),
            workers: Mutex::new(Vec::new()),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
            min_threads,
            max_threads,
            idle_timeout,
            stack_size,
            idle_workers: AtomicUsize::new(0),
            next_worker_seq: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        });
        let pool = ElasticPool { shared };
        for _ in 0..min_threads {
            pool.spawn_worker(true);
        }
        pool
    }

    /// Creates a pool bounded by `min`/`max` worker counts from the
    /// `threadpool-min`/`threadpool-max` configuration keys, with the
    /// default idle timeout.
    pub fn with_defaults(min_threads: usize, max_threads: usize) -> Self {
        Self::new(min_threads, max_threads, DEFAULT_IDLE_TIMEOUT)
    }

    fn worker_count(&self) -> usize {
        self.shared.workers.lock().len()
    }

    fn spawn_worker(&self, permanent: bool) {
        let deque = Arc::new(WorkStealingDeque::new());
        let worker = Arc::new(Worker { deque: deque.clone() });
        self.shared.workers.lock().push(worker.clone());
        let shared = self.shared.clone();
        let seq = shared.next_worker_seq.fetch_add(1, Ordering::Relaxed);
        let mut builder = std::thread::Builder::new().name(format!("dream-elastic-{}-{seq}", shared.pool_id));
        if let Some(stack_size) = shared.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder
            .spawn(move || run_worker(shared, worker, deque, permanent))
            .expect("failed to spawn elastic pool worker");
    }

    /// An advisory snapshot of every live worker's push/pop/steal counters,
    /// per SPEC_FULL's `CountingStats` supplement.
    pub fn stats(&self) -> Vec<DequeStats> {
        self.shared.workers.lock().iter().map(|w| w.deque.stats()).collect()
    }

    /// Requests shutdown: no further items are accepted, and parked workers
    /// wake up and exit once their local work (and the overflow queue) is
    /// drained.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _guard = self.shared.wake_lock.lock();
        self.shared.wake.notify_all();
    }
}

/// Runs every job currently sitting in the calling thread's own local
/// deque, if the calling thread is an `ElasticPool` worker; a no-op
/// otherwise. A blocking wait invoked from inside a pool worker calls this
/// before parking (see `future::BlockingWaitPool`), since work pushed onto
/// this worker's own deque is reachable to other threads only by stealing
/// — and every other worker may be just as busy, or just as blocked,
/// leaving nobody free to steal it and resolve the wait.
pub fn drain_local_pending() {
    let deque = CURRENT.with(|cell| cell.borrow().as_ref().map(|(_, deque)| deque.clone()));
    if let Some(deque) = deque {
        while let Some(job) = deque.try_pop() {
            run_job(job);
        }
    }
}

impl DispatchQueue for ElasticPool {
    fn queue_work_item(&self, action: Job) -> bool {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let own_deque = CURRENT.with(|cell| {
            let slot = cell.borrow();
            match slot.as_ref() {
                Some((pool_id, deque)) if *pool_id == self.shared.pool_id => Some(deque.clone()),
                _ => None,
            }
        });
        if let Some(deque) = own_deque {
            deque.push(action);
            return true;
        }
        self.shared.overflow.enqueue(action);
        if self.shared.idle_workers.load(Ordering::Acquire) == 0
            && self.worker_count() < self.shared.max_threads
        {
            self.spawn_worker(false);
        }
        let _guard = self.shared.wake_lock.lock();
        self.shared.wake.notify_one();
        true
    }
}

fn run_worker(
    shared: Arc<Shared>,
    worker: Arc<Worker>,
    own_deque: Arc<WorkStealingDeque<Job>>,
    permanent: bool,
) {
    CURRENT.with(|cell| *cell.borrow_mut() = Some((shared.pool_id, own_deque.clone())));

    loop {
        if let Some(job) = own_deque.try_pop().or_else(|| shared.overflow.dequeue()) {
            run_job(job);
            continue;
        }
        if let Some(job) = steal_from_peers(&shared, &worker) {
            run_job(job);
            continue;
        }
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        shared.idle_workers.fetch_add(1, Ordering::AcqRel);
        let timed_out = {
            let mut guard = shared.wake_lock.lock();
            let result = shared.wake.wait_for(&mut guard, shared.idle_timeout);
            result.timed_out()
        };
        shared.idle_workers.fetch_sub(1, Ordering::AcqRel);

        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        if timed_out && !permanent && shared.workers.lock().len() > shared.min_threads {
            break;
        }
    }

    shared.workers.lock().retain(|w| !Arc::ptr_eq(w, &worker));
    CURRENT.with(|cell| *cell.borrow_mut() = None);
}

fn steal_from_peers(shared: &Shared, me: &Arc<Worker>) -> Option<Job> {
    let peers: Vec<Arc<Worker>> = shared
        .workers
        .lock()
        .iter()
        .filter(|w| !Arc::ptr_eq(w, me))
        .cloned()
        .collect();
    for peer in peers {
        loop {
            match peer.deque.try_steal() {
                StealResult::Success(job) => return Some(job),
                StealResult::Retry => continue,
                StealResult::Empty => break,
            }
        }
    }
    None
}

fn run_job(job: Job) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!("panic in elastic pool worker: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn runs_submitted_work() {
        let pool = ElasticPool::with_defaults(2, 4);
        let (tx, rx) = mpsc::channel();
        pool.queue_work_item(Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
        pool.shutdown();
    }

    #[test]
    fn many_items_all_run_exactly_once() {
        let pool = ElasticPool::with_defaults(4, 8);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for i in 0..2_000 {
            let seen = seen.clone();
            pool.queue_work_item(Box::new(move || seen.lock().unwrap().push(i)));
        }
        // Give the pool a generous window to drain.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if seen.lock().unwrap().len() == 2_000 || std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let mut got = seen.lock().unwrap().clone();
        got.sort_unstable();
        got.dedup();
        assert_eq!(got.len(), 2_000);
        pool.shutdown();
    }

    #[test]
    fn rejects_work_after_shutdown() {
        let pool = ElasticPool::with_defaults(1, 2);
        pool.shutdown();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!pool.queue_work_item(Box::new(|| {})));
    }

    #[test]
    fn drain_local_pending_is_a_no_op_off_a_pool_worker() {
        // The calling test thread is not an ElasticPool worker, so CURRENT
        // is unset and this must not panic or block.
        drain_local_pending();
    }

    #[test]
    fn drain_local_pending_runs_everything_sitting_on_the_calling_worker() {
        let pool = ElasticPool::with_defaults(1, 1);
        let (tx, rx) = mpsc::channel();
        // Submitted from this (non-worker) thread, so the items land on the
        // shared overflow queue and the single worker picks them up and
        // runs its own drain-local-pending call to prove it's wired up.
        pool.queue_work_item(Box::new(move || {
            // Push further work onto *this worker's own* deque, then drain
            // it inline the way a blocking wait would before parking.
            CURRENT.with(|cell| {
                let deque = cell.borrow().as_ref().unwrap().1.clone();
                let tx = tx.clone();
                deque.push(Box::new(move || tx.send(()).unwrap()) as Job);
            });
            drain_local_pending();
        }));
        rx.recv_timeout(Duration::from_secs(1))
            .expect("the job pushed onto the worker's own deque must have run during the drain");
        pool.shutdown();
    }
}

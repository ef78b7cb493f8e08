// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! The Dream task runtime: a facade over every layer of the engine, from
//! the lock-free primitives (L0) up through the utility combinators (L8).
//! This crate's own job is only to re-export that surface under one name,
//! own the configuration and logging glue a downstream host needs, and
//! carry the end-to-end integration tests that exercise more than one
//! layer at a time.

mod config;
mod logging;
mod runtime;

pub use config::RuntimeConfig;
pub use logging::init_logging;
pub use runtime::Runtime;

pub use combinators::{first_of, from_callback, join, sleep, Alt};
pub use coroutine::{current_stack_trace, Coroutine, CoroutineFrame, CoroutineNode, ExceptionMode, Suspension};
pub use dispatch::{
    DispatchQueue, ElasticPool, GlobalDispatchQueue, ImmediateQueue, LegacyThreadPool, SerialQueue,
    ThreadPoolKind, DEFAULT_IDLE_TIMEOUT,
};
pub use expiring::{CollectionChange, ExpiringDict, ExpiringKeySet, ExpiringSet, AUTO_REFRESH_COALESCE};
pub use future::{BlockingWaitPool, CleanupOutcome, DreamFuture, DreamValue, Outcome, RuntimeError, Suspend};
pub use lockfree::{DequeStats, MsQueue, RendezvousQueue, StealResult, TreiberStack, WorkStealingDeque};
pub use priority::{LockFreePriorityQueue, PriorityError, TimerHeap, TimerHeapEntry};
pub use task_env::{EnvKey, Lifespan, TaskEnv, TaskEnvError};
pub use timer::{
    GlobalClock, InlineDispatchQueue, SharedClock, TimerFactory, TimerHandle, TimerStatus,
    QUEUE_CUTOFF, QUEUE_RESCAN,
};

#[cfg(test)]
mod tests {
    //! Scenario tests exercising more than one layer together. Each one is
    //! named after the scenario it stands in for rather than copying its
    //! letter, so a failure message reads on its own.
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn detached_env() -> (TaskEnv, Arc<TimerFactory>) {
        let dispatch: Arc<dyn DispatchQueue> = Arc::new(dispatch::ImmediateQueue);
        let timers = TimerFactory::new_detached(dispatch.clone());
        (TaskEnv::new(dispatch, timers.clone()), timers)
    }

    // Scenario A: a coroutine that sleeps twice before resolving.
    struct CountsToThree {
        remaining: u32,
        env: TaskEnv,
        result: DreamValue<u32>,
    }

    impl Iterator for CountsToThree {
        type Item = Suspension;
        fn next(&mut self) -> Option<Self::Item> {
            if self.remaining == 0 {
                self.result.try_return(3);
                return None;
            }
            self.remaining -= 1;
            Some(Suspension::on(sleep(&self.env, Duration::from_millis(10))))
        }
    }

    struct CountsToThreeNode {
        env: TaskEnv,
    }

    impl CoroutineNode for CountsToThreeNode {
        type Output = u32;
        type Iter = CountsToThree;
        fn start(self) -> Self::Iter {
            CountsToThree { remaining: 3, env: self.env, result: DreamValue::new() }
        }
    }

    #[test]
    fn a_coroutine_sleeping_between_steps_eventually_resolves() {
        let (env, timers) = detached_env();
        let result = Coroutine::spawn(CountsToThreeNode { env: env.acquire() });
        assert!(!result.has_finished());

        for _ in 0..3 {
            timers.on_tick(Instant::now() + Duration::from_millis(20));
        }
        assert!(result.has_finished());
        assert!(matches!(result.block(), Outcome::Value(3)));
    }

    // Scenario B: cancelling a future with a cleanup callback registered
    // observes the cancellation through the cleanup path, not the normal
    // continuation path.
    #[test]
    fn cancelling_a_future_routes_through_cleanup_not_the_continuation() {
        let (env, _timers) = detached_env();
        let future: DreamValue<&str> = DreamValue::new();
        let continuation_fired = Arc::new(AtomicUsize::new(0));
        let cleanup_seen = Arc::new(Mutex::new(None));

        let c = continuation_fired.clone();
        future.when_done(env.acquire(), move |_outcome| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let seen = cleanup_seen.clone();
        future.on_cleanup(env.acquire(), move |outcome| *seen.lock().unwrap() = Some(outcome));

        assert!(future.cancel(RuntimeError::cancelled("caller gave up")));
        assert_eq!(continuation_fired.load(Ordering::SeqCst), 1, "the continuation observes the cancellation");

        // A producer that was already racing past the cancellation and
        // completes anyway routes to the cleanup slot instead of being lost.
        future.try_return("late");
        assert!(matches!(*cleanup_seen.lock().unwrap(), Some(Some(Outcome::Value("late")))));
    }

    // Scenario C: first_of races three alternatives; the winner resolves
    // the race and the losers are cancelled, a late one routed to discard.
    #[test]
    fn first_of_races_three_alternatives_to_one_winner() {
        let (env, _timers) = detached_env();
        let a: DreamValue<&str> = DreamValue::new();
        let b: DreamValue<&str> = DreamValue::new();
        let c: DreamValue<&str> = DreamValue::new();
        let discarded = Arc::new(Mutex::new(Vec::new()));
        let d = discarded.clone();
        let alt = first_of(&env, vec![a.clone(), b.clone(), c.clone()], move |value| {
            d.lock().unwrap().push(value)
        });

        b.try_return("B");
        assert!(a.has_finished() && c.has_finished(), "losers are cancelled");

        // A straggler producer racing past its own cancellation is routed
        // to discard rather than silently dropped.
        a.try_return("A-too-late");

        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        alt.future().when_done(env.acquire(), move |outcome| *s.lock().unwrap() = Some(outcome));
        assert!(matches!(*seen.lock().unwrap(), Some(Outcome::Value("B"))));
        assert_eq!(*discarded.lock().unwrap(), vec!["A-too-late"]);
    }

    // Scenario D: a future's construction-time timeout fires before any
    // producer resolves it.
    #[test]
    fn a_construction_time_timeout_cancels_an_unresolved_future() {
        let (env, timers) = detached_env();
        let future: DreamValue<()> = DreamValue::with_timeout(&env, Duration::from_millis(10));
        assert!(!future.has_finished());

        timers.on_tick(Instant::now() + Duration::from_millis(20));
        assert!(future.has_finished());

        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        future.when_done(env.acquire(), move |outcome| *s.lock().unwrap() = Some(outcome));
        match seen.lock().unwrap().as_ref().unwrap() {
            Outcome::Cancelled(e) | Outcome::Error(e) => assert!(e.is_timeout()),
            other => panic!("expected a timeout outcome, got {other:?}"),
        }
    }

    // Scenario E: an expiring set evicts a batch of entries in one timer
    // firing and broadcasts the eviction on its `entries_expired` channel.
    #[test]
    fn an_expiring_set_evicts_a_batch_in_one_firing() {
        let (_env, timers) = detached_env();
        let set: ExpiringSet<&str, u32> = ExpiringSet::new(timers.clone(), false);
        let mut expired_rx = set.entries_expired();

        let now = Instant::now();
        set.set_expiration("a", 1, now + Duration::from_millis(5), None, true);
        set.set_expiration("b", 2, now + Duration::from_millis(5), None, true);
        set.set_expiration("c", 3, now + Duration::from_secs(60), None, true);
        assert_eq!(set.len(), 3);

        timers.on_tick(now + Duration::from_millis(10));
        assert_eq!(set.len(), 1, "only the far-future entry survives");

        let batch = expired_rx.try_recv().expect("an eviction batch was broadcast");
        let mut keys: Vec<&str> = batch.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b"]);
    }

    // Scenario F: a work-stealing deque under contention from many thieves
    // loses and duplicates nothing. The deque's own crate carries the
    // detailed version of this test; here it stands for the "elastic pool
    // drains under load" integration claim at the facade level.
    #[test]
    fn a_work_stealing_deque_survives_concurrent_theft() {
        use std::thread;

        const ITEMS: usize = 10_000;
        const THIEVES: usize = 8;

        let deque = Arc::new(WorkStealingDeque::new());
        for i in 0..ITEMS {
            deque.push(i);
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let thieves: Vec<_> = (0..THIEVES)
            .map(|_| {
                let deque = deque.clone();
                let seen = seen.clone();
                thread::spawn(move || loop {
                    match deque.try_steal() {
                        StealResult::Success(v) => seen.lock().unwrap().push(v),
                        StealResult::Retry => continue,
                        StealResult::Empty => break,
                    }
                })
            })
            .collect();

        while let Some(v) = deque.try_pop() {
            seen.lock().unwrap().push(v);
        }
        for thief in thieves {
            thief.join().unwrap();
        }

        let mut all = seen.lock().unwrap().clone();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), ITEMS);
    }
}

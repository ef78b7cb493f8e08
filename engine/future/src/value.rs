// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use task_env::TaskEnv;
use timer::TimerHandle;

use crate::error::RuntimeError;
use crate::state::{CleanupOutcome, Outcome, State};
use crate::suspend::Suspend;
use crate::wait_pool::BlockingWaitPool;

type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send>;
type Cleanup<T> = Box<dyn FnOnce(CleanupOutcome<T>) + Send>;

struct Inner<T> {
    state: Mutex<State<T>>,
    continuation: Mutex<Option<(TaskEnv, Continuation<T>)>>,
    cleanup: Mutex<Option<(TaskEnv, Cleanup<T>)>>,
    /// Count of continuations attached while still unresolved — a
    /// diagnostic, mirroring `async_value`'s outstanding-receiver count.
    pending: AtomicUsize,
    timeout_timer: Mutex<Option<Arc<TimerHandle>>>,
}

/// A cancellable, single-assignment future/promise.
///
/// Every state transition happens under `state`'s lock; the continuation
/// and cleanup callbacks are always invoked outside it, so a callback that
/// re-enters this future (registers another continuation, reads
/// `has_finished`) cannot deadlock. `T` must be `Clone` because more than
/// one path — a continuation, a late cleanup, a blocking waiter, a second
/// `has_finished()` poll — may need to read the same resolved outcome;
/// `async_value::AsyncValue<T>` carries the identical `Clone` bound for the
/// same reason.
pub struct DreamValue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DreamValue<T> {
    fn clone(&self) -> Self {
        DreamValue { inner: self.inner.clone() }
    }
}

/// The untyped sibling named here: a future whose producer
/// side never needs to hand back a value, only succeed, fail, or be
/// cancelled.
pub type DreamFuture = DreamValue<()>;

impl<T: Clone + Send + 'static> DreamValue<T> {
    pub fn new() -> Self {
        DreamValue {
            inner: Arc::new(Inner {
                state: Mutex::new(State::New),
                continuation: Mutex::new(None),
                cleanup: Mutex::new(None),
                pending: AtomicUsize::new(0),
                timeout_timer: Mutex::new(None),
            }),
        }
    }

    /// Arms a construction-time timeout: if the future hasn't resolved by
    /// `delay`, it is cancelled with [`RuntimeError::timeout`]. The timer is
    /// cancelled the moment the future resolves by any other path.
    pub fn with_timeout(env: &TaskEnv, delay: Duration) -> Self {
        let value = Self::new();
        let armed = value.clone();
        let handle = env.timers().arm_after(delay, move || {
            armed.cancel(RuntimeError::timeout());
        });
        *value.inner.timeout_timer.lock() = Some(handle);
        value
    }

    /// Producer: resolves the future with a value. Returns `false` if the
    /// producer has already terminally completed (a second `try_return`,
    /// `try_throw`, or `confirm_cancel` after the first).
    pub fn try_return(&self, value: T) -> bool {
        self.complete(Outcome::Value(value))
    }

    /// Producer: resolves the future with an error.
    pub fn try_throw(&self, error: RuntimeError) -> bool {
        self.complete(Outcome::Error(error))
    }

    /// Consumer or owner: requests cancellation. Idempotent — only the
    /// first call (while still `New`) has any effect; every later call
    /// returns `false`, including calls after the producer has already
    /// resolved the future normally.
    pub fn cancel(&self, reason: RuntimeError) -> bool {
        let mut state = self.inner.state.lock();
        if !matches!(&*state, State::New) {
            return false;
        }
        *state = State::Cancel(reason.clone());
        drop(state);

        let registered = self.inner.continuation.lock().take();
        if let Some((env, continuation)) = registered {
            self.inner.pending.fetch_sub(1, Ordering::Relaxed);
            *self.inner.state.lock() = State::ObservedCancel(reason.clone());
            let _ = env.invoke_now(move || continuation(Outcome::Cancelled(reason)));
        }
        self.cancel_timeout();
        true
    }

    /// Producer: confirms a pending cancellation, releasing any registered
    /// cleanup with `None` (no real outcome ever arrived). Returns `false`
    /// if there was no pending cancellation to confirm, or the producer has
    /// already terminally completed.
    pub fn confirm_cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        let reason = match &*state {
            State::Cancel(r) | State::ObservedCancel(r) => r.clone(),
            _ => return false,
        };
        *state = State::ConfirmedCancel(reason);
        drop(state);
        self.route_to_cleanup(None);
        self.cancel_timeout();
        true
    }

    /// `true` once the future has an outcome — a value, an error, or a
    /// (possibly unconfirmed) cancellation. Reading this while the state is
    /// a plain, unobserved `Cancel` locks the outcome as `ObservedCancel`:
    /// any producer completion arriving afterwards is routed to cleanup
    /// instead of overwriting what this caller just saw.
    pub fn has_finished(&self) -> bool {
        self.peek_and_observe().is_some()
    }

    /// Registers a continuation to run exactly once, when the future
    /// resolves — the "when-done". `env` is acquired for the
    /// duration of the callback so it runs restored into the caller's
    /// environment. If the future has already resolved, `continuation` runs
    /// immediately, inline, under `env`.
    pub fn when_done(
        &self,
        env: TaskEnv,
        continuation: impl FnOnce(Outcome<T>) + Send + 'static,
    ) {
        if let Some(outcome) = self.peek_and_observe() {
            let _ = env.invoke_now(move || continuation(outcome));
            return;
        }
        self.inner.pending.fetch_add(1, Ordering::Relaxed);
        *self.inner.continuation.lock() = Some((env, Box::new(continuation)));
    }

    /// Registers a cleanup to run exactly once: when a real producer
    /// outcome arrives after the consumer already observed cancellation, or
    /// when the cancellation is confirmed without ever producing a value.
    /// Never runs at all if the future resolves normally without any
    /// cancellation in its history.
    pub fn on_cleanup(
        &self,
        env: TaskEnv,
        cleanup: impl FnOnce(CleanupOutcome<T>) + Send + 'static,
    ) {
        *self.inner.cleanup.lock() = Some((env, Box::new(cleanup)));
    }

    /// Diagnostic: continuations currently attached and awaiting
    /// resolution.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.load(Ordering::Relaxed)
    }

    /// Blocks the calling thread until this future resolves, with no
    /// timeout. Exists only for migration from synchronous code — coroutine
    /// bodies suspend instead, per §4.3's "Blocking wait".
    pub fn block(&self) -> Outcome<T> {
        BlockingWaitPool::global().block(self);
        self.peek_and_observe().expect("resolved after a blocking wait")
    }

    /// Blocks the calling thread until this future resolves or `timeout`
    /// elapses, whichever comes first. Returns `None` on timeout.
    pub fn wait(&self, timeout: Duration) -> Option<Outcome<T>> {
        if BlockingWaitPool::global().wait_timeout(self, timeout) {
            self.peek_and_observe()
        } else {
            None
        }
    }

    /// Blocks the calling thread until this future resolves or `signal`
    /// becomes ready first — `Wait(signal)` in spec.md §4.3, letting a
    /// migration caller race a blocking wait against, say, a shutdown
    /// latch. Returns `None` if `signal` won the race.
    pub fn wait_signal(&self, signal: &(impl Suspend + ?Sized)) -> Option<Outcome<T>> {
        if let Some(outcome) = self.peek_and_observe() {
            return Some(outcome);
        }
        if signal.poll_ready() {
            return None;
        }

        let race: Arc<(Mutex<Option<bool>>, Condvar)> = Arc::new((Mutex::new(None), Condvar::new()));

        let value_race = race.clone();
        self.register(Box::new(move || {
            let mut winner = value_race.0.lock();
            if winner.is_none() {
                *winner = Some(true);
                value_race.1.notify_all();
            }
        }));
        let signal_race = race.clone();
        signal.register(Box::new(move || {
            let mut winner = signal_race.0.lock();
            if winner.is_none() {
                *winner = Some(false);
                signal_race.1.notify_all();
            }
        }));

        let mut winner = race.0.lock();
        while winner.is_none() {
            race.1.wait(&mut winner);
        }
        if winner.unwrap() {
            drop(winner);
            self.peek_and_observe()
        } else {
            None
        }
    }

    fn complete(&self, result: Outcome<T>) -> bool {
        debug_assert!(!result.is_cancelled(), "producer completion is never Cancelled");
        let mut state = self.inner.state.lock();
        match &*state {
            State::New => {
                *state = Self::state_from_outcome(&result);
                drop(state);
                self.fire_terminal(result);
                self.cancel_timeout();
                true
            }
            State::Cancel(_) => {
                // Consumer never observed the cancellation; the real
                // outcome wins and no continuation can be registered here
                // (registering while Cancel fires — and observes —
                // immediately, which would have moved us to ObservedCancel).
                *state = Self::state_from_outcome(&result);
                drop(state);
                self.fire_terminal(result);
                self.cancel_timeout();
                true
            }
            State::ObservedCancel(_) => {
                drop(state);
                self.route_to_cleanup(Some(result));
                self.cancel_timeout();
                true
            }
            State::Value(_) | State::Error(_) | State::ConfirmedCancel(_) => false,
        }
    }

    fn state_from_outcome(outcome: &Outcome<T>) -> State<T> {
        match outcome {
            Outcome::Value(v) => State::Value(v.clone()),
            Outcome::Error(e) => State::Error(e.clone()),
            Outcome::Cancelled(_) => unreachable!("producer completion is never Cancelled"),
        }
    }

    fn fire_terminal(&self, outcome: Outcome<T>) {
        let registered = self.inner.continuation.lock().take();
        if let Some((env, continuation)) = registered {
            self.inner.pending.fetch_sub(1, Ordering::Relaxed);
            let _ = env.invoke_now(move || continuation(outcome));
        }
    }

    fn route_to_cleanup(&self, result: CleanupOutcome<T>) {
        let registered = self.inner.cleanup.lock().take();
        if let Some((env, cleanup)) = registered {
            let _ = env.invoke_now(move || cleanup(result));
        }
    }

    fn cancel_timeout(&self) {
        if let Some(handle) = self.inner.timeout_timer.lock().take() {
            handle.cancel();
        }
    }

    /// Pure peek: `true` if an outcome is already present, without
    /// transitioning a plain `Cancel` into `ObservedCancel`. Used by
    /// [`Suspend::poll_ready`], which must not have observation side
    /// effects of its own.
    fn peek(&self) -> Option<Outcome<T>> {
        match &*self.inner.state.lock() {
            State::New => None,
            State::Value(v) => Some(Outcome::Value(v.clone())),
            State::Error(e) => Some(Outcome::Error(e.clone())),
            State::Cancel(r) => Some(Outcome::Cancelled(r.clone())),
            State::ConfirmedCancel(r) => Some(Outcome::Cancelled(r.clone())),
            State::ObservedCancel(r) => Some(Outcome::Cancelled(r.clone())),
        }
    }

    fn peek_and_observe(&self) -> Option<Outcome<T>> {
        let mut state = self.inner.state.lock();
        match &*state {
            State::New => None,
            State::Value(v) => Some(Outcome::Value(v.clone())),
            State::Error(e) => Some(Outcome::Error(e.clone())),
            State::Cancel(r) => {
                let reason = r.clone();
                *state = State::ObservedCancel(reason.clone());
                Some(Outcome::Cancelled(reason))
            }
            State::ConfirmedCancel(r) => Some(Outcome::Cancelled(r.clone())),
            State::ObservedCancel(r) => Some(Outcome::Cancelled(r.clone())),
        }
    }
}

impl<T: Clone + Send + 'static> Default for DreamValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Suspend for DreamValue<T> {
    fn poll_ready(&self) -> bool {
        self.peek().is_some()
    }

    fn register(&self, wake: Box<dyn FnOnce() + Send>) {
        let env = TaskEnv::current().unwrap_or_else(TaskEnv::none);
        self.when_done(env, move |_outcome| wake());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    fn env() -> TaskEnv {
        TaskEnv::none()
    }

    #[test]
    fn return_then_register_fires_immediately() {
        let v: DreamValue<i32> = DreamValue::new();
        assert!(v.try_return(7));
        let seen = Arc::new(StdMutex::new(None));
        let seen2 = seen.clone();
        v.when_done(env(), move |outcome| *seen2.lock().unwrap() = Some(outcome));
        assert!(matches!(*seen.lock().unwrap(), Some(Outcome::Value(7))));
    }

    #[test]
    fn register_then_return_fires_continuation() {
        let v: DreamValue<i32> = DreamValue::new();
        let seen = Arc::new(StdMutex::new(None));
        let seen2 = seen.clone();
        v.when_done(env(), move |outcome| *seen2.lock().unwrap() = Some(outcome));
        assert_eq!(v.pending_count(), 1);
        assert!(v.try_return(9));
        assert!(matches!(*seen.lock().unwrap(), Some(Outcome::Value(9))));
        assert_eq!(v.pending_count(), 0);
    }

    #[test]
    fn second_return_fails_after_first() {
        let v: DreamValue<i32> = DreamValue::new();
        assert!(v.try_return(1));
        assert!(!v.try_return(2));
        assert!(!v.try_throw(RuntimeError::generic("nope")));
    }

    #[test]
    fn cancel_before_registration_delivers_cancelled_on_register() {
        let v: DreamValue<i32> = DreamValue::new();
        assert!(v.cancel(RuntimeError::cancelled("shutdown")));
        assert!(!v.cancel(RuntimeError::cancelled("again")));
        let seen = Arc::new(StdMutex::new(None));
        let seen2 = seen.clone();
        v.when_done(env(), move |outcome| *seen2.lock().unwrap() = Some(outcome));
        assert!(matches!(*seen.lock().unwrap(), Some(Outcome::Cancelled(_))));
    }

    #[test]
    fn return_after_unobserved_cancel_wins() {
        let v: DreamValue<i32> = DreamValue::new();
        assert!(v.cancel(RuntimeError::cancelled("racy")));
        // Nobody registered or polled has_finished, so Cancel is unobserved.
        assert!(v.try_return(42));
        let seen = Arc::new(StdMutex::new(None));
        let seen2 = seen.clone();
        v.when_done(env(), move |outcome| *seen2.lock().unwrap() = Some(outcome));
        assert!(matches!(*seen.lock().unwrap(), Some(Outcome::Value(42))));
    }

    #[test]
    fn return_after_observed_cancel_routes_to_cleanup_only() {
        let v: DreamValue<i32> = DreamValue::new();
        assert!(v.cancel(RuntimeError::cancelled("observed")));
        assert!(v.has_finished()); // observes: Cancel -> ObservedCancel
        let cleaned = Arc::new(AtomicBool::new(false));
        let cleaned2 = cleaned.clone();
        v.on_cleanup(env(), move |outcome| {
            assert!(matches!(outcome, Some(Outcome::Value(5))));
            cleaned2.store(true, Ordering::SeqCst);
        });
        assert!(v.try_return(5));
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[test]
    fn confirm_cancel_runs_cleanup_with_none() {
        let v: DreamValue<i32> = DreamValue::new();
        assert!(v.cancel(RuntimeError::cancelled("bye")));
        let cleaned = Arc::new(AtomicBool::new(false));
        let cleaned2 = cleaned.clone();
        v.on_cleanup(env(), move |outcome| {
            assert!(outcome.is_none());
            cleaned2.store(true, Ordering::SeqCst);
        });
        assert!(v.confirm_cancel());
        assert!(cleaned.load(Ordering::SeqCst));
        assert!(!v.confirm_cancel());
        assert!(!v.try_return(1));
    }

    #[test]
    fn poll_ready_does_not_observe() {
        let v: DreamValue<i32> = DreamValue::new();
        assert!(v.cancel(RuntimeError::cancelled("peek")));
        assert!(Suspend::poll_ready(&v));
        // Still unobserved: a later producer completion should win outright.
        assert!(v.try_return(3));
        let seen = Arc::new(StdMutex::new(None));
        let seen2 = seen.clone();
        v.when_done(env(), move |outcome| *seen2.lock().unwrap() = Some(outcome));
        assert!(matches!(*seen.lock().unwrap(), Some(Outcome::Value(3))));
    }

    #[test]
    fn block_returns_once_another_thread_resolves_it() {
        let v: DreamValue<i32> = DreamValue::new();
        let producer = v.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.try_return(99);
        });
        assert!(matches!(v.block(), Outcome::Value(99)));
    }

    #[test]
    fn wait_with_timeout_returns_none_when_unresolved() {
        let v: DreamValue<i32> = DreamValue::new();
        assert!(v.wait(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn wait_signal_returns_none_when_signal_wins_the_race() {
        let v: DreamValue<i32> = DreamValue::new();
        let signal: DreamValue<()> = DreamValue::new();
        signal.try_return(());
        assert!(v.wait_signal(&signal).is_none());
    }

    #[test]
    fn wait_signal_returns_outcome_when_value_wins_the_race() {
        let v: DreamValue<i32> = DreamValue::new();
        let signal: DreamValue<()> = DreamValue::new();
        assert!(v.try_return(5));
        assert!(matches!(v.wait_signal(&signal), Some(Outcome::Value(5))));
    }
}

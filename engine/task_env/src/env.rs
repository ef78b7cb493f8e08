// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::error;
use parking_lot::Mutex;
use timer::{DispatchQueue, InlineDispatchQueue, TimerFactory};

use crate::error::TaskEnvError;
use crate::lifespan::Lifespan;

/// A key into a [`TaskEnv`]'s state map: either a type tag (the common case,
/// keying by the Rust type of the stored value) or an explicit string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvKey {
    Type(TypeId),
    Name(String),
}

impl EnvKey {
    pub fn of<T: 'static>() -> Self {
        EnvKey::Type(TypeId::of::<T>())
    }

    pub fn named(name: impl Into<String>) -> Self {
        EnvKey::Name(name.into())
    }
}

enum Entry {
    Plain(Arc<dyn Any + Send + Sync>),
    Lifespan(Mutex<Box<dyn Lifespan>>),
}

impl Entry {
    fn fork(&self) -> Entry {
        match self {
            Entry::Plain(value) => Entry::Plain(value.clone()),
            Entry::Lifespan(state) => Entry::Lifespan(Mutex::new(state.lock().clone_state())),
        }
    }
}

struct Inner {
    state: Mutex<Option<HashMap<EnvKey, Entry>>>,
    dispatch: Arc<dyn DispatchQueue>,
    timers: Arc<TimerFactory>,
    refcount: AtomicUsize,
}

/// The ambient execution environment bound to a unit of scheduled work:
/// keyed state, a dispatch queue, a timer factory, and a manual reference
/// count. Unlike a plain `Arc<T>`, reaching a refcount of
/// zero here runs [`Lifespan::dispose`] on every lifespan-bearing entry —
/// tracked explicitly via [`acquire`](TaskEnv::acquire)/[`release`](TaskEnv::release)
/// rather than left to `Drop`, because disposal must run synchronously at
/// the moment the count hits zero, not whenever the last handle happens to
/// be dropped.
pub struct TaskEnv {
    inner: Arc<Inner>,
}

thread_local! {
    static CURRENT: RefCell<Option<TaskEnv>> = const { RefCell::new(None) };
}

impl TaskEnv {
    /// Creates a fresh, empty environment bound to `dispatch` and `timers`,
    /// with a starting reference count of one.
    pub fn new(dispatch: Arc<dyn DispatchQueue>, timers: Arc<TimerFactory>) -> Self {
        TaskEnv {
            inner: Arc::new(Inner {
                state: Mutex::new(Some(HashMap::new())),
                dispatch,
                timers,
                refcount: AtomicUsize::new(1),
            }),
        }
    }

    /// The null environment: an inline dispatch queue and the global timer
    /// factory, no state. Used where this crate calls for a `None` factory —
    /// e.g. running a one-off action with no ambient state to propagate.
    pub fn none() -> Self {
        TaskEnv::new(Arc::new(InlineDispatchQueue), TimerFactory::global().clone())
    }

    /// Forks a child environment: shares this environment's dispatch queue
    /// and timer factory, but gets its own state map seeded from this one —
    /// lifespan-bearing entries are deep-copied via [`Lifespan::clone_state`],
    /// everything else is shared by reference. The child's refcount starts
    /// at one, independent of the parent's.
    pub fn fork(&self) -> Self {
        let forked_state = {
            let state = self.inner.state.lock();
            let state = state.as_ref().expect("fork of a disposed environment");
            state
                .iter()
                .map(|(key, entry)| (key.clone(), entry.fork()))
                .collect()
        };
        TaskEnv {
            inner: Arc::new(Inner {
                state: Mutex::new(Some(forked_state)),
                dispatch: self.inner.dispatch.clone(),
                timers: self.inner.timers.clone(),
                refcount: AtomicUsize::new(1),
            }),
        }
    }

    /// Returns another handle to this same environment, incrementing its
    /// reference count. The returned handle and `self` refer to identical
    /// state; [`release`](Self::release) must be called once for every
    /// `acquire`.
    pub fn acquire(&self) -> Self {
        self.inner.refcount.fetch_add(1, Ordering::AcqRel);
        TaskEnv { inner: self.inner.clone() }
    }

    /// Releases one reference. When the count reaches zero, every
    /// lifespan-bearing state entry is disposed and the environment becomes
    /// unusable.
    pub fn release(&self) {
        if self.inner.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(state) = self.inner.state.lock().take() {
                for (_, entry) in state {
                    if let Entry::Lifespan(cell) = entry {
                        cell.lock().dispose();
                    }
                }
            }
        }
    }

    pub fn dispatch(&self) -> &Arc<dyn DispatchQueue> {
        &self.inner.dispatch
    }

    pub fn timers(&self) -> &Arc<TimerFactory> {
        &self.inner.timers
    }

    /// Stores a plain, shareable value under `key`. Shallow-copied on fork.
    pub fn set(&self, key: EnvKey, value: impl Any + Send + Sync) -> Result<(), TaskEnvError> {
        let mut state = self.inner.state.lock();
        let state = state.as_mut().ok_or_else(TaskEnvError::disposed)?;
        state.insert(key, Entry::Plain(Arc::new(value)));
        Ok(())
    }

    /// Stores a lifespan-bearing value under `key`. Deep-copied on fork,
    /// disposed when the environment's refcount reaches zero.
    pub fn set_lifespan(
        &self,
        key: EnvKey,
        value: Box<dyn Lifespan>,
    ) -> Result<(), TaskEnvError> {
        let mut state = self.inner.state.lock();
        let state = state.as_mut().ok_or_else(TaskEnvError::disposed)?;
        state.insert(key, Entry::Lifespan(Mutex::new(value)));
        Ok(())
    }

    /// Retrieves a clone of the plain value stored under `key`, if present
    /// and of type `T`.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &EnvKey) -> Option<T> {
        let state = self.inner.state.lock();
        let state = state.as_ref()?;
        match state.get(key)? {
            Entry::Plain(value) => value.downcast_ref::<T>().cloned(),
            Entry::Lifespan(_) => None,
        }
    }

    /// Runs `f` against the lifespan entry stored under `key`, if present
    /// and of type `T`.
    pub fn with_lifespan<T: 'static, R>(
        &self,
        key: &EnvKey,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let state = self.inner.state.lock();
        let state = state.as_ref()?;
        match state.get(key)? {
            Entry::Lifespan(cell) => {
                let mut guard = cell.lock();
                guard.as_any_mut().downcast_mut::<T>().map(f)
            }
            Entry::Plain(_) => None,
        }
    }

    /// Returns the environment currently bound to this worker thread, if
    /// any — the "current environment" slot.
    pub fn current() -> Option<TaskEnv> {
        CURRENT.with(|cell| cell.borrow().as_ref().map(|env| env.acquire()))
    }

    /// Runs `f` synchronously on the calling thread with this environment
    /// bound as "current", restoring whatever was current beforehand, and
    /// capturing any panic as a [`TaskEnvError::Panicked`].
    pub fn invoke_now<R>(&self, f: impl FnOnce() -> R) -> Result<R, TaskEnvError> {
        let previous = CURRENT.with(|cell| cell.replace(Some(self.acquire())));
        let result = catch_unwind(AssertUnwindSafe(f));
        let ours = CURRENT.with(|cell| cell.replace(previous));
        if let Some(ours) = ours {
            ours.release();
        }
        result.map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            TaskEnvError::panicked(message)
        })
    }

    /// Routes `f` through this environment's bound dispatch queue (or runs
    /// it immediately if the queue rejects the item), releasing one
    /// acquisition when it completes. Unhandled panics are logged, never
    /// propagated — the dispatch queue is not a result channel.
    pub fn invoke(&self, f: impl FnOnce() + Send + 'static) {
        let action = self.make_action(f);
        // `queue_work_item` takes `action` by value, so a rejecting queue
        // has nothing left to hand back to us. Hold it behind a shared slot
        // instead: the boxed job we submit merely takes-and-runs whatever is
        // in the slot, so if the queue drops that box unrun (rejecting the
        // item), the job itself is still sitting in the slot for us to run
        // inline — the acquisition `make_action` made is never stranded.
        let slot: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>> = Arc::new(Mutex::new(Some(action)));
        let for_queue = slot.clone();
        let wrapper: Box<dyn FnOnce() + Send> = Box::new(move || {
            if let Some(job) = for_queue.lock().take() {
                job();
            }
        });
        if self.inner.dispatch.queue_work_item(wrapper) {
            return;
        }
        error!("TaskEnv::invoke could not submit work, running inline: dispatch queue is shut down");
        if let Some(job) = slot.lock().take() {
            job();
        }
    }

    /// Wraps `f` in a closure that has already acquired this environment;
    /// the acquisition is released the first (and only) time the closure
    /// runs. Safe to hand to any scheduler, since the environment cannot be
    /// disposed out from under a delegate already committed to run it.
    pub fn make_action(&self, f: impl FnOnce() + Send + 'static) -> Box<dyn FnOnce() + Send> {
        let env = self.acquire();
        Box::new(move || {
            let result = env.invoke_now(f);
            env.release();
            if let Err(err) = result {
                error!("unhandled panic in dispatched task: {err}");
            }
        })
    }
}

impl Drop for TaskEnv {
    fn drop(&mut self) {
        // A dropped handle is not an implicit `release()`: the manual
        // acquire/release protocol is the disposal authority, matching
        // this environment's explicit refcounting rather than Rust's ownership-drop
        // idiom. Handles that are never released simply keep their
        // environment's state alive, same as a leaked reference would.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Counter(Arc<AtomicUsize>);

    impl Lifespan for Counter {
        fn clone_state(&self) -> Box<dyn Lifespan> {
            Box::new(Counter(self.0.clone()))
        }
        fn dispose(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn test_env() -> TaskEnv {
        TaskEnv::new(Arc::new(InlineDispatchQueue), TimerFactory::global().clone())
    }

    #[test]
    fn plain_values_round_trip_through_set_and_get() {
        let env = test_env();
        let key = EnvKey::named("magic");
        env.set(key.clone(), 42_i32).unwrap();
        assert_eq!(env.get::<i32>(&key), Some(42));
    }

    #[test]
    fn disposal_runs_exactly_at_refcount_zero() {
        let env = test_env();
        let disposes = Arc::new(AtomicUsize::new(0));
        env.set_lifespan(EnvKey::of::<Counter>(), Box::new(Counter(disposes.clone())))
            .unwrap();

        let handle = env.acquire();
        env.release();
        assert_eq!(disposes.load(Ordering::SeqCst), 0, "one handle still outstanding");
        handle.release();
        assert_eq!(disposes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fork_deep_copies_lifespan_entries() {
        let env = test_env();
        let disposes = Arc::new(AtomicUsize::new(0));
        env.set_lifespan(EnvKey::of::<Counter>(), Box::new(Counter(disposes.clone())))
            .unwrap();

        let child = env.fork();
        env.release();
        assert_eq!(disposes.load(Ordering::SeqCst), 1, "parent's copy disposed independently");
        child.release();
        assert_eq!(disposes.load(Ordering::SeqCst), 2, "child's copy disposed too");
    }

    #[test]
    fn invoke_now_binds_and_restores_current() {
        let outer = test_env();
        let inner = test_env();
        assert!(TaskEnv::current().is_none());
        outer
            .invoke_now(|| {
                assert!(TaskEnv::current().is_some());
                inner
                    .invoke_now(|| {
                        assert!(TaskEnv::current().is_some());
                    })
                    .unwrap();
                assert!(TaskEnv::current().is_some());
            })
            .unwrap();
        assert!(TaskEnv::current().is_none());
    }

    #[test]
    fn invoke_now_captures_panics_as_task_env_error() {
        let env = test_env();
        let result = env.invoke_now(|| -> () { panic!("boom") });
        assert!(matches!(result, Err(TaskEnvError::Panicked { .. })));
    }

    #[test]
    fn make_action_runs_exactly_once_and_releases() {
        let env = test_env();
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let action = env.make_action(move || r.store(true, Ordering::SeqCst));
        action();
        assert!(ran.load(Ordering::SeqCst));
    }

    /// A dispatch queue that always rejects, like a shut-down
    /// `ElasticPool`/`LegacyThreadPool` — it drops every item unrun.
    struct RejectingQueue;
    impl DispatchQueue for RejectingQueue {
        fn queue_work_item(&self, _action: Box<dyn FnOnce() + Send>) -> bool {
            false
        }
    }

    #[test]
    fn invoke_runs_inline_when_the_dispatch_queue_rejects_the_item() {
        let env = TaskEnv::new(Arc::new(RejectingQueue), TimerFactory::global().clone());
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        env.invoke(move || r.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst), "rejected work must still run, inline");
    }

    #[test]
    fn invoke_does_not_leak_the_acquisition_when_the_queue_rejects() {
        let env = TaskEnv::new(Arc::new(RejectingQueue), TimerFactory::global().clone());
        let disposes = Arc::new(AtomicUsize::new(0));
        env.set_lifespan(EnvKey::of::<Counter>(), Box::new(Counter(disposes.clone())))
            .unwrap();

        env.invoke(|| {});
        env.release();
        assert_eq!(disposes.load(Ordering::SeqCst), 1, "invoke's acquisition must be released");
    }
}

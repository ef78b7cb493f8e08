// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use log::warn;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use priority::TimerHeap;

use crate::clock::GlobalClock;
use crate::dispatch::{DispatchQueue, InlineDispatchQueue};

/// Timers firing within this long go straight into the priority queue.
/// Timers firing further out sit in the pending set until promoted.
pub const QUEUE_CUTOFF: Duration = Duration::from_secs(30);

/// How often the factory rescans its pending set for timers that have
/// crossed into the cutoff window.
pub const QUEUE_RESCAN: Duration = Duration::from_secs(25);

/// A timer's lifecycle state. `Locked` is a transient state held only
/// while a CAS-protected transition is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Done,
    Pending,
    Queued,
    Locked,
}

struct TimerState {
    fire_at: Instant,
    status: TimerStatus,
    /// Bumped on every `change()`. Lets a stale priority-queue or pending-set
    /// entry recognize it has been superseded without needing true removal
    /// from either collection (both are lazily pruned).
    generation: u64,
}

/// A handle to one armed timer. Held by both its owner and the factory that
/// scheduled it; neither side mutates the other's view without going
/// through the owning [`TimerFactory`].
pub struct TimerHandle {
    id: u64,
    state: Mutex<TimerState>,
    handler: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    factory: Weak<TimerFactory>,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> TimerStatus {
        self.state.lock().status
    }

    pub fn fire_at(&self) -> Instant {
        self.state.lock().fire_at
    }

    pub fn is_done(&self) -> bool {
        self.status() == TimerStatus::Done
    }

    /// Reschedules this timer to fire at `new_fire_at`. Returns `false` if
    /// the timer has already fired or been cancelled, or if its factory has
    /// since been dropped.
    pub fn change(self: &Arc<Self>, new_fire_at: Instant) -> bool {
        match self.factory.upgrade() {
            Some(factory) => factory.change(self, new_fire_at),
            None => false,
        }
    }

    /// Cancels the timer if it has not already fired. Idempotent: the
    /// first call returns `true`, every later call returns `false`.
    pub fn cancel(self: &Arc<Self>) -> bool {
        match self.factory.upgrade() {
            Some(factory) => factory.cancel(self),
            None => false,
        }
    }
}

type QueueEntry = (Arc<TimerHandle>, u64);

/// A per-factory priority queue of armed timers plus a pending set for
/// timers too far out to sit in the queue. One global clock drives every
/// live factory's tick.
pub struct TimerFactory {
    dispatch: Arc<dyn DispatchQueue>,
    queue: Mutex<TimerHeap<QueueEntry>>,
    pending: Mutex<Vec<Arc<TimerHandle>>>,
    next_id: AtomicU64,
    retries: AtomicU64,
    last_rescan: Mutex<Instant>,
    shutdown: AtomicBool,
}

impl TimerFactory {
    /// Creates a factory that ticks off the process-wide [`GlobalClock`].
    pub fn new(dispatch: Arc<dyn DispatchQueue>) -> Arc<Self> {
        let factory = Self::new_detached(dispatch);
        let weak = Arc::downgrade(&factory);
        let name = format!("timer-factory-{:p}", Arc::as_ptr(&factory));
        GlobalClock::global().register(name, move |now, _elapsed| {
            if let Some(factory) = weak.upgrade() {
                factory.on_tick(now);
            }
        });
        factory
    }

    /// Creates a factory registered with no clock. Tests drive it
    /// deterministically by calling [`on_tick`](Self::on_tick) directly.
    pub fn new_detached(dispatch: Arc<dyn DispatchQueue>) -> Arc<Self> {
        Arc::new(TimerFactory {
            dispatch,
            queue: Mutex::new(TimerHeap::new()),
            pending: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            last_rescan: Mutex::new(Instant::now()),
            shutdown: AtomicBool::new(false),
        })
    }

    /// The process-wide default factory, dispatching fired handlers inline
    /// unless a real dispatch queue is installed beforehand (see
    /// `engine/dispatch`'s wiring of the global runtime).
    pub fn global() -> &'static Arc<TimerFactory> {
        static GLOBAL: OnceCell<Arc<TimerFactory>> = OnceCell::new();
        GLOBAL.get_or_init(|| TimerFactory::new(Arc::new(InlineDispatchQueue)))
    }

    /// Arms a new timer to fire at the absolute instant `fire_at`.
    pub fn arm_at(
        self: &Arc<Self>,
        fire_at: Instant,
        handler: impl FnOnce() + Send + 'static,
    ) -> Arc<TimerHandle> {
        let timer = Arc::new(TimerHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(TimerState {
                fire_at,
                status: TimerStatus::Pending,
                generation: 0,
            }),
            handler: Mutex::new(Some(Box::new(handler))),
            factory: Arc::downgrade(self),
        });
        self.schedule(&timer, Instant::now());
        timer
    }

    /// Arms a new timer to fire after `delay` from now.
    pub fn arm_after(
        self: &Arc<Self>,
        delay: Duration,
        handler: impl FnOnce() + Send + 'static,
    ) -> Arc<TimerHandle> {
        self.arm_at(Instant::now() + delay, handler)
    }

    fn schedule(self: &Arc<Self>, timer: &Arc<TimerHandle>, now: Instant) {
        let (fire_at, generation) = {
            let state = timer.state.lock();
            (state.fire_at, state.generation)
        };
        if fire_at <= now + QUEUE_CUTOFF {
            timer.state.lock().status = TimerStatus::Queued;
            self.queue.lock().push(fire_at, (timer.clone(), generation));
        } else {
            timer.state.lock().status = TimerStatus::Pending;
            self.pending.lock().push(timer.clone());
        }
    }

    /// Runs one tick: fires every due timer, and every [`QUEUE_RESCAN`]
    /// promotes pending timers that have crossed into the cutoff window.
    pub fn on_tick(self: &Arc<Self>, now: Instant) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let due = self.queue.lock().drain_due(now);
        for entry in due {
            let (timer, generation) = entry.key;
            self.fire_entry(timer, Some(generation));
        }

        let should_rescan = {
            let mut last = self.last_rescan.lock();
            if now.saturating_duration_since(*last) >= QUEUE_RESCAN {
                *last = now;
                true
            } else {
                false
            }
        };
        if should_rescan {
            self.rescan_pending(now);
        }
    }

    fn rescan_pending(self: &Arc<Self>, now: Instant) {
        let due_for_promotion: Vec<Arc<TimerHandle>> = {
            let mut pending = self.pending.lock();
            let (promote, keep): (Vec<_>, Vec<_>) = pending.drain(..).partition(|timer| {
                let state = timer.state.lock();
                state.status == TimerStatus::Pending && state.fire_at <= now + QUEUE_CUTOFF
            });
            *pending = keep;
            promote
        };
        for timer in due_for_promotion {
            let (fire_at, generation) = {
                let mut state = timer.state.lock();
                if state.status != TimerStatus::Pending {
                    continue;
                }
                state.status = TimerStatus::Queued;
                (state.fire_at, state.generation)
            };
            self.queue.lock().push(fire_at, (timer, generation));
        }
    }

    /// Fires `timer` unless it has been superseded (cancelled, changed, or
    /// already done) since this entry was queued. When `expected_generation`
    /// is `Some`, the entry only fires if the timer's generation still
    /// matches — this is how stale priority-queue entries left behind by
    /// `change()` are lazily discarded instead of truly removed.
    fn fire_entry(self: &Arc<Self>, timer: Arc<TimerHandle>, expected_generation: Option<u64>) {
        let handler = {
            let mut state = timer.state.lock();
            if state.status != TimerStatus::Queued {
                return;
            }
            if let Some(expected) = expected_generation {
                if state.generation != expected {
                    return;
                }
            }
            state.status = TimerStatus::Done;
            drop(state);
            timer.handler.lock().take()
        };
        if let Some(handler) = handler {
            if !self.dispatch.queue_work_item(handler) {
                warn!("timer {} fired but its dispatch queue rejected the work item", timer.id());
            }
        }
    }

    /// Transitions `timer` to a new fire time: lock the timer, recompute
    /// its tier, and re-schedule. Returns `false` if the timer is already
    /// done.
    pub fn change(self: &Arc<Self>, timer: &Arc<TimerHandle>, new_fire_at: Instant) -> bool {
        {
            let mut state = timer.state.lock();
            if state.status == TimerStatus::Done {
                return false;
            }
            state.status = TimerStatus::Locked;
            state.fire_at = new_fire_at;
            state.generation += 1;
        }
        self.retries.fetch_add(1, Ordering::Relaxed);
        self.schedule(timer, Instant::now());
        true
    }

    /// Cancels `timer`. Idempotent: only the first call returns `true`.
    pub fn cancel(self: &Arc<Self>, timer: &Arc<TimerHandle>) -> bool {
        let mut state = timer.state.lock();
        if state.status == TimerStatus::Done {
            return false;
        }
        state.status = TimerStatus::Done;
        drop(state);
        timer.handler.lock().take();
        true
    }

    /// A diagnostic counter of CAS-retry-equivalent contention events
    /// (every successful `change()` counts once).
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drains every still-armed timer, running its handler immediately
    /// regardless of fire time or tier, then marks the factory shut down so
    /// later ticks are no-ops.
    pub fn shutdown(self: &Arc<Self>) {
        self.shutdown.store(true, Ordering::SeqCst);
        let queued = self.queue.lock().drain_all();
        let pending: Vec<Arc<TimerHandle>> = self.pending.lock().drain(..).collect();
        for entry in queued {
            self.force_fire(entry.key.0);
        }
        for timer in pending {
            self.force_fire(timer);
        }
    }

    /// Fires `timer` immediately regardless of its current tier, unless it
    /// has already run or been cancelled. Used only by [`shutdown`](Self::shutdown),
    /// where every armed timer must run once to preserve the handler
    /// contract even though its fire time has not arrived.
    fn force_fire(&self, timer: Arc<TimerHandle>) {
        let handler = {
            let mut state = timer.state.lock();
            if state.status == TimerStatus::Done {
                return;
            }
            state.status = TimerStatus::Done;
            drop(state);
            timer.handler.lock().take()
        };
        if let Some(handler) = handler {
            if !self.dispatch.queue_work_item(handler) {
                warn!("timer {} drained at shutdown but its dispatch queue rejected the work item", timer.id());
            }
        }
    }
}

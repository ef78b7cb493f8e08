// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

type TickCallback = Arc<dyn Fn(Instant, Duration) + Send + Sync>;

/// A monotonic, periodically-ticking clock that invokes named callbacks in
/// registration order on every tick, serially, with a non-negative elapsed
/// duration since the previous tick.
///
/// This is the "global clock contract": an external service every
/// [`crate::TimerFactory`] registers against to learn when to re-check its
/// queue. Production code reaches it through [`GlobalClock::global`]; tests
/// construct a private instance via [`GlobalClock::new`] and call
/// [`GlobalClock::tick`] by hand for determinism, with no background thread
/// involved.
pub struct GlobalClock {
    callbacks: Mutex<Vec<(String, TickCallback)>>,
    last_tick: Mutex<Instant>,
    ticking: AtomicBool,
}

impl GlobalClock {
    /// Creates a clock with no registered callbacks and no background
    /// thread. Call [`tick`](Self::tick) manually, or [`spawn_ticking`]
    /// to start a real interval thread.
    pub fn new() -> Self {
        GlobalClock {
            callbacks: Mutex::new(Vec::new()),
            last_tick: Mutex::new(Instant::now()),
            ticking: AtomicBool::new(false),
        }
    }

    /// The process-wide default clock, ticking every 200ms on a dedicated
    /// background thread. Most callers should prefer injecting a clock
    /// explicitly; this exists for the same reason the global dispatch
    /// queue and timer factory have their own ambient defaults — a
    /// convenience, not a hard dependency.
    pub fn global() -> &'static GlobalClock {
        static GLOBAL: OnceCell<GlobalClock> = OnceCell::new();
        let clock = GLOBAL.get_or_init(GlobalClock::new);
        clock.spawn_ticking(Duration::from_millis(200));
        clock
    }

    /// Registers `callback` under `name`, replacing any previous
    /// registration with the same name. Invocation order across distinct
    /// names follows registration order.
    pub fn register(
        &self,
        name: impl Into<String>,
        callback: impl Fn(Instant, Duration) + Send + Sync + 'static,
    ) {
        let name = name.into();
        let mut callbacks = self.callbacks.lock();
        callbacks.retain(|(existing, _)| existing != &name);
        callbacks.push((name, Arc::new(callback)));
    }

    /// Removes the callback registered under `name`, if any.
    pub fn unregister(&self, name: &str) {
        self.callbacks.lock().retain(|(existing, _)| existing != name);
    }

    /// Invokes every registered callback once, serially, with the current
    /// monotonic time and the elapsed duration since the previous tick.
    pub fn tick(&self) {
        let now = Instant::now();
        let elapsed = {
            let mut last = self.last_tick.lock();
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };
        // Clone the callback Arcs out from under the lock so a callback that
        // registers or unregisters during its own invocation cannot
        // deadlock against us.
        let callbacks: Vec<TickCallback> = {
            let callbacks = self.callbacks.lock();
            callbacks.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in callbacks {
            callback(now, elapsed);
        }
    }

    /// Starts a background thread that calls [`tick`](Self::tick) every
    /// `interval`. A clock only ever spawns one ticking thread; repeated
    /// calls after the first are ignored.
    pub fn spawn_ticking(&'static self, interval: Duration) {
        if self.ticking.swap(true, Ordering::AcqRel) {
            return;
        }
        std::thread::Builder::new()
            .name("dream-global-clock".to_string())
            .spawn(move || loop {
                std::thread::sleep(interval);
                self.tick();
            })
            .expect("failed to spawn global clock thread");
    }
}

impl Default for GlobalClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A clock handle shared between a timer factory and whoever owns it.
pub type SharedClock = Arc<GlobalClock>;

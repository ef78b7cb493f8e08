// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use dispatch::GlobalDispatchQueue;
use task_env::TaskEnv;
use timer::TimerFactory;

use crate::config::RuntimeConfig;

/// The assembled runtime: a dispatch queue, a timer factory ticking off the
/// process clock, and a root [`TaskEnv`] every spawned unit of work forks
/// from. This is the thing a downstream HTTP server or REST host depends on
/// — the single object that wires together every layer below it, the same
/// role `task_executor::Executor` plays for `pants`' own async engine.
pub struct Runtime {
    dispatch: Arc<GlobalDispatchQueue>,
    timers: Arc<TimerFactory>,
    root: TaskEnv,
}

impl Runtime {
    /// Builds a runtime from `config`: a dispatch queue of the configured
    /// kind and size, a timer factory registered against the global clock,
    /// and a fresh root environment bound to both.
    pub fn new(config: &RuntimeConfig) -> Self {
        let dispatch = Arc::new(GlobalDispatchQueue::with_stack_size(
            config.threadpool,
            config.threadpool_min,
            config.threadpool_max,
            dispatch::DEFAULT_IDLE_TIMEOUT,
            config.max_stacksize,
        ));
        let timers = TimerFactory::new(dispatch.clone());
        let root = TaskEnv::new(dispatch.clone(), timers.clone());
        Runtime { dispatch, timers, root }
    }

    /// The runtime built from [`RuntimeConfig::from_env`].
    pub fn from_env() -> Self {
        Self::new(&RuntimeConfig::from_env())
    }

    /// The root environment. Callers doing independent, unrelated work
    /// should [`TaskEnv::fork`] off this rather than share it directly, so
    /// that one piece of state set by one caller cannot leak into another's.
    pub fn root_env(&self) -> &TaskEnv {
        &self.root
    }

    pub fn dispatch(&self) -> &Arc<GlobalDispatchQueue> {
        &self.dispatch
    }

    pub fn timers(&self) -> &Arc<TimerFactory> {
        &self.timers
    }

    /// Shuts down the backing dispatch queue. Outstanding timers are left
    /// to fire (or not) on their own; this only stops accepting new work
    /// items, matching `ElasticPool`/`LegacyThreadPool::shutdown`'s contract.
    pub fn shutdown(&self) {
        self.dispatch.shutdown();
    }
}

// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::time::Duration;

use once_cell::sync::OnceCell;
use timer::DispatchQueue;

use crate::elastic::{ElasticPool, DEFAULT_IDLE_TIMEOUT};
use crate::legacy::LegacyThreadPool;

/// Which backing pool a [`GlobalDispatchQueue`] should use — the `elastic`
/// vs `legacy` choice named by the `threadpool` configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPoolKind {
    Elastic,
    Legacy,
}

impl Default for ThreadPoolKind {
    fn default() -> Self {
        ThreadPoolKind::Elastic
    }
}

enum Backing {
    Elastic(ElasticPool),
    Legacy(LegacyThreadPool),
}

/// The process-wide dispatch queue: either an [`ElasticPool`] or a
/// [`LegacyThreadPool`], selected by `threadpool` and sized by
/// `threadpool-min`/`threadpool-max`.
pub struct GlobalDispatchQueue {
    backing: Backing,
}

impl GlobalDispatchQueue {
    pub fn new(kind: ThreadPoolKind, min_threads: usize, max_threads: usize) -> Self {
        Self::with_idle_timeout(kind, min_threads, max_threads, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(
        kind: ThreadPoolKind,
        min_threads: usize,
        max_threads: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self::with_stack_size(kind, min_threads, max_threads, idle_timeout, None)
    }

    /// Builds the queue honoring `max-stacksize`: every worker thread of the
    /// selected backing pool is spawned with `stack_size` bytes of stack
    /// when given, instead of the host platform's default.
    pub fn with_stack_size(
        kind: ThreadPoolKind,
        min_threads: usize,
        max_threads: usize,
        idle_timeout: Duration,
        stack_size: Option<usize>,
    ) -> Self {
        let backing = match kind {
            ThreadPoolKind::Elastic => Backing::Elastic(ElasticPool::with_stack_size(
                min_threads,
                max_threads,
                idle_timeout,
                stack_size,
            )),
            ThreadPoolKind::Legacy => {
                Backing::Legacy(LegacyThreadPool::with_stack_size(max_threads, stack_size))
            }
        };
        GlobalDispatchQueue { backing }
    }

    /// The process-wide default: an elastic pool sized `4..200`, matching
    /// the documented `threadpool-min`/`threadpool-max` defaults. Most
    /// callers should prefer building a `TaskEnv` around an explicitly
    /// constructed queue instead of reaching for ambient global state;
    /// this exists as the same kind of ambient convenience as
    /// `timer::TimerFactory::global`.
    pub fn global() -> &'static GlobalDispatchQueue {
        static GLOBAL: OnceCell<GlobalDispatchQueue> = OnceCell::new();
        GLOBAL.get_or_init(|| GlobalDispatchQueue::new(ThreadPoolKind::Elastic, 4, 200))
    }

    pub fn shutdown(&self) {
        match &self.backing {
            Backing::Elastic(pool) => pool.shutdown(),
            Backing::Legacy(pool) => pool.shutdown(),
        }
    }
}

impl DispatchQueue for GlobalDispatchQueue {
    fn queue_work_item(&self, action: Box<dyn FnOnce() + Send>) -> bool {
        match &self.backing {
            Backing::Elastic(pool) => pool.queue_work_item(action),
            Backing::Legacy(pool) => pool.queue_work_item(action),
        }
    }
}

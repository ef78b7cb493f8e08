// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::env;
use std::thread::Builder;

use dispatch::ThreadPoolKind;

const ENV_THREADPOOL: &str = "DREAM_THREADPOOL";
const ENV_THREADPOOL_MIN: &str = "DREAM_THREADPOOL_MIN";
const ENV_THREADPOOL_MAX: &str = "DREAM_THREADPOOL_MAX";
const ENV_MAX_STACKSIZE: &str = "DREAM_MAX_STACKSIZE";

/// The runtime's process-wide tunables. Read from environment variables
/// rather than a config-file loader, following
/// `task_executor::Executor::new_owned`'s pattern of taking thread-count
/// parameters explicitly instead of consulting a global singleton config
/// object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// `threadpool`: selects the dispatcher backing the global queue.
    /// Default: [`ThreadPoolKind::Elastic`].
    pub threadpool: ThreadPoolKind,
    /// `threadpool-min`: lower parallelism bound. Default: 4.
    pub threadpool_min: usize,
    /// `threadpool-max`: upper parallelism bound. Default: 200.
    pub threadpool_max: usize,
    /// `max-stacksize`: per-worker stack limit, in bytes. Default: `None`,
    /// meaning the host platform's default thread stack size.
    pub max_stacksize: Option<usize>,
}

impl RuntimeConfig {
    pub const DEFAULT_THREADPOOL_MIN: usize = 4;
    pub const DEFAULT_THREADPOOL_MAX: usize = 200;

    /// Reads configuration from `DREAM_THREADPOOL`, `DREAM_THREADPOOL_MIN`,
    /// `DREAM_THREADPOOL_MAX`, and `DREAM_MAX_STACKSIZE`, falling back to
    /// §6's documented defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let threadpool = match env::var(ENV_THREADPOOL).ok().as_deref() {
            Some("legacy") => ThreadPoolKind::Legacy,
            Some("elastic") | None => ThreadPoolKind::Elastic,
            Some(other) => {
                log::warn!("unrecognized {ENV_THREADPOOL} value {other:?}; defaulting to elastic");
                ThreadPoolKind::Elastic
            }
        };
        let threadpool_min = read_usize(ENV_THREADPOOL_MIN, Self::DEFAULT_THREADPOOL_MIN);
        let threadpool_max = read_usize(ENV_THREADPOOL_MAX, Self::DEFAULT_THREADPOOL_MAX);
        let max_stacksize = env::var(ENV_MAX_STACKSIZE).ok().and_then(|v| v.parse().ok());
        RuntimeConfig { threadpool, threadpool_min, threadpool_max, max_stacksize }
    }

    /// Applies [`max_stacksize`](Self::max_stacksize) to a thread builder,
    /// if configured — the host-default case leaves `builder` untouched.
    /// `Runtime::new` threads this through `GlobalDispatchQueue` itself; this
    /// is here for a host spawning its own auxiliary worker threads off the
    /// same config.
    pub fn apply_stacksize(&self, builder: Builder) -> Builder {
        match self.max_stacksize {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            threadpool: ThreadPoolKind::Elastic,
            threadpool_min: Self::DEFAULT_THREADPOOL_MIN,
            threadpool_max: Self::DEFAULT_THREADPOOL_MAX,
            max_stacksize: None,
        }
    }
}

fn read_usize(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            log::warn!("{key}={value:?} is not a valid integer; using default {default}");
            default
        }),
        Err(_) => default,
    }
}

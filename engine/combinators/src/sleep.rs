// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::time::Duration;

use future::DreamValue;
use task_env::TaskEnv;

/// A future that resolves with `()` once `duration` has elapsed, armed on
/// `env`'s bound timer factory — the "Sleep". Cancelling the
/// returned future before it fires cancels the underlying timer too (the
/// same mechanism [`DreamValue::with_timeout`] uses for construction-time
/// timeouts).
pub fn sleep(env: &TaskEnv, duration: Duration) -> DreamValue<()> {
    let future = DreamValue::new();
    let producer = future.clone();
    env.timers().arm_after(duration, move || {
        producer.try_return(());
    });
    future
}

// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::cell::RefCell;
use std::sync::Arc;

/// A type-erased view of one running [`crate::Coroutine`], enough to walk
/// the outer chain for stack-trace formatting without the formatter needing
/// to know every concrete `CoroutineNode` type in play — the
/// coroutine-aware stack trace mechanism.
pub trait CoroutineFrame: Send + Sync {
    /// A short label identifying this coroutine's body type.
    fn describe(&self) -> String;

    /// The coroutine that was current when this one first advanced, if any.
    fn outer(&self) -> Option<Arc<dyn CoroutineFrame>>;
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn CoroutineFrame>>> = const { RefCell::new(None) };
}

/// The coroutine currently advancing on this thread, if any — the
/// "current coroutine" slot of §4.4's thread-identity rule.
pub fn current() -> Option<Arc<dyn CoroutineFrame>> {
    CURRENT.with(|cell| cell.borrow().clone())
}

/// Binds `frame` as current for the duration of `f`, restoring whatever was
/// current beforehand on exit — the save/restore idiom `engine/task_env`
/// uses for its own "current environment" slot, applied here to a second,
/// independent thread-local.
pub(crate) fn with_current<R>(frame: Arc<dyn CoroutineFrame>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT.with(|cell| cell.replace(Some(frame)));
    let result = f();
    CURRENT.with(|cell| *cell.borrow_mut() = previous);
    result
}

/// Walks `frame`'s outer chain into a single, newline-joined diagnostic
/// bridging every asynchronous suspension between the innermost coroutine
/// and whatever invoked it, per §4.4/§7's "bridges asynchronous
/// suspensions" / "formats nested coroutine frames into a single
/// diagnostic".
pub fn format_stack_trace(frame: &Arc<dyn CoroutineFrame>) -> String {
    let mut lines = vec![frame.describe()];
    let mut next = frame.outer();
    while let Some(f) = next {
        lines.push(f.describe());
        next = f.outer();
    }
    lines.join("\n  at ")
}

// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! The coroutine engine (L6): a driver that advances a suspendable
//! iterator, threading an ambient "current coroutine" slot, propagating
//! exceptions yielded at suspension points, and formatting a coroutine-aware
//! stack trace across asynchronous suspensions. 

mod engine;
mod frame;
mod node;

pub use engine::{Coroutine, ExceptionMode};
pub use frame::{current, format_stack_trace, CoroutineFrame};
pub use node::{CoroutineNode, Suspension};

/// Convenience: the formatted stack trace for whichever coroutine is
/// currently advancing on this thread, if any.
pub fn current_stack_trace() -> Option<String> {
    current().as_ref().map(format_stack_trace)
}

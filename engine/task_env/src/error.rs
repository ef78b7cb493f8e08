// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

/// Errors raised by [`crate::TaskEnv`] itself — argument-shape and
/// state-machine errors per the taxonomy, scoped to the
/// environment layer. `engine/future` has its own, richer `RuntimeError`;
/// the two stay separate so `task_env` does not need to depend on
/// `engine/future` (which instead depends on `task_env`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEnvError {
    /// `invoke_now` caught a panic from the supplied closure.
    Panicked { message: String },
    /// A call was made against an environment whose refcount already
    /// reached zero and which has therefore disposed its state.
    Disposed,
}

impl TaskEnvError {
    pub fn panicked(message: impl Into<String>) -> Self {
        TaskEnvError::Panicked { message: message.into() }
    }

    pub fn disposed() -> Self {
        TaskEnvError::Disposed
    }
}

impl fmt::Display for TaskEnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEnvError::Panicked { message } => write!(f, "task panicked: {message}"),
            TaskEnvError::Disposed => write!(f, "environment has already been disposed"),
        }
    }
}

impl std::error::Error for TaskEnvError {}

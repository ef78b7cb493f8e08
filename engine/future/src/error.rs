// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

/// The single error type carried on a [`crate::DreamValue`] outcome, per
/// spec.md §7's error taxonomy. Named constructors rather than a derive
/// macro, matching `graph::node::NodeError`'s `invalidated()`/`cyclic()`
/// style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A construction-time timeout fired before the future resolved.
    Timeout,
    /// `cancel()` was called with a caller-supplied reason.
    Cancelled { reason: String },
    /// A second producer completion attempt after a terminal outcome.
    AlreadyFinished,
    /// A coroutine's driving iterator exhausted without resolving its
    /// future.
    MissingResult,
    /// Every alternative passed to `first_of`/`alt` failed.
    AllAlternatesFailed,
    /// A blocking queue was closed before this operation completed.
    QueueClosed,
    /// Anything else: a propagated producer exception, or an
    /// argument-shape error raised synchronously at submission.
    Generic { message: String },
}

impl RuntimeError {
    pub fn timeout() -> Self {
        RuntimeError::Timeout
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        RuntimeError::Cancelled { reason: reason.into() }
    }

    pub fn already_finished() -> Self {
        RuntimeError::AlreadyFinished
    }

    pub fn missing_result() -> Self {
        RuntimeError::MissingResult
    }

    pub fn all_alternates_failed() -> Self {
        RuntimeError::AllAlternatesFailed
    }

    pub fn queue_closed() -> Self {
        RuntimeError::QueueClosed
    }

    pub fn generic(message: impl Into<String>) -> Self {
        RuntimeError::Generic { message: message.into() }
    }

    /// `true` for the marker this crate installs when a construction-time
    /// timeout cancels the future, per §4.3's "Timeout" contract.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RuntimeError::Timeout)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Timeout => write!(f, "operation timed out"),
            RuntimeError::Cancelled { reason } => write!(f, "cancelled: {reason}"),
            RuntimeError::AlreadyFinished => write!(f, "future has already finished"),
            RuntimeError::MissingResult => {
                write!(f, "coroutine exited without resolving its future")
            }
            RuntimeError::AllAlternatesFailed => write!(f, "all alternates failed"),
            RuntimeError::QueueClosed => write!(f, "queue is closed"),
            RuntimeError::Generic { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

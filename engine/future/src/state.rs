// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use crate::error::RuntimeError;

/// What a continuation or blocking waiter observes once a [`crate::DreamValue`]
/// has an outcome.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Value(T),
    Error(RuntimeError),
    Cancelled(RuntimeError),
}

impl<T> Outcome<T> {
    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled(_))
    }

    /// Converts to a plain `Result`, treating cancellation as an error —
    /// the shape most call sites want.
    pub fn into_result(self) -> Result<T, RuntimeError> {
        match self {
            Outcome::Value(v) => Ok(v),
            Outcome::Error(e) => Err(e),
            Outcome::Cancelled(e) => Err(e),
        }
    }
}

/// What a cleanup callback receives: the real producer outcome that arrived
/// too late for the consumer to see, or `None` if the cancellation was
/// confirmed without ever producing a value.
pub type CleanupOutcome<T> = Option<Outcome<T>>;

/// The future's state machine, with a dedicated `ObservedCancel` state so a
/// real outcome that arrives after the consumer already saw a cancellation
/// can still be routed to cleanup instead of overwriting what it observed.
pub(crate) enum State<T> {
    New,
    Value(T),
    Error(RuntimeError),
    Cancel(RuntimeError),
    /// Cancellation was confirmed by the producer; the reason is kept so a
    /// consumer reading after confirmation still observes why.
    ConfirmedCancel(RuntimeError),
    ObservedCancel(RuntimeError),
}

impl<T> State<T> {
    pub(crate) fn is_terminal_for_producer(&self) -> bool {
        matches!(
            self,
            State::Value(_) | State::Error(_) | State::ConfirmedCancel(_)
        )
    }
}

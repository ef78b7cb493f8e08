// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use future::{RuntimeError, Suspend};

/// One element of a coroutine's driving sequence: either
/// an immediately-continuable step or a suspension point, plus an optional
/// exception the coroutine body wants to raise (or, under
/// [`crate::ExceptionMode::CatchOnce`], hand back as data) at this yield.
pub struct Suspension {
    pub(crate) suspend: Box<dyn Suspend>,
    pub(crate) error: Option<RuntimeError>,
}

impl Suspension {
    /// A step that can continue immediately — the `(a) resolves instantly`
    /// case of §4.4.
    pub fn ready() -> Self {
        Suspension { suspend: Box::new(Immediate), error: None }
    }

    /// A step that suspends on `point` until it becomes ready — the
    /// `(b) suspends` case of §4.4. Any [`future::Suspend`] implementor
    /// qualifies: a [`future::DreamValue`], a join, an alt, a sleep.
    pub fn on(point: impl Suspend + 'static) -> Self {
        Suspension { suspend: Box::new(point), error: None }
    }

    /// A step that carries an exception at this yield site. Under
    /// [`crate::ExceptionMode::Unwind`] (the default) this fails the
    /// coroutine's governing future outright; under `CatchOnce` the engine
    /// swallows it once and keeps driving, reverting to `Unwind` for the
    /// next yield.
    pub fn failed(error: RuntimeError) -> Self {
        Suspension { suspend: Box::new(Immediate), error: Some(error) }
    }
}

/// A [`Suspend`] implementation that is always immediately ready — backs
/// [`Suspension::ready`] and [`Suspension::failed`], which carry no real
/// suspension point of their own.
struct Immediate;

impl Suspend for Immediate {
    fn poll_ready(&self) -> bool {
        true
    }

    fn register(&self, wake: Box<dyn FnOnce() + Send>) {
        wake();
    }
}

/// The contract a coroutine body implements: binding a
/// suspendable iterator to an eventual output type. Modeled on
/// `graph::node::Node`'s `type Item`/`type Error` association, generalized
/// from "resolves to a single `BoxFuture`" into "yields a sequence of
/// suspension points before resolving."
pub trait CoroutineNode: Send + 'static {
    /// The value the governing future resolves with on success.
    type Output: Clone + Send + 'static;

    /// The lazy, restartable sequence of suspension points this node's body
    /// drives through. `next()` is only ever called while the engine holds
    /// this coroutine's advance lock, so implementors do not need their own
    /// internal synchronization.
    type Iter: Iterator<Item = Suspension> + Send + 'static;

    /// Begins the coroutine body, returning its driving iterator.
    fn start(self) -> Self::Iter;
}

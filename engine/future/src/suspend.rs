// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

/// The single contract every suspension point exposes: a coroutine
/// suspends on anything implementing
/// this trait — a [`crate::DreamValue`], a join, an alt, a sleep, or a
/// wait-handle adapter. Object-safe and untyped on purpose: the engine only
/// needs to know "is the outcome ready" and "wake me up when it is," never
/// the outcome's type — the suspension point itself hands back the typed
/// value once resumed.
///
/// Grounded on `async_semaphore::PermitFuture::poll`'s shape (ready now, or
/// register and return not-ready) and `async_value::AsyncValueReceiver::recv`'s
/// poll loop, generalized from a single `Future::poll` call into a
/// two-method contract so it can be driven by a hand-rolled coroutine
/// engine instead of only `std::future::Future`.
pub trait Suspend: Send + Sync {
    /// Returns `true` if the outcome is already present — the suspension
    /// can be skipped and the coroutine can continue immediately.
    fn poll_ready(&self) -> bool;

    /// Stores `wake` to be invoked exactly once, when the outcome becomes
    /// available. If the outcome is already available by the time this is
    /// called, `wake` runs immediately, inline.
    fn register(&self, wake: Box<dyn FnOnce() + Send>);
}

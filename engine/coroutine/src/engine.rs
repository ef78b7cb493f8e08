// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use future::{DreamValue, RuntimeError, Suspend};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::frame::{self, CoroutineFrame};
use crate::node::CoroutineNode;

/// How a coroutine reacts to an exception carried on a yielded
/// [`crate::Suspension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionMode {
    /// The default: the exception is thrown at the yield site, failing the
    /// coroutine's future and stopping the drive loop.
    Unwind,
    /// The next yielded exception is swallowed and driving continues,
    /// after which the mode reverts to `Unwind`. Set this to express "I
    /// want to handle this one failure locally."
    CatchOnce,
}

struct Inner<N: CoroutineNode> {
    iter: Mutex<Option<N::Iter>>,
    future: DreamValue<N::Output>,
    mode: Mutex<ExceptionMode>,
    outer: OnceCell<Option<Arc<dyn CoroutineFrame>>>,
    label: &'static str,
}

impl<N: CoroutineNode> CoroutineFrame for Inner<N> {
    fn describe(&self) -> String {
        self.label.to_string()
    }

    fn outer(&self) -> Option<Arc<dyn CoroutineFrame>> {
        self.outer.get().cloned().flatten()
    }
}

/// A running coroutine: an iterator driver bound to a governing
/// [`DreamValue`], an outer-coroutine back-reference for stack traces, and
/// an [`ExceptionMode`]. Cheaply `Clone` — every clone shares the same
/// driving state.
pub struct Coroutine<N: CoroutineNode> {
    inner: Arc<Inner<N>>,
}

impl<N: CoroutineNode> Clone for Coroutine<N> {
    fn clone(&self) -> Self {
        Coroutine { inner: self.inner.clone() }
    }
}

impl<N: CoroutineNode> Coroutine<N> {
    /// Starts `node`'s body and returns the future that will eventually
    /// hold its result. Drives the coroutine synchronously, on the calling
    /// thread, until the first suspension that cannot complete immediately
    /// — exactly the engine's documented invoke-then-return contract.
    pub fn spawn(node: N) -> DreamValue<N::Output> {
        let future = DreamValue::new();
        let coroutine = Coroutine {
            inner: Arc::new(Inner {
                iter: Mutex::new(Some(node.start())),
                future: future.clone(),
                mode: Mutex::new(ExceptionMode::Unwind),
                outer: OnceCell::new(),
                label: std::any::type_name::<N>(),
            }),
        };
        coroutine.advance();
        future
    }

    /// The future governing this coroutine's eventual result.
    pub fn future(&self) -> DreamValue<N::Output> {
        self.inner.future.clone()
    }

    /// Sets this coroutine to swallow exactly the next yielded exception
    /// instead of unwinding.
    pub fn catch_next_exception(&self) {
        *self.inner.mode.lock() = ExceptionMode::CatchOnce;
    }

    fn as_frame(&self) -> Arc<dyn CoroutineFrame> {
        self.inner.clone()
    }

    /// Advances the driving iterator until it yields a suspension that is
    /// not immediately ready, registering a resume callback for that case,
    /// or until the iterator is exhausted. Runs under this coroutine's
    /// "current coroutine" thread-local binding, saving/restoring whatever
    /// was current beforehand, mirroring `task_env`'s save/restore of its
    /// own "current environment" slot.
    fn advance(&self) {
        self.inner.outer.get_or_init(frame::current);
        let this = self.clone();
        frame::with_current(self.as_frame(), move || this.drive());
    }

    fn drive(&self) {
        loop {
            let next = {
                let mut guard = self.inner.iter.lock();
                match guard.as_mut() {
                    Some(iter) => iter.next(),
                    None => return,
                }
            };

            let suspension = match next {
                Some(suspension) => suspension,
                None => {
                    // The body exhausted its sequence without ever resolving
                    // the future.
                    self.inner.future.try_throw(RuntimeError::missing_result());
                    self.inner.iter.lock().take();
                    return;
                }
            };

            if let Some(error) = suspension.error {
                let unwind = {
                    let mut mode = self.inner.mode.lock();
                    if *mode == ExceptionMode::CatchOnce {
                        *mode = ExceptionMode::Unwind;
                        false
                    } else {
                        true
                    }
                };
                if unwind {
                    self.inner.future.try_throw(error);
                    self.inner.iter.lock().take();
                    return;
                }
                // CatchOnce: the body is expected to have already read the
                // error off the yielded suspension before producing it;
                // the engine's job here is only to not unwind and to keep
                // driving.
                continue;
            }

            if suspension.suspend.poll_ready() {
                continue;
            }

            let resume = self.clone();
            suspension.suspend.register(Box::new(move || resume.advance()));
            return;
        }
    }
}

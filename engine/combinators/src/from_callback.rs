// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use future::{DreamValue, RuntimeError};

/// Adapts a callback-style API into a one-shot future:
/// `begin` is handed a one-shot `end` callback and
/// is expected to call it exactly once with the eventual `Result`. The
/// returned future resolves (or fails) the moment `end` is invoked.
///
/// `begin` runs synchronously on the calling thread — it is expected to
/// kick off whatever truly asynchronous work it wraps (a socket read, a
/// thread-pool submission, an FFI call taking a completion pointer) and
/// return immediately; `end` may then be invoked from any thread.
pub fn from_callback<R, F>(begin: F) -> DreamValue<R>
where
    R: Clone + Send + Sync + 'static,
    F: FnOnce(Box<dyn FnOnce(Result<R, RuntimeError>) + Send>),
{
    let future = DreamValue::new();
    let producer = future.clone();
    begin(Box::new(move |result| match result {
        Ok(value) => {
            producer.try_return(value);
        }
        Err(error) => {
            producer.try_throw(error);
        }
    }));
    future
}

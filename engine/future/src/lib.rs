// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! The cancellable future/promise primitive (L5) and the suspension
//! contract coroutines drive it through. 

mod error;
mod state;
mod suspend;
mod value;
mod wait_pool;

pub use error::RuntimeError;
pub use state::{CleanupOutcome, Outcome};
pub use suspend::Suspend;
pub use value::{DreamFuture, DreamValue};
pub use wait_pool::BlockingWaitPool;

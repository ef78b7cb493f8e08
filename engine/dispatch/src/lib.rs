// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! Dispatch queues (L1): the abstract work-submission contract plus the
//! immediate, per-object-serial, work-stealing-elastic, and legacy-pool
//! implementations.
//!
//! The [`timer::DispatchQueue`] trait itself lives in `engine/timer`, which
//! needs a single `queue_work_item` operation without depending on this
//! crate's implementations; we re-export it here so callers of this crate
//! never need to reach into `timer` directly for it.

mod elastic;
mod global;
mod immediate;
mod legacy;
mod serial;

pub use elastic::{drain_local_pending, ElasticPool, DEFAULT_IDLE_TIMEOUT};
pub use global::{GlobalDispatchQueue, ThreadPoolKind};
pub use immediate::ImmediateQueue;
pub use legacy::LegacyThreadPool;
pub use serial::SerialQueue;
pub use timer::DispatchQueue;

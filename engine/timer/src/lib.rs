// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! The global clock and per-factory two-tier timer scheduler (L3).
//!
//! [`GlobalClock`] is a process-wide (or private, for tests) periodic
//! ticker. Each [`TimerFactory`] registers against a clock and, on every
//! tick, fires due timers and periodically rescans its pending set for
//! timers that have crossed into the `QUEUE_CUTOFF` window.

mod clock;
mod dispatch;
mod timer;

pub use clock::{GlobalClock, SharedClock};
pub use dispatch::{DispatchQueue, InlineDispatchQueue};
pub use timer::{TimerFactory, TimerHandle, TimerStatus, QUEUE_CUTOFF, QUEUE_RESCAN};

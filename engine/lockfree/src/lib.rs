// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! Lock-free data structures underpinning the Dream task runtime (L0).
//!
//! - [`MsQueue`] — a Michael–Scott FIFO queue.
//! - [`TreiberStack`] — a classical lock-free LIFO stack.
//! - [`WorkStealingDeque`] — owner push/pop at the bottom, thief steal at the
//!   top, used by the elastic dispatch pool.
//! - [`RendezvousQueue`] — a single-slot-kind handoff between producers and
//!   registered consumers.
//!
//! `Count`/`len` on every structure here is advisory: a consistent snapshot,
//! not a linearization point. No call site should treat it as exact.

mod deque;
mod node;
mod queue;
mod rendezvous;
mod stack;

pub use deque::{DequeStats, StealResult, WorkStealingDeque};
pub use queue::MsQueue;
pub use rendezvous::RendezvousQueue;
pub use stack::TreiberStack;

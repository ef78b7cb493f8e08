// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).
//! Priority queues for the Dream task runtime (L2).
//!
//! [`LockFreePriorityQueue`] is an array of [`lockfree::MsQueue`]s, one per
//! priority level — the shape this crate calls for in §4.1. [`TimerHeap`] is a
//! plain binary-heap min-heap ordered by fire time, used internally by the
//! timer factory (L3); a binary heap already gives the required O(log n)
//! behavior, so it is built directly on `std::collections::BinaryHeap`
//! rather than importing another priority-queue crate.

mod lockfree_queue;
mod timer_heap;

pub use lockfree_queue::{LockFreePriorityQueue, PriorityError};
pub use timer_heap::{TimerHeap, TimerHeapEntry};

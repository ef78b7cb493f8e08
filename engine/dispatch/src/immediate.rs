// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use timer::DispatchQueue;

/// The "Immediate" dispatch queue: runs every submitted item inline, on
/// whichever thread calls [`DispatchQueue::queue_work_item`]. A thin
/// re-export of `timer::InlineDispatchQueue` under the name callers expect —
/// the timer crate needed its own trivial dispatch queue to avoid depending
/// on this crate, so the type lives there and this crate just hands it that
/// name.
pub type ImmediateQueue = timer::InlineDispatchQueue;

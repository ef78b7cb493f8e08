// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use lockfree::MsQueue;

/// A lock-free priority queue: one [`MsQueue`] per priority level.
/// `enqueue` routes by level; `dequeue` scans from the lowest level upward
/// and returns the first nonempty queue's head. The only failure mode is an
/// out-of-range level at enqueue time.
pub struct LockFreePriorityQueue<T> {
    levels: Vec<MsQueue<T>>,
}

impl<T> LockFreePriorityQueue<T> {
    /// Creates a queue with `level_count` priority levels, numbered
    /// `0..level_count` with `0` being the highest priority (dequeued
    /// first).
    pub fn new(level_count: usize) -> Self {
        LockFreePriorityQueue {
            levels: (0..level_count).map(|_| MsQueue::new()).collect(),
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Enqueues `item` at `level`. Fails with [`PriorityError::OutOfRange`]
    /// if `level >= level_count()`.
    pub fn enqueue(&self, level: usize, item: T) -> Result<(), PriorityError> {
        let queue = self
            .levels
            .get(level)
            .ok_or(PriorityError::OutOfRange { level, level_count: self.levels.len() })?;
        queue.enqueue(item);
        Ok(())
    }

    /// Dequeues the first available item, scanning from level 0 upward.
    pub fn dequeue(&self) -> Option<T> {
        self.levels.iter().find_map(|q| q.dequeue())
    }

    /// Sum of the advisory per-level counts.
    pub fn len(&self) -> usize {
        self.levels.iter().map(MsQueue::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(MsQueue::is_empty)
    }
}

/// Raised when an operation names a priority level outside the queue's
/// configured range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityError {
    OutOfRange { level: usize, level_count: usize },
}

impl fmt::Display for PriorityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityError::OutOfRange { level, level_count } => write!(
                f,
                "priority level {level} is out of range (queue has {level_count} levels)"
            ),
        }
    }
}

impl std::error::Error for PriorityError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeues_highest_priority_first() {
        let q = LockFreePriorityQueue::new(3);
        q.enqueue(2, "low").unwrap();
        q.enqueue(0, "high").unwrap();
        q.enqueue(1, "mid").unwrap();
        assert_eq!(q.dequeue(), Some("high"));
        assert_eq!(q.dequeue(), Some("mid"));
        assert_eq!(q.dequeue(), Some("low"));
    }

    #[test]
    fn fifo_within_a_level() {
        let q = LockFreePriorityQueue::new(1);
        q.enqueue(0, 1).unwrap();
        q.enqueue(0, 2).unwrap();
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
    }

    #[test]
    fn rejects_out_of_range_level() {
        let q: LockFreePriorityQueue<i32> = LockFreePriorityQueue::new(2);
        assert_eq!(
            q.enqueue(5, 1),
            Err(PriorityError::OutOfRange { level: 5, level_count: 2 })
        );
    }
}

// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::Backoff;

use crate::node::Node;

/// A Michael–Scott lock-free FIFO queue.
///
/// `head` always points at a sentinel; the true first element (if any) is
/// `head.next`. `tail` is either the true last node or one behind it — any
/// thread that notices `tail` lagging helps advance it before proceeding
/// (the "helping" rule), so no single thread can starve behind a slow
/// publisher.
pub struct MsQueue<T> {
    head: Atomic<Node<T>>,
    tail: Atomic<Node<T>>,
    len: AtomicUsize,
}

impl<T> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MsQueue<T> {
    pub fn new() -> Self {
        let sentinel = Owned::new(Node::new(None));
        let guard = epoch::pin();
        let sentinel = sentinel.into_shared(&guard);
        MsQueue {
            head: Atomic::from(sentinel),
            tail: Atomic::from(sentinel),
            len: AtomicUsize::new(0),
        }
    }

    /// Appends `item` to the tail of the queue.
    pub fn enqueue(&self, item: T) {
        let guard = &epoch::pin();
        let new_node = Owned::new(Node::new(Some(item))).into_shared(guard);
        let backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            // Safety: `tail` is never null once constructed, and is only
            // reclaimed after being unlinked from every live path.
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, guard);

            if next.is_null() {
                // Tail looks current: try to link the new node after it.
                match tail_ref.next.compare_exchange(
                    Shared::null(),
                    new_node,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                ) {
                    Ok(_) => {
                        // Help advance tail; a failure here just means someone
                        // else already did it.
                        let _ = self.tail.compare_exchange(
                            tail,
                            new_node,
                            Ordering::Release,
                            Ordering::Relaxed,
                            guard,
                        );
                        self.len.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    Err(_) => {
                        backoff.spin();
                        continue;
                    }
                }
            } else {
                // Tail is lagging behind a publish in progress; help and retry.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                backoff.spin();
            }
        }
    }

    /// Removes and returns the item at the head of the queue, if any.
    pub fn dequeue(&self) -> Option<T> {
        self.pop_if(|_| true)
    }

    /// Removes and returns the head item only if it satisfies `predicate`,
    /// used by [`crate::rendezvous::RendezvousQueue`] to atomically claim a
    /// head entry of a particular kind.
    pub(crate) fn pop_if(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let guard = &epoch::pin();
        let backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            // Safety: sentinel invariant — head is never null.
            let head_ref = unsafe { head.deref() };
            let next = head_ref.next.load(Ordering::Acquire, guard);

            if head == tail {
                if next.is_null() {
                    // Empty.
                    return None;
                }
                // Producer is mid-publish: help advance tail and retry.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                backoff.spin();
                continue;
            }

            // Safety: `next` is non-null whenever `head != tail`.
            let next_ref = unsafe { next.deref() };
            if !next_ref.item.as_ref().map(&predicate).unwrap_or(false) {
                return None;
            }

            match self.head.compare_exchange(
                head,
                next,
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            ) {
                Ok(_) => {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    // Safety: the old head is now unreachable from any live
                    // traversal; reclaim it once no guard can observe it.
                    unsafe {
                        guard.defer_destroy(head);
                    }
                    // `next` is now the sentinel; its `item` becomes ours.
                    // We cannot move out of a shared node directly, so take
                    // it via an unsafe raw pointer — sound because we are
                    // the unique thread that won the CAS above, and no other
                    // thread reads `item` after `next` stops being reachable
                    // as a non-sentinel node.
                    let item = unsafe {
                        let raw = next.as_raw() as *mut Node<T>;
                        (*raw).item.take()
                    };
                    return item;
                }
                Err(_) => {
                    backoff.spin();
                    continue;
                }
            }
        }
    }

    /// Returns `true` if the queue currently has no elements.
    ///
    /// Advisory only: under concurrent access this is a snapshot, not a
    /// linearization point.
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Relaxed) == 0
    }

    /// An O(n) approximate element count.
    ///
    /// Advisory only, per the open question in the runtime spec: no contract
    /// claims this is a linearization point.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

// Safety: `MsQueue<T>` only ever shares `T` across threads through the
// Michael–Scott protocol's CAS operations, which already require `T: Send`.
unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        // No concurrent access is possible once we have `&mut self`; drain
        // with a plain (non-epoch) loop to free every remaining node.
        while self.dequeue().is_some() {}
        let guard = &epoch::pin();
        let sentinel = self.head.load(Ordering::Relaxed, guard);
        if !sentinel.is_null() {
            unsafe {
                drop(sentinel.into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_single_threaded() {
        let q = MsQueue::new();
        q.enqueue(1);
        q.enqueue(2);
        q.enqueue(3);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
        assert_eq!(q.dequeue(), Some(3));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let q: MsQueue<i32> = MsQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
        q.enqueue(1);
        assert!(!q.is_empty());
    }

    #[test]
    fn concurrent_enqueue_dequeue_preserves_every_item() {
        let q = Arc::new(MsQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|t| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..2_500 {
                        q.enqueue(t * 2_500 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        while let Some(item) = q.dequeue() {
            assert!(seen.insert(item), "item {item} dequeued twice");
        }
        assert_eq!(seen.len(), 10_000);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone, Copy)]
        enum Op {
            Enqueue(i32),
            Dequeue,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![any::<i32>().prop_map(Op::Enqueue), Just(Op::Dequeue)]
        }

        proptest! {
            // Against any single-threaded interleaving of enqueues and
            // dequeues, `MsQueue` must linearize exactly like a plain FIFO
            // `VecDeque` — no reorder, no loss, no phantom item.
            #[test]
            fn fifo_linearizes_like_a_vecdeque(ops in proptest::collection::vec(op_strategy(), 0..200)) {
                let q = MsQueue::new();
                let mut model = std::collections::VecDeque::new();
                for op in ops {
                    match op {
                        Op::Enqueue(v) => {
                            q.enqueue(v);
                            model.push_back(v);
                        }
                        Op::Dequeue => {
                            prop_assert_eq!(q.dequeue(), model.pop_front());
                        }
                    }
                }
                while let Some(expected) = model.pop_front() {
                    prop_assert_eq!(q.dequeue(), Some(expected));
                }
                prop_assert_eq!(q.dequeue(), None);
            }
        }
    }
}

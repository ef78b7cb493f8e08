// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};

use crate::node::Node;

/// A classical Treiber stack.
///
/// ABA-safe in the sense the original algorithm is: popped nodes are never
/// recycled back into this stack, so a stale `head` pointer observed by one
/// thread can never be re-installed by another thread running a disjoint
/// sequence of pushes and pops. Reclamation of popped nodes is deferred to
/// the epoch collector instead of being freed eagerly.
pub struct TreiberStack<T> {
    head: Atomic<Node<T>>,
    len: AtomicUsize,
}

impl<T> Default for TreiberStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TreiberStack<T> {
    pub fn new() -> Self {
        TreiberStack {
            head: Atomic::null(),
            len: AtomicUsize::new(0),
        }
    }

    /// Pushes `item` onto the stack. Never fails.
    pub fn push(&self, item: T) {
        let guard = &epoch::pin();
        let mut new_node = Owned::new(Node::new(Some(item)));
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            new_node.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange(
                head,
                new_node,
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            ) {
                Ok(_) => {
                    self.len.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => new_node = e.new,
            }
        }
    }

    /// Pops the top item, or returns `None` if the stack was empty at the
    /// moment of the read.
    pub fn try_pop(&self) -> Option<T> {
        let guard = &epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            if head.is_null() {
                return None;
            }
            // Safety: non-null, and still linked until the CAS below wins.
            let head_ref = unsafe { head.deref() };
            let next = head_ref.next.load(Ordering::Relaxed, guard);
            match self.head.compare_exchange(
                head,
                next,
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            ) {
                Ok(_) => {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    let item = unsafe {
                        let raw = head.as_raw() as *mut Node<T>;
                        (*raw).item.take()
                    };
                    unsafe {
                        guard.defer_destroy(head);
                    }
                    return item;
                }
                Err(_) => continue,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Relaxed) == 0
    }

    /// Advisory element count; see [`crate::queue::MsQueue::len`] for the
    /// same caveat.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

unsafe impl<T: Send> Send for TreiberStack<T> {}
unsafe impl<T: Send> Sync for TreiberStack<T> {}

impl<T> Drop for TreiberStack<T> {
    fn drop(&mut self) {
        while self.try_pop().is_some() {}
    }
}

// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use crossbeam_epoch::Atomic;

/// A single-linked node shared by [`crate::queue::MsQueue`] and
/// [`crate::stack::TreiberStack`].
///
/// The shape never changes once linked: `item` is populated at construction
/// and taken (replaced with `None`) the moment the node is logically
/// dequeued, so the node itself can still be safely reclaimed through an
/// epoch guard afterwards.
pub(crate) struct Node<T> {
    pub(crate) item: Option<T>,
    pub(crate) next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    pub(crate) fn new(item: Option<T>) -> Self {
        Node {
            item,
            next: Atomic::null(),
        }
    }
}

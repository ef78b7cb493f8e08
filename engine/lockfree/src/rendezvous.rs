// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A lock-free consumer/producer rendezvous queue: at any instant the
//! backing queue holds either pending items *or* pending consumers, never
//! both. An enqueued item handed to a waiting consumer is delivered inline,
//! on the producer's own thread — see the struct docs for what that implies.

use crate::queue::MsQueue;

enum Slot<T> {
    Item(T),
    Waiter(Box<dyn FnOnce(T) + Send>),
}

/// A rendezvous point between producers offering values and consumers
/// registering callbacks to receive the next one.
///
/// # Inline dispatch
///
/// When [`offer`](RendezvousQueue::offer) finds a waiting consumer, it calls
/// that consumer's callback **inline, on the producer's thread**, before
/// returning. If the callback is slow, the producer's thread is effectively
/// borrowed to run it. Callers that cannot tolerate this should route the
/// handoff through a dispatch queue themselves rather than registering a
/// heavyweight callback directly.
pub struct RendezvousQueue<T> {
    slots: MsQueue<Slot<T>>,
}

impl<T: Send + 'static> Default for RendezvousQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> RendezvousQueue<T> {
    pub fn new() -> Self {
        RendezvousQueue {
            slots: MsQueue::new(),
        }
    }

    /// Offers `item` to the queue. If a consumer is already registered, it is
    /// claimed and invoked with `item` inline; otherwise `item` is enqueued
    /// for the next consumer to claim.
    pub fn offer(&self, item: T) {
        match self.slots.pop_if(|slot| matches!(slot, Slot::Waiter(_))) {
            Some(Slot::Waiter(consumer)) => consumer(item),
            Some(Slot::Item(_)) => unreachable!("pop_if only matched Slot::Waiter"),
            None => self.slots.enqueue(Slot::Item(item)),
        }
    }

    /// Registers `consumer` to receive the next offered item. If an item is
    /// already queued, `consumer` is claimed the item and invoked
    /// immediately, inline on the calling thread.
    pub fn register(&self, consumer: impl FnOnce(T) + Send + 'static) {
        let claimed = self.slots.pop_if(|slot| matches!(slot, Slot::Item(_)));
        match claimed {
            Some(Slot::Item(item)) => consumer(item),
            Some(Slot::Waiter(_)) => unreachable!("pop_if only matched Slot::Item"),
            None => self.slots.enqueue(Slot::Waiter(Box::new(consumer))),
        }
    }

    /// Advisory: true if there are no queued items or waiters.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

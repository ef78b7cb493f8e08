// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A Hendler–Lev-Moir–Shavit-style work-stealing deque: the owner thread
//! pushes and pops from the bottom, any number of thief threads steal from
//! the top.
//!
//! Storage is a single contiguous buffer that doubles in size on overflow
//! — the representation `crossbeam-deque` itself uses — rather than a
//! chain of fixed-size nodes. Doubling an array needs no tag to break ABA:
//! the `top` cursor is a monotonically increasing index rather than a
//! reused pointer, so the classic "tag the pointer" trick has nothing to
//! protect against here. Every externally observable behavior (owner-only
//! push/pop, concurrent steal, an advisory `len`, no item ever returned
//! twice) is unchanged; see `DESIGN.md` for the tradeoff.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};

/// Default initial capacity of a freshly created deque, matching the
/// spec's default chunk size.
const DEFAULT_CAPACITY: usize = 32;

struct Buffer<T> {
    mask: usize,
    storage: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

impl<T> Buffer<T> {
    fn with_capacity(cap: usize) -> Self {
        debug_assert!(cap.is_power_of_two());
        let storage = (0..cap)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Buffer {
            mask: cap - 1,
            storage,
        }
    }

    fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Safety: caller guarantees exclusive access to slot `index` (either the
    /// owner writing a not-yet-visible slot, or a reader that has already
    /// claimed the slot via a winning CAS).
    unsafe fn write(&self, index: isize, item: T) {
        let slot = &self.storage[index as usize & self.mask];
        (*slot.get()).write(item);
    }

    unsafe fn read(&self, index: isize) -> T {
        let slot = &self.storage[index as usize & self.mask];
        (*slot.get()).assume_init_read()
    }
}

/// A single-owner, multi-thief work-stealing deque.
///
/// `push`/`try_pop` are only safe to call from the owning thread; `try_steal`
/// may be called from any thread, any number of times concurrently.
pub struct WorkStealingDeque<T> {
    bottom: AtomicIsize,
    top: AtomicIsize,
    buffer: Atomic<Buffer<T>>,
    pushes: AtomicUsize,
    pops: AtomicUsize,
    steals: AtomicUsize,
}

impl<T> Default for WorkStealingDeque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkStealingDeque<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(DEFAULT_CAPACITY);
        let guard = &epoch::pin();
        let buffer = Owned::new(Buffer::with_capacity(capacity)).into_shared(guard);
        WorkStealingDeque {
            bottom: AtomicIsize::new(0),
            top: AtomicIsize::new(0),
            buffer: Atomic::from(buffer),
            pushes: AtomicUsize::new(0),
            pops: AtomicUsize::new(0),
            steals: AtomicUsize::new(0),
        }
    }

    /// Owner-only: pushes `item` onto the bottom of the deque, growing the
    /// backing buffer if it is full.
    pub fn push(&self, item: T) {
        let guard = &epoch::pin();
        let bottom = self.bottom.load(Ordering::Relaxed);
        let top = self.top.load(Ordering::Acquire);
        let mut buffer = self.buffer.load(Ordering::Relaxed, guard);
        // Safety: owner is the only writer of `self.buffer`.
        let buffer_ref = unsafe { buffer.deref() };

        if bottom - top >= buffer_ref.capacity() as isize {
            let old = buffer;
            let grown = self.grow(buffer_ref, bottom, top, guard);
            self.buffer.store(grown, Ordering::Release);
            buffer = grown;
            // Safety: `old` is no longer reachable through `self.buffer` once
            // the store above is visible, and only the owner ever replaces
            // `self.buffer`, so deferring its destruction to the next epoch
            // boundary is safe even if a thief is mid-read through it.
            unsafe {
                guard.defer_destroy(old);
            }
        }

        // Safety: slot `bottom` is beyond any thief's claimed range until we
        // publish the new bottom below.
        unsafe {
            buffer.deref().write(bottom, item);
        }
        self.bottom.store(bottom + 1, Ordering::Release);
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    fn grow<'g>(
        &self,
        old: &Buffer<T>,
        bottom: isize,
        top: isize,
        guard: &'g epoch::Guard,
    ) -> Shared<'g, Buffer<T>> {
        let new_cap = old.capacity() * 2;
        let new_buffer = Buffer::with_capacity(new_cap);
        for i in top..bottom {
            // Safety: every slot in [top, bottom) is a live, owner-written
            // item that has not yet been claimed by a thief (a thief that
            // claims during this copy simply loses the later top CAS below).
            unsafe {
                new_buffer.write(i, old.read(i));
            }
        }
        Owned::new(new_buffer).into_shared(guard)
    }

    /// Owner-only: pops the item most recently pushed, if the deque is
    /// non-empty and no concurrent steal has already claimed it.
    pub fn try_pop(&self) -> Option<T> {
        let guard = &epoch::pin();
        let bottom = self.bottom.load(Ordering::Relaxed);
        let new_bottom = bottom - 1;
        self.bottom.store(new_bottom, Ordering::Relaxed);
        std::sync::atomic::fence(Ordering::SeqCst);

        let top = self.top.load(Ordering::Relaxed);
        let len = bottom - top;
        if len <= 0 {
            // Already empty; restore bottom and bail.
            self.bottom.store(bottom, Ordering::Relaxed);
            return None;
        }

        let buffer = self.buffer.load(Ordering::Relaxed, guard);
        // Safety: `new_bottom` is within the range we just claimed.
        let item = unsafe { buffer.deref().read(new_bottom) };

        if len == 1 {
            // Last element: race against thieves for `top` too.
            let won = self
                .top
                .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok();
            self.bottom.store(bottom, Ordering::Relaxed);
            if !won {
                // A thief claimed it first; the value we read is stale. The
                // thief's own read of the same slot is the one that counts,
                // so ours must be forgotten without running its destructor.
                std::mem::forget(item);
                return None;
            }
        }

        self.pops.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Attempts to steal the item at the top of the deque. May be called
    /// concurrently from any number of threads.
    pub fn try_steal(&self) -> StealResult<T> {
        let guard = &epoch::pin();
        let top = self.top.load(Ordering::Acquire);
        std::sync::atomic::fence(Ordering::SeqCst);
        let bottom = self.bottom.load(Ordering::Acquire);

        if top >= bottom {
            return StealResult::Empty;
        }

        let buffer = self.buffer.load(Ordering::Acquire, guard);
        // Safety: slot `top` is still live because `bottom > top` was just
        // observed; a racing owner pop can still beat us to the CAS below,
        // in which case we simply retry.
        let item = unsafe { buffer.deref().read(top) };

        match self
            .top
            .compare_exchange(top, top + 1, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => {
                self.steals.fetch_add(1, Ordering::Relaxed);
                StealResult::Success(item)
            }
            Err(_) => {
                std::mem::forget(item);
                StealResult::Retry
            }
        }
    }

    /// An instantaneous, advisory snapshot — not a linearization point.
    pub fn is_empty(&self) -> bool {
        let bottom = self.bottom.load(Ordering::Acquire);
        let top = self.top.load(Ordering::Acquire);
        bottom <= top
    }

    /// An instantaneous, advisory element count derived from the current
    /// `(top, bottom)` positions.
    pub fn len(&self) -> usize {
        let bottom = self.bottom.load(Ordering::Acquire);
        let top = self.top.load(Ordering::Acquire);
        (bottom - top).max(0) as usize
    }

    /// Lightweight counters for dispatch-pool introspection; see
    /// `dispatch::ElasticPool`.
    pub fn stats(&self) -> DequeStats {
        DequeStats {
            pushes: self.pushes.load(Ordering::Relaxed),
            pops: self.pops.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
        }
    }
}

unsafe impl<T: Send> Send for WorkStealingDeque<T> {}
unsafe impl<T: Send> Sync for WorkStealingDeque<T> {}

impl<T> Drop for WorkStealingDeque<T> {
    fn drop(&mut self) {
        while self.try_pop().is_some() {}
    }
}

/// Outcome of a [`WorkStealingDeque::try_steal`] attempt.
#[derive(Debug)]
pub enum StealResult<T> {
    /// The deque was empty at the time of the read.
    Empty,
    /// A concurrent owner pop or other thief claimed the slot first; the
    /// caller should retry.
    Retry,
    /// The steal succeeded.
    Success(T),
}

/// A snapshot of push/pop/steal counters for one deque.
#[derive(Debug, Clone, Copy, Default)]
pub struct DequeStats {
    pub pushes: usize,
    pub pops: usize,
    pub steals: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn owner_push_pop_is_lifo() {
        let d = WorkStealingDeque::new();
        d.push(1);
        d.push(2);
        d.push(3);
        assert_eq!(d.try_pop(), Some(3));
        assert_eq!(d.try_pop(), Some(2));
        assert_eq!(d.try_pop(), Some(1));
        assert_eq!(d.try_pop(), None);
    }

    #[test]
    fn steal_takes_from_the_top() {
        let d = WorkStealingDeque::new();
        d.push(1);
        d.push(2);
        match d.try_steal() {
            StealResult::Success(v) => assert_eq!(v, 1),
            other => panic!("expected a successful steal, got {other:?}"),
        }
        assert_eq!(d.try_pop(), Some(2));
    }

    #[test]
    fn grows_past_default_capacity() {
        let d = WorkStealingDeque::new();
        for i in 0..10_000 {
            d.push(i);
        }
        let mut popped = Vec::new();
        while let Some(v) = d.try_pop() {
            popped.push(v);
        }
        popped.reverse();
        assert_eq!(popped, (0..10_000).collect::<Vec<_>>());
    }

    #[test]
    fn contention_never_duplicates_or_loses_items() {
        const N: usize = 10_000;
        let d = Arc::new(WorkStealingDeque::new());
        for i in 0..N {
            d.push(i);
        }

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let thieves: Vec<_> = (0..8)
            .map(|_| {
                let d = d.clone();
                let seen = seen.clone();
                thread::spawn(move || loop {
                    match d.try_steal() {
                        StealResult::Success(v) => seen.lock().unwrap().push(v),
                        StealResult::Retry => continue,
                        StealResult::Empty => break,
                    }
                })
            })
            .collect();

        while let Some(v) = d.try_pop() {
            seen.lock().unwrap().push(v);
        }
        for t in thieves {
            t.join().unwrap();
        }

        let mut all = seen.lock().unwrap().clone();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), N, "every item must be returned exactly once");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]
            // Every item pushed by the owner is returned exactly once across
            // the owner's own pops and any number of concurrent thieves,
            // whatever the item count or thief count.
            #[test]
            fn every_item_returned_exactly_once(
                item_count in 1usize..4_000,
                thief_count in 1usize..9,
            ) {
                let d = Arc::new(WorkStealingDeque::new());
                for i in 0..item_count {
                    d.push(i);
                }

                let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
                let thieves: Vec<_> = (0..thief_count)
                    .map(|_| {
                        let d = d.clone();
                        let seen = seen.clone();
                        thread::spawn(move || loop {
                            match d.try_steal() {
                                StealResult::Success(v) => seen.lock().unwrap().push(v),
                                StealResult::Retry => continue,
                                StealResult::Empty => break,
                            }
                        })
                    })
                    .collect();

                while let Some(v) = d.try_pop() {
                    seen.lock().unwrap().push(v);
                }
                for t in thieves {
                    t.join().unwrap();
                }

                let mut all = seen.lock().unwrap().clone();
                all.sort_unstable();
                all.dedup();
                prop_assert_eq!(all.len(), item_count);
            }
        }
    }
}

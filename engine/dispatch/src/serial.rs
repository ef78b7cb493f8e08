// Copyright Dream Runtime Contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lockfree::MsQueue;
use timer::DispatchQueue;

type Job = Box<dyn FnOnce() + Send>;

struct Inner {
    mailbox: MsQueue<Job>,
    /// `true` while some thread is actively draining the mailbox. Acts as a
    /// lock-free trampoline: whichever submission flips this from `false` to
    /// `true` becomes the drainer for every job already queued, plus any
    /// enqueued by others while it runs, guaranteeing FIFO, non-overlapping
    /// execution without this queue owning a dedicated thread.
    draining: AtomicBool,
}

/// A per-object serial dispatch queue: every submitted item runs to
/// completion before the next one starts, in FIFO order. Unlike
/// [`crate::elastic::ElasticPool`] this
/// queue has no worker threads of its own — whichever caller's submission
/// wins the trampoline race above runs the whole pending backlog inline on
/// its own thread before returning.
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<Inner>,
}

impl SerialQueue {
    pub fn new() -> Self {
        SerialQueue {
            inner: Arc::new(Inner { mailbox: MsQueue::new(), draining: AtomicBool::new(false) }),
        }
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue for SerialQueue {
    fn queue_work_item(&self, action: Job) -> bool {
        self.inner.mailbox.enqueue(action);
        // Only one submitter at a time becomes the drainer; everyone else's
        // job is picked up by whichever submission is already draining.
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            loop {
                while let Some(job) = self.inner.mailbox.dequeue() {
                    job();
                }
                // Release the drainer role, then re-check: a job enqueued
                // between the last `dequeue` and this release would
                // otherwise sit unclaimed if nobody else is submitting.
                self.inner.draining.store(false, Ordering::Release);
                if self.inner.mailbox.is_empty() {
                    break;
                }
                if self
                    .inner
                    .draining
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                    .is_err()
                {
                    break;
                }
            }
        }
        true
    }
}

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    shutting_down: bool,
}

/// A fixed-capacity FIFO handoff between the ingestion API (producer) and
/// the worker pool (consumers), backed by a mutex-guarded deque plus one
/// condvar per direction rather than the original's pair of counted
/// semaphores — `parking_lot::Condvar` gives the same "wake one waiter per
/// slot freed" behavior on a portable primitive instead of platform
/// semaphore handles.
///
/// `try_enqueue`/`try_dequeue` both take a timeout and return whether they
/// succeeded; `shutdown` unblocks every thread currently waiting in either
/// one, which then return `false`/`None`, and causes every later call to do
/// the same without waiting.
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BlockingQueue<T> {
    pub fn bounded(capacity: usize) -> Self {
        BlockingQueue {
            inner: Mutex::new(Inner { queue: VecDeque::with_capacity(capacity), capacity, shutting_down: false }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Waits up to `timeout` for room to enqueue `item`. Returns `true` once
    /// the item is in the queue. Returns `false`, dropping `item`, if the
    /// queue is already shutting down or no room opens up within `timeout` —
    /// shutdown is checked first, so a queue mid-shutdown never accepts a
    /// fresh item even if a slot happens to be free.
    pub fn try_enqueue(&self, item: T, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.shutting_down {
                return false;
            }
            if inner.queue.len() < inner.capacity {
                inner.queue.push_back(item);
                self.not_empty.notify_one();
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.not_full.wait_for(&mut inner, remaining);
        }
    }

    /// Waits up to `timeout` for an item to dequeue. Returns `None` if the
    /// queue is shutting down or the timeout elapses first.
    pub fn try_dequeue(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.shutting_down {
                return None;
            }
            if let Some(item) = inner.queue.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            self.not_empty.wait_for(&mut inner, remaining);
        }
    }

    /// Unblocks every thread currently suspended in `try_enqueue` or
    /// `try_dequeue`; they return `false`/`None`. Idempotent and permanent —
    /// there is no way to un-shut-down a queue.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutting_down = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().shutting_down
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }
}

//! Bounded outbound queue for a single session.
//!
//! Producers (the broadcaster) never wait: when the queue is full the oldest
//! pending line is evicted to make room. A single consumer (the session's
//! writer) awaits lines in FIFO order.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Outcome of pushing a line onto a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// Line queued without evicting anything.
    Queued,
    /// Line queued after evicting the oldest pending line. `overflow_started`
    /// is set on the first eviction since the consumer last caught up.
    DroppedOldest { overflow_started: bool },
    /// Mailbox is closed; the line was discarded.
    Closed,
}

pub struct Mailbox {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

struct Inner {
    queue: VecDeque<Bytes>,
    closed: bool,
    dropped: u64,
    /// Evicting since the queue was last drained.
    overflowing: bool,
}

impl Mailbox {
    /// Create a mailbox holding at most `capacity` lines (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
                dropped: 0,
                overflowing: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue a line, evicting the oldest entry if full. Never blocks on I/O.
    pub fn push(&self, line: Bytes) -> Enqueue {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Enqueue::Closed;
            }
            let outcome = if inner.queue.len() >= self.capacity {
                inner.queue.pop_front();
                inner.dropped += 1;
                let overflow_started = !inner.overflowing;
                inner.overflowing = true;
                Enqueue::DroppedOldest { overflow_started }
            } else {
                Enqueue::Queued
            };
            inner.queue.push_back(line);
            outcome
        };
        // Single consumer: a stored permit covers the case where it isn't waiting yet.
        self.notify.notify_one();
        outcome
    }

    /// Wait for the next line. Returns `None` once the mailbox is closed.
    pub async fn recv(&self) -> Option<Bytes> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if let Some(line) = inner.queue.pop_front() {
                    if inner.queue.is_empty() {
                        inner.overflowing = false;
                    }
                    return Some(line);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the mailbox, discarding anything still pending. Idempotent.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.queue.clear();
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines evicted so far because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Mailbox")
            .field("len", &inner.queue.len())
            .field("capacity", &self.capacity)
            .field("closed", &inner.closed)
            .field("dropped", &inner.dropped)
            .finish()
    }
}

//! Inbound message queue between the network and listener threads.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Unbounded FIFO of raw frames.
///
/// The network thread pushes and returns immediately; the listener waits on
/// the condition variable with a timeout so stop checks stay bounded.
#[derive(Debug, Default)]
pub struct InboundQueue {
    items: Mutex<VecDeque<String>>,
    available: Condvar,
}

impl InboundQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame and wake one waiter.
    pub fn push(&self, raw: String) {
        self.items.lock().push_back(raw);
        self.available.notify_one();
    }

    /// Pop the oldest frame, waiting up to `timeout` if the queue is empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        let mut items = self.items.lock();
        if items.is_empty() {
            let _ = self.available.wait_for(&mut items, timeout);
        }
        items.pop_front()
    }

    /// Wake every waiter without queueing anything.
    pub fn wake(&self) {
        self.available.notify_all();
    }
}

//! Bounded FIFO between pipeline stages. Blocking operations observe a cancellation token
//! and hand the item back when a timed offer expires.

use crossbeam_channel::{
    Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded, unbounded,
};
use std::time::{Duration, Instant};

use crate::error::Cancelled;
use crate::utils::config::PollConsts;

use super::control::CancelToken;

/// Result of [`WorkQueue::offer`].
#[derive(Debug)]
pub enum Offer<T> {
    Accepted,
    /// No space within the timeout; the caller keeps the item and retries.
    TimedOut(T),
}

pub struct WorkQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    token: CancelToken,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        WorkQueue {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn bounded(capacity: usize, token: CancelToken) -> Self {
        let (tx, rx) = bounded(capacity);
        WorkQueue { tx, rx, token }
    }

    pub fn unbounded(token: CancelToken) -> Self {
        let (tx, rx) = unbounded();
        WorkQueue { tx, rx, token }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Block until there is room.
    pub fn put(&self, item: T) -> Result<(), Cancelled> {
        let mut item = item;
        loop {
            self.token.check()?;
            match self.tx.send_timeout(item, PollConsts::QUEUE_POLL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(_)) => return Err(Cancelled),
            }
        }
    }

    /// Try to enqueue within `timeout`.
    pub fn offer(&self, item: T, timeout: Duration) -> Result<Offer<T>, Cancelled> {
        let deadline = Instant::now() + timeout;
        let mut item = item;
        loop {
            self.token.check()?;
            let left = deadline.saturating_duration_since(Instant::now());
            match self.tx.send_timeout(item, left.min(PollConsts::QUEUE_POLL)) {
                Ok(()) => return Ok(Offer::Accepted),
                Err(SendTimeoutError::Timeout(back)) => {
                    if Instant::now() >= deadline {
                        return Ok(Offer::TimedOut(back));
                    }
                    item = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(Cancelled),
            }
        }
    }

    /// Block until an item is available.
    pub fn take(&self) -> Result<T, Cancelled> {
        loop {
            self.token.check()?;
            match self.rx.recv_timeout(PollConsts::QUEUE_POLL) {
                Ok(item) => return Ok(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(Cancelled),
            }
        }
    }
}

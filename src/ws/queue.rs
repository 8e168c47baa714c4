//! Asynchronous outbound queue in front of [`Client::write_message`].
//!
//! Producers push frames into a bounded ring; a single worker task delivers
//! them strictly in order. A frame whose delivery fails goes back to the tail
//! of the ring. When the ring is full the oldest pending frame is dropped to
//! make room, so memory stays bounded and producers never block during an
//! outage.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::sleep;

use super::client::Client;
use super::frame::Frame;
use super::traits::Transport;
use crate::error::Error;

#[derive(Debug)]
struct Ring {
    items: VecDeque<Frame>,
    capacity: usize,
    closed: bool,
}

impl Ring {
    /// Appends `frame`, evicting the oldest entry if full.
    fn push(&mut self, frame: Frame) -> Option<Frame> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(frame);
        evicted
    }
}

#[derive(Debug)]
struct Shared {
    ring: Mutex<Ring>,
    notify: Notify,
}

/// Bounded, ordered queue of pending outbound frames.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct WriteQueue {
    shared: Arc<Shared>,
}

impl WriteQueue {
    /// Create a queue holding at most `capacity` pending frames (at least one).
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(Ring {
                    items: VecDeque::with_capacity(capacity),
                    capacity,
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    // A Ring is consistent after every mutation, so a poisoned lock is safe to reuse.
    fn ring(&self) -> std::sync::MutexGuard<'_, Ring> {
        self.shared
            .ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a frame. Returns the oldest pending frame if it had to be
    /// dropped to make room.
    ///
    /// Frames pushed after [`WriteQueue::close`] are discarded and returned.
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        let evicted = {
            let mut ring = self.ring();
            if ring.closed {
                return Some(frame);
            }
            ring.push(frame)
        };
        self.shared.notify.notify_one();
        evicted
    }

    /// Stop accepting frames. The worker exits once the queue is drained.
    pub fn close(&self) {
        self.ring().closed = true;
        self.shared.notify.notify_one();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring().capacity
    }

    /// Pending frames, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Frame> {
        self.ring().items.iter().cloned().collect()
    }

    /// Wait for the next frame. `None` once closed and drained.
    pub(crate) async fn pop(&self) -> Option<Frame> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut ring = self.ring();
                if let Some(frame) = ring.items.pop_front() {
                    return Some(frame);
                }
                if ring.closed {
                    return None;
                }
            }
            notified.await;
        }
    }
}

/// Worker loop: delivers frames one at a time, in arrival order.
pub(crate) async fn run<T: Transport>(
    client: Client<T>,
    queue: WriteQueue,
    faults: mpsc::Sender<Error>,
    retry_delay: Duration,
) {
    while let Some(frame) = queue.pop().await {
        let Err(error) = client.write_message(frame.clone()).await else {
            continue;
        };

        match faults.try_send(error) {
            Ok(()) => {}
            Err(TrySendError::Full(error) | TrySendError::Closed(error)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %error, "Fault sink not ready, dropping fault report");
                #[cfg(not(feature = "tracing"))]
                let _ = &error;
            }
        }

        // Failed frames go back to the tail, behind anything pushed meanwhile.
        if let Some(evicted) = queue.push(frame) {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                bytes = evicted.payload.len(),
                "Dropped pending frame to bound the write queue"
            );
            #[cfg(not(feature = "tracing"))]
            let _ = &evicted;
        }

        sleep(retry_delay).await;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Write queue closed, worker exiting");
}

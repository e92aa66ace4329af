//! A two-way conduit between the scanner and the workers of one lane.
//!
//! The work channel carries batches from the scanner to a worker; the acknowledgment channel lets
//! the worker signal that it finished a batch. Both are bounded to the same capacity, which is what
//! gives the scanner flow control over its workers.

use std::fmt;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::{Error, Result};

/// The other end of a link has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("link is closed")]
pub struct Closed;

/// Create a link whose channels both hold up to `capacity` entries.
///
/// Returns the scanner side and the worker side. The worker side may be cloned so that several
/// workers consume from one link; the scanner side is owned by the single dispatcher.
pub fn link<B>(capacity: usize) -> Result<(Link<B>, WorkerEnd<B>)> {
    if capacity == 0 {
        return Err(Error::InvalidChannelCapacity);
    }
    let (to_worker, from_scanner) = bounded(capacity);
    let (to_scanner, from_worker) = bounded(capacity);
    Ok((
        Link {
            to_worker,
            from_worker,
            capacity,
        },
        WorkerEnd {
            from_scanner,
            to_scanner,
        },
    ))
}

/// Scanner side of a link
pub struct Link<B> {
    to_worker: Sender<B>,
    from_worker: Receiver<()>,
    capacity: usize,
}

impl<B> Link<B> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of batches sitting on the work channel, not yet picked up by a worker
    pub fn queued(&self) -> usize {
        self.to_worker.len()
    }

    /// Whether a [`send`](Self::send) would complete without waiting.
    ///
    /// The scanner is the only sender on a link, so free capacity observed here can only grow
    /// until the scanner sends again.
    pub fn has_capacity(&self) -> bool {
        self.to_worker.len() < self.capacity
    }

    /// Pass a batch of work on to the worker, waiting if the work channel is full
    pub fn send(&self, batch: B) -> Result<(), Closed> {
        self.to_worker.send(batch).map_err(|_| Closed)
    }

    /// Receiver for worker acknowledgments
    pub(crate) fn acks(&self) -> &Receiver<()> {
        &self.from_worker
    }

    /// Close both channels.
    ///
    /// Workers finish the batches already on the work channel and then see the end of their
    /// receive loop. This must only be called once every batch sent on this link has been
    /// acknowledged: a worker acknowledging after the close gets [`Closed`] back, and any batch
    /// still waiting in a scanner side queue would never be delivered.
    pub fn close(self) {}
}

impl<B> fmt::Debug for Link<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("capacity", &self.capacity)
            .field("queued", &self.to_worker.len())
            .field("unread_acks", &self.from_worker.len())
            .finish()
    }
}

/// Worker side of a link
pub struct WorkerEnd<B> {
    from_scanner: Receiver<B>,
    to_scanner: Sender<()>,
}

impl<B> WorkerEnd<B> {
    /// Wait for the next batch.
    ///
    /// Returns `None` once the link is closed and every batch on it has been received.
    pub fn recv(&self) -> Option<B> {
        self.from_scanner.recv().ok()
    }

    /// Take the next batch if one is already waiting
    pub fn try_recv(&self) -> Option<B> {
        self.from_scanner.try_recv().ok()
    }

    /// Acknowledge completion of one batch to the scanner.
    ///
    /// Must be called exactly once per received batch, in the order received.
    pub fn acknowledge(&self) -> Result<(), Closed> {
        self.to_scanner.send(()).map_err(|_| Closed)
    }
}

// Manual impl so that `B: Clone` is not required
impl<B> Clone for WorkerEnd<B> {
    fn clone(&self) -> Self {
        Self {
            from_scanner: self.from_scanner.clone(),
            to_scanner: self.to_scanner.clone(),
        }
    }
}

impl<B> fmt::Debug for WorkerEnd<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerEnd")
            .field("pending", &self.from_scanner.len())
            .finish()
    }
}

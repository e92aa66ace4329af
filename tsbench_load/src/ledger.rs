//! Bookkeeping for batches that have been admitted but not yet acknowledged.
//!
//! Each lane has a queue of batches waiting for room on its link. The count of outstanding batches
//! is global across lanes and covers both batches on a link and batches still queued. Both the
//! count and the queues are owned by the scanner thread; workers never see them.

use std::collections::VecDeque;

use crate::link::{Closed, Link};

/// Admit a full batch into the pipeline.
///
/// The batch counts as outstanding from this point on. It is sent straight away if nothing is
/// queued ahead of it and the link has room; otherwise it goes to the back of the lane's queue so
/// that batches reach the worker in the order they were admitted.
pub fn admit<B>(
    link: &Link<B>,
    outstanding: &mut usize,
    pending: &mut VecDeque<B>,
    batch: B,
) -> Result<(), Closed> {
    *outstanding += 1;
    if pending.is_empty() && link.has_capacity() {
        link.send(batch)
    } else {
        pending.push_back(batch);
        Ok(())
    }
}

/// Account for one acknowledgment received on `link`.
///
/// Decrements the outstanding count and, if the lane has queued batches, sends the oldest one.
/// When several workers share the link it may still be full; the batch then stays at the head of
/// the queue until a later acknowledgment, which a full link guarantees.
pub fn release<B>(
    link: &Link<B>,
    outstanding: &mut usize,
    pending: &mut VecDeque<B>,
) -> Result<(), Closed> {
    *outstanding = outstanding
        .checked_sub(1)
        .expect("acknowledgment received with no batch outstanding");
    if !link.has_capacity() {
        return Ok(());
    }
    match pending.pop_front() {
        Some(next) => link.send(next),
        None => Ok(()),
    }
}

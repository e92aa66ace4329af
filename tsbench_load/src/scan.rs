//! The scanner: reads points, fills batches and dispatches them to workers with flow control.

use std::collections::VecDeque;

use crossbeam_channel::{Select, SelectedOperation};
use tracing::{debug, trace};

use crate::{
    Error, Result,
    indexer::PointIndexer,
    ledger::{admit, release},
    link::Link,
    point::{Batch, BatchFactory, PointDecoder},
};

/// Multiple of total link capacity that may be outstanding before the scanner blocks on workers
const OUTSTANDING_LIMIT_FACTOR: usize = 3;

/// Static configuration for one scan
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    /// Number of points per batch
    pub batch_size: usize,
    /// Stop after reading this many points, `0` reads the whole input
    pub limit: u64,
    /// Number of outstanding batches at which the scanner stops reading and waits for a worker.
    ///
    /// Derived from the links when `None`: three times their combined capacity.
    pub outstanding_limit: Option<usize>,
}

impl ScanConfig {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            limit: 0,
            outstanding_limit: None,
        }
    }

    pub fn with_limit(self, limit: u64) -> Self {
        Self { limit, ..self }
    }

    pub fn with_outstanding_limit(self, outstanding_limit: usize) -> Self {
        Self {
            outstanding_limit: Some(outstanding_limit),
            ..self
        }
    }
}

/// Reads points from a decoder and dispatches them in batches across a set of [`Link`]s.
///
/// Each link is one lane. A [`PointIndexer`] picks the lane for every point; when a lane's batch
/// reaches the batch size it is admitted (see [`admit`]) and replaced with a fresh batch from the
/// [`BatchFactory`].
///
/// Between points the scanner checks all links for acknowledgments without waiting. Once the
/// number of outstanding batches reaches the outstanding limit it instead waits for at least one
/// acknowledgment before reading on, so that it does not pile up batches in memory faster than the
/// workers can take them. When several links are ready at once, which one is serviced first is
/// left to [`Select`] and should not be relied upon.
///
/// After the input is exhausted the partially filled batches are flushed and the scanner waits
/// until every admitted batch has been acknowledged. Only then is it safe to close the links.
#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    /// Create a [`Scanner`], validating the configuration
    pub fn new(config: ScanConfig) -> Result<Self> {
        if config.batch_size < 1 {
            return Err(Error::InvalidBatchSize);
        }
        Ok(Self { config })
    }

    /// Scan until the decoder runs dry or the configured limit is reached.
    ///
    /// Returns the number of points read. Returns once every admitted batch has been
    /// acknowledged; a worker that never acknowledges blocks this call indefinitely.
    ///
    /// # Panics
    ///
    /// If `indexer` returns a lane outside `0..links.len()`.
    pub fn scan<D, F, I>(
        &self,
        links: &[Link<F::Batch>],
        decoder: &mut D,
        factory: &F,
        indexer: &I,
    ) -> Result<u64>
    where
        D: PointDecoder,
        F: BatchFactory,
        F::Batch: Batch<Point = D::Point>,
        I: PointIndexer<D::Point>,
    {
        if links.is_empty() {
            return Err(Error::NoLinks);
        }
        let outstanding_limit = self.config.outstanding_limit.unwrap_or_else(|| {
            links.iter().map(Link::capacity).sum::<usize>() * OUTSTANDING_LIMIT_FACTOR
        });

        // batches being filled, one per lane
        let mut batches: Vec<F::Batch> = links.iter().map(|_| factory.new_batch()).collect();
        let mut lanes = Lanes::new(links);

        let mut items_read = 0u64;
        loop {
            if self.config.limit > 0 && items_read == self.config.limit {
                debug!(items_read, "scan limit reached");
                break;
            }

            // too much in flight: wait for a worker to finish something before reading on
            if lanes.outstanding > 0 && lanes.outstanding >= outstanding_limit {
                trace!(outstanding = lanes.outstanding, "waiting on workers");
                lanes.wait_for_ack()?;
            } else {
                lanes.poll_for_ack()?;
            }

            let Some(point) = decoder.decode()? else {
                break;
            };

            let lane = indexer.index(&point);
            assert!(
                lane < links.len(),
                "point indexer returned lane {lane} but there are only {} links",
                links.len()
            );
            batches[lane].append(point);
            items_read += 1;

            if batches[lane].len() >= self.config.batch_size {
                let full = std::mem::replace(&mut batches[lane], factory.new_batch());
                lanes.admit(lane, full)?;
            }
        }

        // input is done, the last batches go out even though they are short
        for (lane, batch) in batches.into_iter().enumerate() {
            if !batch.is_empty() {
                lanes.admit(lane, batch)?;
            }
        }

        debug!(
            items_read,
            outstanding = lanes.outstanding,
            "input exhausted, draining"
        );
        // wait until every outstanding batch is acknowledged so that the links are not closed
        // early
        while lanes.outstanding > 0 {
            lanes.wait_for_ack()?;
        }

        Ok(items_read)
    }
}

/// Per-lane queues and the outstanding count, owned by the scanning thread
struct Lanes<'a, B> {
    links: &'a [Link<B>],
    pending: Vec<VecDeque<B>>,
    outstanding: usize,
    acks: Select<'a>,
}

impl<'a, B> Lanes<'a, B> {
    fn new(links: &'a [Link<B>]) -> Self {
        let mut acks = Select::new();
        for link in links {
            acks.recv(link.acks());
        }
        Self {
            links,
            pending: links.iter().map(|_| VecDeque::new()).collect(),
            outstanding: 0,
            acks,
        }
    }

    fn admit(&mut self, lane: usize, batch: B) -> Result<()> {
        admit(
            &self.links[lane],
            &mut self.outstanding,
            &mut self.pending[lane],
            batch,
        )
        .map_err(|_| self.disconnected(lane))
    }

    /// Handle an acknowledgment if any link has one ready, without waiting
    fn poll_for_ack(&mut self) -> Result<()> {
        match self.acks.try_select() {
            Ok(op) => self.acknowledged(op),
            Err(_) => Ok(()),
        }
    }

    /// Wait until some link has an acknowledgment and handle it
    fn wait_for_ack(&mut self) -> Result<()> {
        let op = self.acks.select();
        self.acknowledged(op)
    }

    fn acknowledged(&mut self, op: SelectedOperation<'a>) -> Result<()> {
        let lane = op.index();
        let link = &self.links[lane];
        op.recv(link.acks()).map_err(|_| self.disconnected(lane))?;
        release(link, &mut self.outstanding, &mut self.pending[lane])
            .map_err(|_| self.disconnected(lane))
    }

    fn disconnected(&self, lane: usize) -> Error {
        Error::WorkerDisconnected {
            lane,
            outstanding: self.outstanding,
        }
    }
}

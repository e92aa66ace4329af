//! Flow-controlled dispatch of decoded input into a pool of load workers.
//!
//! Input is decoded one point at a time by a [`PointDecoder`], routed to a lane by a
//! [`PointIndexer`], and accumulated into a per-lane [`Batch`]. Full batches are handed to the
//! lane's [`Link`], whose worker acknowledges each batch once it has been processed. The
//! [`Scanner`] keeps track of every batch that has been admitted but not yet acknowledged and
//! throttles itself to the pace of the workers once too much work is outstanding.
//!
//! The [`BenchmarkRunner`] owns the surrounding lifecycle: database setup, spawning one
//! [`Processor`] per worker thread, running the scanner and reporting load rates.

use std::path::PathBuf;

pub mod config;
pub mod indexer;
pub mod ledger;
pub mod link;
pub mod point;
pub mod report;
pub mod runner;
pub mod scan;

pub use config::RunnerConfig;
pub use indexer::{ConstantIndexer, HashIndexer, PointIndexer};
pub use link::{Closed, Link, WorkerEnd, link};
pub use point::{Batch, BatchFactory, DecodeError, PointDecoder};
pub use runner::{
    Benchmark, BatchStats, BenchmarkRunner, DbCreator, Processor, RunSummary, WorkQueues,
};
pub use scan::{ScanConfig, Scanner};

/// Boxed error returned by database specific collaborators
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("--batch-size cannot be less than 1")]
    InvalidBatchSize,

    #[error("link channel capacity must be greater than zero")]
    InvalidChannelCapacity,

    #[error("--workers cannot be less than 1")]
    InvalidWorkerCount,

    #[error("at least one link is required to dispatch batches")]
    NoLinks,

    #[error("failed to decode input: {0}")]
    Decode(#[from] DecodeError),

    #[error("worker for lane {lane} disconnected with {outstanding} batches outstanding")]
    WorkerDisconnected { lane: usize, outstanding: usize },

    #[error("failed to open input file '{}': {source}", path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database setup failed: {0}")]
    DbCreator(#[source] DynError),

    #[error("database '{0}' already exists and --do-abort-on-exist is set")]
    DatabaseExists(String),

    #[error("worker {worker} failed: {source}")]
    Processor {
        worker: usize,
        #[source]
        source: DynError,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

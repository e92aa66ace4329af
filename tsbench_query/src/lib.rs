//! Query benchmarks: replay a file of queries against a database with a pool of workers and
//! summarise their latencies.

use std::path::PathBuf;

pub mod config;
pub mod processor;
pub mod query;
pub mod runner;
pub mod stats;

pub use config::QueryRunnerConfig;
pub use processor::{StatConfig, StatProcessor, StatSummary};
pub use query::{Query, QueryDecoder};
pub use runner::{QueryExecutor, QueryRunner};
pub use stats::{Stat, StatGroup};

/// Boxed error returned by database specific executors
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("--workers cannot be less than 1")]
    InvalidWorkerCount,

    #[error("--burn-in ({burn_in}) must be less than --max-queries ({max_queries})")]
    BurnInTooLarge { burn_in: u64, max_queries: u64 },

    #[error("failed to open query file '{}': {source}", path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read queries: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed query at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("worker {worker} failed: {source}")]
    Executor {
        worker: usize,
        #[source]
        source: DynError,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("stat processor panicked")]
    StatProcessorPanicked,

    #[error("failed to write statistics: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

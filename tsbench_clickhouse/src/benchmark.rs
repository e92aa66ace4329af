use std::{
    collections::HashMap,
    io::BufRead,
    sync::{Arc, OnceLock, atomic::AtomicU32},
};

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tsbench_load::Benchmark;

use crate::{
    ClickHouseConfig, ClickHouseDbCreator, ClickHouseProcessor, DataHeader, HostnameIndexer,
    RowDecoder, TableBatch,
};

/// State shared by the database creator and every processor of one load
#[derive(Debug)]
pub(crate) struct LoadContext {
    pub(crate) config: ClickHouseConfig,
    pub(crate) db_name: String,
    pub(crate) hash_workers: bool,
    pub(crate) runtime: Handle,
    /// Set once the creator has read the input preamble
    pub(crate) header: OnceLock<DataHeader>,
    pub(crate) next_tag_id: AtomicU32,
    /// Tag ids known to all workers, used when hosts are not pinned to workers
    pub(crate) tag_ids: Arc<RwLock<HashMap<String, u32>>>,
}

/// The ClickHouse load benchmark
#[derive(Debug, Clone)]
pub struct ClickHouseBenchmark {
    context: Arc<LoadContext>,
}

impl ClickHouseBenchmark {
    /// `runtime` drives the HTTP client from the worker threads, which must not be runtime
    /// threads themselves
    pub fn new(
        config: ClickHouseConfig,
        db_name: impl Into<String>,
        hash_workers: bool,
        runtime: Handle,
    ) -> Self {
        Self {
            context: Arc::new(LoadContext {
                config,
                db_name: db_name.into(),
                hash_workers,
                runtime,
                header: OnceLock::new(),
                next_tag_id: AtomicU32::new(1),
                tag_ids: Default::default(),
            }),
        }
    }
}

impl Benchmark for ClickHouseBenchmark {
    type Batch = TableBatch;
    type Decoder = RowDecoder<Box<dyn BufRead + Send>>;
    type Factory = fn() -> TableBatch;
    type Indexer = HostnameIndexer;
    type Processor = ClickHouseProcessor;
    type DbCreator = ClickHouseDbCreator;

    fn db_creator(&self) -> ClickHouseDbCreator {
        ClickHouseDbCreator::new(Arc::clone(&self.context))
    }

    fn decoder(&self, input: Box<dyn BufRead + Send>) -> Self::Decoder {
        RowDecoder::new(input)
    }

    fn batch_factory(&self) -> Self::Factory {
        TableBatch::default
    }

    fn indexer(&self, lanes: usize) -> HostnameIndexer {
        HostnameIndexer::new(lanes)
    }

    fn processor(&self) -> ClickHouseProcessor {
        ClickHouseProcessor::new(Arc::clone(&self.context))
    }
}

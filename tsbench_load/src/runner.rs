//! Lifecycle of a load benchmark: database setup, the worker pool and the final summary.

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use crate::{
    DynError, Error, Result,
    config::RunnerConfig,
    indexer::PointIndexer,
    link::{WorkerEnd, link},
    point::{Batch, BatchFactory, PointDecoder},
    report::{LoadStats, Reporter},
    scan::Scanner,
};

/// Size of the buffer put in front of the input
const INPUT_BUFFER_SIZE: usize = 4 << 20;

/// Counts produced by processing one batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    /// Individual values written
    pub metrics: u64,
    /// Rows written, `0` when the target does not have a notion of rows
    pub rows: u64,
}

impl BatchStats {
    pub fn new(metrics: u64, rows: u64) -> Self {
        Self { metrics, rows }
    }
}

/// Writes batches to the target database. One instance exists per worker thread.
pub trait Processor: Send + 'static {
    type Batch: Batch;

    /// Called on the worker thread before the first batch
    fn init(&mut self, _worker: usize, _do_load: bool) -> Result<(), DynError> {
        Ok(())
    }

    /// Write one batch. With `do_load` unset only the per batch preparation is done.
    fn process_batch(&mut self, batch: Self::Batch, do_load: bool)
    -> Result<BatchStats, DynError>;

    /// Called on the worker thread once its link is closed and drained
    fn close(&mut self, _do_load: bool) {}
}

/// Prepares the target database before any data is loaded
pub trait DbCreator {
    /// Read whatever preamble the input carries ahead of the first point
    fn init(&mut self, _input: &mut dyn BufRead) -> Result<(), DynError> {
        Ok(())
    }

    fn db_exists(&self, db_name: &str) -> Result<bool, DynError>;

    fn remove_old_db(&self, db_name: &str) -> Result<(), DynError>;

    fn create_db(&self, db_name: &str) -> Result<(), DynError>;

    /// Create tables or anything else that needs the database to exist
    fn post_create_db(&self, _db_name: &str) -> Result<(), DynError> {
        Ok(())
    }
}

/// Everything that is specific to one target database
pub trait Benchmark {
    type Batch: Batch;
    type Decoder: PointDecoder<Point = <Self::Batch as Batch>::Point>;
    type Factory: BatchFactory<Batch = Self::Batch>;
    type Indexer: PointIndexer<<Self::Batch as Batch>::Point>;
    type Processor: Processor<Batch = Self::Batch>;
    type DbCreator: DbCreator;

    fn db_creator(&self) -> Self::DbCreator;

    /// Decoder reading from the input that remains after [`DbCreator::init`]
    fn decoder(&self, input: Box<dyn BufRead + Send>) -> Self::Decoder;

    fn batch_factory(&self) -> Self::Factory;

    /// Indexer spreading points over `lanes` lanes
    fn indexer(&self, lanes: usize) -> Self::Indexer;

    fn processor(&self) -> Self::Processor;
}

/// How workers are attached to links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkQueues {
    /// All workers share one link
    SingleQueue,
    /// Each worker has a link of its own and points are routed to workers by the indexer
    WorkerPerQueue,
}

/// Outcome of a load run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Points read from the input
    pub items_read: u64,
    pub metrics: u64,
    pub rows: u64,
    pub workers: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed.as_secs_f64();
        let rate = |count: u64| if secs > 0.0 { count as f64 / secs } else { 0.0 };
        write!(
            f,
            "loaded {} metrics in {secs:.3}sec with {} workers (mean rate {:.2} metrics/sec)",
            self.metrics,
            self.workers,
            rate(self.metrics)
        )?;
        if self.rows > 0 {
            write!(
                f,
                "\nloaded {} rows in {secs:.3}sec with {} workers (mean rate {:.2} rows/sec)",
                self.rows,
                self.workers,
                rate(self.rows)
            )?;
        }
        Ok(())
    }
}

/// Runs a [`Benchmark`] according to a [`RunnerConfig`]
#[derive(Debug)]
pub struct BenchmarkRunner {
    config: RunnerConfig,
    scanner: Scanner,
}

impl BenchmarkRunner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        if config.workers < 1 {
            return Err(Error::InvalidWorkerCount);
        }
        if config.channel_capacity < 1 {
            return Err(Error::InvalidChannelCapacity);
        }
        let scanner = Scanner::new(config.scan_config())?;
        Ok(Self { config, scanner })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run the benchmark reading from `--file`, or standard input if none is given.
    ///
    /// The summary is printed to standard output as well as returned.
    pub fn run<B: Benchmark>(&self, benchmark: &B) -> Result<RunSummary> {
        let input: Box<dyn BufRead + Send> = match &self.config.file {
            Some(path) => {
                let file = File::open(path).map_err(|source| Error::OpenInput {
                    path: path.clone(),
                    source,
                })?;
                Box::new(BufReader::with_capacity(INPUT_BUFFER_SIZE, file))
            }
            None => Box::new(BufReader::with_capacity(
                INPUT_BUFFER_SIZE,
                std::io::stdin(),
            )),
        };
        let summary = self.run_with_input(benchmark, input)?;
        println!("{summary}");
        Ok(summary)
    }

    /// Run the benchmark against the given input
    pub fn run_with_input<B: Benchmark>(
        &self,
        benchmark: &B,
        mut input: Box<dyn BufRead + Send>,
    ) -> Result<RunSummary> {
        let config = &self.config;

        let mut db_creator = benchmark.db_creator();
        db_creator.init(&mut input).map_err(Error::DbCreator)?;
        if config.do_create_db {
            self.create_db(&db_creator)?;
        }

        let lanes = match config.work_queues() {
            WorkQueues::SingleQueue => 1,
            WorkQueues::WorkerPerQueue => config.workers,
        };
        let mut links = Vec::with_capacity(lanes);
        let mut ends = Vec::with_capacity(lanes);
        for _ in 0..lanes {
            let (link, end) = link(config.channel_capacity)?;
            links.push(link);
            ends.push(end);
        }

        let stats = Arc::new(LoadStats::default());
        let mut workers = Vec::with_capacity(config.workers);
        for worker in 0..config.workers {
            let end = ends[worker % lanes].clone();
            let handle = spawn_worker(
                worker,
                benchmark.processor(),
                end,
                Arc::clone(&stats),
                config.do_load,
            );
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // dropping the links lets the workers already started run to completion
                    drop(links);
                    join_workers(workers);
                    return Err(e);
                }
            }
        }
        // workers hold the only remaining worker ends so that losing one is visible to the scanner
        drop(ends);

        info!(
            workers = config.workers,
            lanes,
            batch_size = config.batch_size,
            "starting load"
        );
        let start = Instant::now();
        let reporter = match config.reporting_period() {
            Some(period) => Some(Reporter::spawn(
                Arc::clone(&stats),
                period,
                std::io::stdout(),
            )?),
            None => None,
        };

        let mut decoder = benchmark.decoder(input);
        let scanned = self.scanner.scan(
            &links,
            &mut decoder,
            &benchmark.batch_factory(),
            &benchmark.indexer(lanes),
        );

        for link in links {
            link.close();
        }
        let worker_failure = join_workers(workers);
        let elapsed = start.elapsed();
        if let Some(reporter) = reporter {
            reporter.stop();
        }

        let items_read = match (scanned, worker_failure) {
            // a dead worker explains a disconnected link better than the link does
            (Err(Error::WorkerDisconnected { .. }), Some(e)) => return Err(e),
            (Err(e), _) => return Err(e),
            (Ok(_), Some(e)) => return Err(e),
            (Ok(items_read), None) => items_read,
        };

        let summary = RunSummary {
            items_read,
            metrics: stats.metrics(),
            rows: stats.rows(),
            workers: config.workers,
            elapsed,
        };
        info!(
            items_read,
            metrics = summary.metrics,
            rows = summary.rows,
            elapsed = ?elapsed,
            "load complete"
        );
        Ok(summary)
    }

    fn create_db<C: DbCreator>(&self, db_creator: &C) -> Result<()> {
        let db_name = &self.config.db_name;
        if db_creator.db_exists(db_name).map_err(Error::DbCreator)? {
            if self.config.do_abort_on_exist {
                return Err(Error::DatabaseExists(db_name.clone()));
            }
            info!(db_name, "dropping existing database");
            db_creator.remove_old_db(db_name).map_err(Error::DbCreator)?;
        }
        db_creator.create_db(db_name).map_err(Error::DbCreator)?;
        db_creator
            .post_create_db(db_name)
            .map_err(Error::DbCreator)?;
        debug!(db_name, "database created");
        Ok(())
    }
}

fn spawn_worker<P: Processor>(
    worker: usize,
    processor: P,
    end: WorkerEnd<P::Batch>,
    stats: Arc<LoadStats>,
    do_load: bool,
) -> Result<JoinHandle<Result<()>>> {
    thread::Builder::new()
        .name(format!("tsbench-worker-{worker}"))
        .spawn(move || work(worker, processor, end, &stats, do_load))
        .map_err(Error::Spawn)
}

/// Worker loop: process every batch received and acknowledge it.
///
/// After the first failure batches are still received and acknowledged but no longer processed,
/// so that the scanner can drain. The failure is returned once the link is closed.
fn work<P: Processor>(
    worker: usize,
    mut processor: P,
    end: WorkerEnd<P::Batch>,
    stats: &LoadStats,
    do_load: bool,
) -> Result<()> {
    let mut failure = processor.init(worker, do_load).err();
    if let Some(e) = &failure {
        error!(worker, %e, "worker initialisation failed, discarding its batches");
    }

    while let Some(batch) = end.recv() {
        if failure.is_none() {
            match processor.process_batch(batch, do_load) {
                Ok(batch_stats) => stats.record(batch_stats.metrics, batch_stats.rows),
                Err(e) => {
                    error!(worker, %e, "batch processing failed, discarding remaining batches");
                    failure = Some(e);
                }
            }
        }
        if end.acknowledge().is_err() {
            warn!(worker, "link closed while a batch was outstanding");
            break;
        }
    }

    processor.close(do_load);
    debug!(worker, "worker finished");
    match failure {
        Some(source) => Err(Error::Processor { worker, source }),
        None => Ok(()),
    }
}

/// Wait for every worker, returning the first failure
fn join_workers(workers: Vec<JoinHandle<Result<()>>>) -> Option<Error> {
    let mut first = None;
    for (worker, handle) in workers.into_iter().enumerate() {
        let res = handle.join().unwrap_or(Err(Error::WorkerPanicked(worker)));
        if let Err(e) = res {
            first.get_or_insert(e);
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::{Mutex, atomic::AtomicUsize, atomic::Ordering},
    };

    use super::*;
    use crate::{DecodeError, HashIndexer};
    use pretty_assertions::assert_eq;

    /// A point is one line of input: `<key> <value>`
    #[derive(Debug, Clone, PartialEq)]
    struct Line {
        key: String,
        value: u64,
    }

    #[derive(Debug, Default)]
    struct Lines(Vec<Line>);

    impl Batch for Lines {
        type Point = Line;

        fn len(&self) -> usize {
            self.0.len()
        }

        fn append(&mut self, point: Line) {
            self.0.push(point);
        }
    }

    struct LineDecoder {
        input: Box<dyn BufRead + Send>,
        line: u64,
    }

    impl PointDecoder for LineDecoder {
        type Point = Line;

        fn decode(&mut self) -> Result<Option<Line>, DecodeError> {
            let mut buf = String::new();
            if self.input.read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let (key, value) = buf
                .trim_end()
                .split_once(' ')
                .ok_or_else(|| DecodeError::malformed(self.line, "missing value"))?;
            let value = value
                .parse()
                .map_err(|_| DecodeError::malformed(self.line, "bad value"))?;
            Ok(Some(Line {
                key: key.to_string(),
                value,
            }))
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct KeyIndexer(HashIndexer);

    impl PointIndexer<Line> for KeyIndexer {
        fn index(&self, point: &Line) -> usize {
            self.0.index_for_key(point.key.as_bytes())
        }
    }

    #[derive(Debug, Default)]
    struct Shared {
        calls: Mutex<Vec<String>>,
        exists: bool,
        /// (worker, key) for every processed point
        seen: Mutex<Vec<(usize, String)>>,
        fail_on_value: Option<u64>,
        closed: AtomicUsize,
    }

    struct TestCreator(Arc<Shared>);

    impl DbCreator for TestCreator {
        fn init(&mut self, input: &mut dyn BufRead) -> Result<(), DynError> {
            let mut header = String::new();
            input.read_line(&mut header)?;
            self.0.calls.lock().unwrap().push(format!("init {}", header.trim()));
            Ok(())
        }

        fn db_exists(&self, db_name: &str) -> Result<bool, DynError> {
            self.0.calls.lock().unwrap().push(format!("exists {db_name}"));
            Ok(self.0.exists)
        }

        fn remove_old_db(&self, db_name: &str) -> Result<(), DynError> {
            self.0.calls.lock().unwrap().push(format!("remove {db_name}"));
            Ok(())
        }

        fn create_db(&self, db_name: &str) -> Result<(), DynError> {
            self.0.calls.lock().unwrap().push(format!("create {db_name}"));
            Ok(())
        }

        fn post_create_db(&self, db_name: &str) -> Result<(), DynError> {
            self.0.calls.lock().unwrap().push(format!("post {db_name}"));
            Ok(())
        }
    }

    struct TestProcessor {
        shared: Arc<Shared>,
        worker: usize,
    }

    impl Processor for TestProcessor {
        type Batch = Lines;

        fn init(&mut self, worker: usize, _do_load: bool) -> Result<(), DynError> {
            self.worker = worker;
            Ok(())
        }

        fn process_batch(&mut self, batch: Lines, do_load: bool) -> Result<BatchStats, DynError> {
            let mut metrics = 0;
            for line in &batch.0 {
                if Some(line.value) == self.shared.fail_on_value {
                    return Err(format!("cannot write {}", line.value).into());
                }
                metrics += line.value;
                if do_load {
                    self.shared
                        .seen
                        .lock()
                        .unwrap()
                        .push((self.worker, line.key.clone()));
                }
            }
            Ok(BatchStats::new(metrics, batch.len() as u64))
        }

        fn close(&mut self, _do_load: bool) {
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestBenchmark(Arc<Shared>);

    impl Benchmark for TestBenchmark {
        type Batch = Lines;
        type Decoder = LineDecoder;
        type Factory = fn() -> Lines;
        type Indexer = KeyIndexer;
        type Processor = TestProcessor;
        type DbCreator = TestCreator;

        fn db_creator(&self) -> TestCreator {
            TestCreator(Arc::clone(&self.0))
        }

        fn decoder(&self, input: Box<dyn BufRead + Send>) -> LineDecoder {
            LineDecoder { input, line: 1 }
        }

        fn batch_factory(&self) -> fn() -> Lines {
            Lines::default
        }

        fn indexer(&self, lanes: usize) -> KeyIndexer {
            KeyIndexer(HashIndexer::new(lanes))
        }

        fn processor(&self) -> TestProcessor {
            TestProcessor {
                shared: Arc::clone(&self.0),
                worker: usize::MAX,
            }
        }
    }

    const INPUT: &str = "header\na 1\nb 2\nc 3\na 4\nb 5\n";

    fn input(data: &str) -> Box<dyn BufRead + Send> {
        Box::new(Cursor::new(data.to_string()))
    }

    fn config() -> RunnerConfig {
        RunnerConfig {
            batch_size: 2,
            workers: 2,
            reporting_period: Duration::ZERO.into(),
            ..Default::default()
        }
    }

    #[test]
    fn loads_everything() {
        let shared = Arc::new(Shared::default());
        let runner = BenchmarkRunner::new(config()).unwrap();
        let summary = runner
            .run_with_input(&TestBenchmark(Arc::clone(&shared)), input(INPUT))
            .unwrap();

        assert_eq!(summary.items_read, 5);
        assert_eq!(summary.metrics, 15);
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.workers, 2);
        assert_eq!(shared.seen.lock().unwrap().len(), 5);
        assert_eq!(shared.closed.load(Ordering::SeqCst), 2);
        assert_eq!(
            *shared.calls.lock().unwrap(),
            [
                "init header",
                "exists benchmark",
                "create benchmark",
                "post benchmark"
            ]
        );
    }

    #[test]
    fn existing_db_is_dropped() {
        let shared = Arc::new(Shared {
            exists: true,
            ..Default::default()
        });
        BenchmarkRunner::new(config())
            .unwrap()
            .run_with_input(&TestBenchmark(Arc::clone(&shared)), input(INPUT))
            .unwrap();
        assert_eq!(
            *shared.calls.lock().unwrap(),
            [
                "init header",
                "exists benchmark",
                "remove benchmark",
                "create benchmark",
                "post benchmark"
            ]
        );
    }

    #[test]
    fn existing_db_aborts() {
        let shared = Arc::new(Shared {
            exists: true,
            ..Default::default()
        });
        let res = BenchmarkRunner::new(RunnerConfig {
            do_abort_on_exist: true,
            ..config()
        })
        .unwrap()
        .run_with_input(&TestBenchmark(Arc::clone(&shared)), input(INPUT));
        assert!(matches!(res, Err(Error::DatabaseExists(name)) if name == "benchmark"));
        assert!(shared.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn skip_db_creation() {
        let shared = Arc::new(Shared::default());
        BenchmarkRunner::new(RunnerConfig {
            do_create_db: false,
            ..config()
        })
        .unwrap()
        .run_with_input(&TestBenchmark(Arc::clone(&shared)), input(INPUT))
        .unwrap();
        assert_eq!(*shared.calls.lock().unwrap(), ["init header"]);
    }

    #[test]
    fn no_load_still_counts() {
        let shared = Arc::new(Shared::default());
        let summary = BenchmarkRunner::new(RunnerConfig {
            do_load: false,
            ..config()
        })
        .unwrap()
        .run_with_input(&TestBenchmark(Arc::clone(&shared)), input(INPUT))
        .unwrap();
        assert_eq!(summary.metrics, 15);
        assert!(shared.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn limit() {
        let shared = Arc::new(Shared::default());
        let summary = BenchmarkRunner::new(RunnerConfig {
            limit: 3,
            ..config()
        })
        .unwrap()
        .run_with_input(&TestBenchmark(Arc::clone(&shared)), input(INPUT))
        .unwrap();
        assert_eq!(summary.items_read, 3);
        assert_eq!(summary.metrics, 6);
    }

    #[test]
    fn hash_workers_keep_keys_on_one_worker() {
        let shared = Arc::new(Shared::default());
        let data = (0..200).fold(String::from("header\n"), |mut acc, i| {
            acc.push_str(&format!("host_{} 1\n", i % 10));
            acc
        });
        let summary = BenchmarkRunner::new(RunnerConfig {
            workers: 3,
            batch_size: 4,
            hash_workers: true,
            ..config()
        })
        .unwrap()
        .run_with_input(&TestBenchmark(Arc::clone(&shared)), input(&data))
        .unwrap();
        assert_eq!(summary.items_read, 200);

        let indexer = HashIndexer::new(3);
        for (worker, key) in shared.seen.lock().unwrap().iter() {
            assert_eq!(*worker, indexer.index_for_key(key.as_bytes()), "{key}");
        }
    }

    #[test]
    fn processor_failure_is_reported_after_drain() {
        let shared = Arc::new(Shared {
            fail_on_value: Some(2),
            ..Default::default()
        });
        let res = BenchmarkRunner::new(RunnerConfig {
            workers: 1,
            batch_size: 1,
            ..config()
        })
        .unwrap()
        .run_with_input(&TestBenchmark(Arc::clone(&shared)), input(INPUT));

        match res {
            Err(Error::Processor { worker, source }) => {
                assert_eq!(worker, 0);
                assert_eq!(source.to_string(), "cannot write 2");
            }
            other => panic!("expected processor error, got {other:?}"),
        }
        // only the batch before the failure was written
        assert_eq!(*shared.seen.lock().unwrap(), [(0, "a".to_string())]);
        assert_eq!(shared.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decode_failure() {
        let shared = Arc::new(Shared::default());
        let res = BenchmarkRunner::new(config())
            .unwrap()
            .run_with_input(&TestBenchmark(shared), input("header\na 1\nb\n"));
        assert!(
            matches!(
                res,
                Err(Error::Decode(DecodeError::Malformed { line: 3, .. }))
            ),
            "{res:?}"
        );
    }

    #[test]
    fn invalid_config() {
        assert!(matches!(
            BenchmarkRunner::new(RunnerConfig {
                workers: 0,
                ..config()
            }),
            Err(Error::InvalidWorkerCount)
        ));
        assert!(matches!(
            BenchmarkRunner::new(RunnerConfig {
                batch_size: 0,
                ..config()
            }),
            Err(Error::InvalidBatchSize)
        ));
        assert!(matches!(
            BenchmarkRunner::new(RunnerConfig {
                channel_capacity: 0,
                ..config()
            }),
            Err(Error::InvalidChannelCapacity)
        ));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.csv");
        let res = BenchmarkRunner::new(RunnerConfig {
            file: Some(path.clone()),
            ..config()
        })
        .unwrap()
        .run(&TestBenchmark(Arc::default()));
        assert!(matches!(res, Err(Error::OpenInput { path: p, .. }) if p == path));
    }

    #[test]
    fn summary_display() {
        let summary = RunSummary {
            items_read: 10,
            metrics: 100,
            rows: 10,
            workers: 2,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(
            summary.to_string(),
            "loaded 100 metrics in 2.000sec with 2 workers (mean rate 50.00 metrics/sec)\n\
             loaded 10 rows in 2.000sec with 2 workers (mean rate 5.00 rows/sec)"
        );

        let summary = RunSummary { rows: 0, ..summary };
        assert_eq!(
            summary.to_string(),
            "loaded 100 metrics in 2.000sec with 2 workers (mean rate 50.00 metrics/sec)"
        );
    }
}

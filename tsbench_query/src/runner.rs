//! Replays a query file with a pool of worker threads.

use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    thread::{self, JoinHandle},
    time::Instant,
};

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, error, info};

use crate::{
    DynError, Error, Result,
    config::QueryRunnerConfig,
    processor::{StatProcessor, StatSender, StatSummary},
    query::{Query, QueryDecoder},
    stats::Stat,
};

const INPUT_BUFFER_SIZE: usize = 4 << 20;

/// Runs queries against the target database. One instance exists per worker thread.
pub trait QueryExecutor: Send + 'static {
    /// Called on the worker thread before the first query
    fn init(&mut self, _worker: usize) -> Result<(), DynError> {
        Ok(())
    }

    /// Run one query to completion, returning the number of rows it produced
    fn execute(&mut self, query: &Query) -> Result<u64, DynError>;
}

#[derive(Debug)]
pub struct QueryRunner {
    config: QueryRunnerConfig,
}

impl QueryRunner {
    pub fn new(config: QueryRunnerConfig) -> Result<Self> {
        if config.workers < 1 {
            return Err(Error::InvalidWorkerCount);
        }
        if config.max_queries > 0 && config.burn_in >= config.max_queries {
            return Err(Error::BurnInTooLarge {
                burn_in: config.burn_in,
                max_queries: config.max_queries,
            });
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &QueryRunnerConfig {
        &self.config
    }

    /// Run the queries of `--file`, or standard input if none is given, printing the final
    /// statistics to standard output and intermediate ones to standard error
    pub fn run<E, F>(&self, make_executor: F) -> Result<StatSummary>
    where
        E: QueryExecutor,
        F: Fn() -> E,
    {
        let input: Box<dyn BufRead> = match &self.config.file {
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

        let start = Instant::now();
        let summary = self.run_with(make_executor, input, std::io::stdout(), std::io::stderr())?;
        println!("wall clock time: {:.6}sec", start.elapsed().as_secs_f64());
        Ok(summary)
    }

    /// Run the queries read from `input`, writing statistics to `out` and `progress`
    pub fn run_with<E, F, R, O, P>(
        &self,
        make_executor: F,
        input: R,
        out: O,
        progress: P,
    ) -> Result<StatSummary>
    where
        E: QueryExecutor,
        F: Fn() -> E,
        R: BufRead,
        O: Write + Send + 'static,
        P: Write + Send + 'static,
    {
        let config = &self.config;
        let processor =
            StatProcessor::spawn(config.stat_config(), config.workers, out, progress)?;

        let (tx, rx) = bounded::<Query>(config.workers);
        let mut workers = Vec::with_capacity(config.workers);
        let mut spawn_error = None;
        for worker in 0..config.workers {
            match spawn_worker(
                worker,
                make_executor(),
                rx.clone(),
                processor.sender(),
                config.prewarm_queries,
            ) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        drop(rx);

        info!(workers = config.workers, "starting queries");
        let sent = match spawn_error {
            Some(e) => Err(e),
            None => {
                let mut sent = 0u64;
                let mut decoder = QueryDecoder::new(input);
                loop {
                    if config.max_queries > 0 && sent == config.max_queries {
                        break Ok(sent);
                    }
                    match decoder.decode() {
                        Ok(Some(query)) => {
                            if tx.send(query).is_err() {
                                // every worker is gone, joining them reports why
                                break Ok(sent);
                            }
                            sent += 1;
                        }
                        Ok(None) => break Ok(sent),
                        Err(e) => break Err(e),
                    }
                }
            }
        };
        drop(tx);

        let worker_failure = join_workers(workers);
        let summary = processor.close_and_wait();

        let sent = sent?;
        if let Some(e) = worker_failure {
            return Err(e);
        }
        let summary = summary?;
        info!(sent, queries = summary.queries, "queries complete");
        Ok(summary)
    }
}

fn spawn_worker<E: QueryExecutor>(
    worker: usize,
    executor: E,
    queries: Receiver<Query>,
    stats: StatSender,
    prewarm: bool,
) -> Result<JoinHandle<Result<()>>> {
    thread::Builder::new()
        .name(format!("tsbench-query-{worker}"))
        .spawn(move || work(worker, executor, queries, stats, prewarm))
        .map_err(Error::Spawn)
}

/// Worker loop: run every query received and send its latency.
///
/// After the first failure queries are still received but no longer run, so that the reader
/// never blocks on a dead pool.
fn work<E: QueryExecutor>(
    worker: usize,
    mut executor: E,
    queries: Receiver<Query>,
    stats: StatSender,
    prewarm: bool,
) -> Result<()> {
    let mut failure = executor.init(worker).err();
    if let Some(e) = &failure {
        error!(worker, %e, "worker initialisation failed, discarding its queries");
    }

    for query in queries {
        if failure.is_some() {
            continue;
        }
        let res = timed(&mut executor, &query).and_then(|cold| {
            stats.send_stats(vec![cold]);
            if prewarm {
                let warm = timed(&mut executor, &query)?;
                stats.send_stats_warm(vec![warm]);
            }
            Ok(())
        });
        if let Err(e) = res {
            error!(worker, %e, label = %query.label, "query failed, discarding remaining queries");
            failure = Some(e);
        }
    }

    debug!(worker, "worker finished");
    match failure {
        Some(source) => Err(Error::Executor { worker, source }),
        None => Ok(()),
    }
}

fn timed<E: QueryExecutor>(executor: &mut E, query: &Query) -> Result<Stat, DynError> {
    let start = Instant::now();
    let rows = executor.execute(query)?;
    let elapsed = start.elapsed();
    debug!(label = %query.label, rows, ?elapsed, "query executed");
    Ok(Stat::new(query.label.clone(), elapsed.as_secs_f64() * 1000.0))
}

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

//! Aggregation of query latencies sent by the workers.

use std::{
    collections::BTreeMap,
    fmt,
    io::Write,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, warn};

use crate::{Error, Result, Stat, StatGroup};

pub const LABEL_ALL_QUERIES: &str = "all queries";
pub const LABEL_COLD_QUERIES: &str = "cold queries";
pub const LABEL_WARM_QUERIES: &str = "warm queries";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatConfig {
    /// Every query is run twice, stats are also grouped by cold and warm execution
    pub prewarm_queries: bool,
    /// Queries expected, `0` when unknown. No intermediate table is printed once it is reached.
    pub limit: u64,
    /// Queries to ignore before aggregating
    pub burn_in: u64,
    /// Print intermediate tables every this many queries, `0` to disable
    pub print_interval: u64,
}

/// Latency groups by label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatSummary {
    /// Queries aggregated, after burn-in
    pub queries: u64,
    pub groups: BTreeMap<String, StatGroup>,
}

impl fmt::Display for StatSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.groups.keys().map(String::len).max().unwrap_or(0);
        for (label, group) in &self.groups {
            writeln!(f, "{label:width$}:")?;
            writeln!(f, "{group}")?;
        }
        Ok(())
    }
}

/// Sending half handed to every query worker
#[derive(Debug, Clone)]
pub struct StatSender(Sender<Stat>);

impl StatSender {
    /// Returns false once the processor is gone
    pub fn send_stats(&self, stats: Vec<Stat>) -> bool {
        stats.into_iter().all(|stat| self.0.send(stat).is_ok())
    }

    /// Send stats of the second, cache warm, execution of a query
    pub fn send_stats_warm(&self, stats: Vec<Stat>) -> bool {
        self.send_stats(stats.into_iter().map(Stat::warm).collect())
    }
}

/// Background thread aggregating [`Stat`]s into [`StatGroup`]s
#[derive(Debug)]
pub struct StatProcessor {
    sender: StatSender,
    handle: JoinHandle<Result<StatSummary>>,
}

impl StatProcessor {
    /// Start aggregating. Intermediate tables go to `progress`, the final table to `out`.
    pub fn spawn<O, P>(config: StatConfig, workers: usize, out: O, progress: P) -> Result<Self>
    where
        O: Write + Send + 'static,
        P: Write + Send + 'static,
    {
        let (tx, rx) = bounded(workers.max(1));
        let handle = thread::Builder::new()
            .name("tsbench-stats".to_string())
            .spawn(move || Aggregator::new(config, workers, progress).run(rx, out))
            .map_err(Error::Spawn)?;
        Ok(Self {
            sender: StatSender(tx),
            handle,
        })
    }

    pub fn sender(&self) -> StatSender {
        self.sender.clone()
    }

    /// Stop accepting stats and wait until every stat sent so far has been aggregated.
    ///
    /// Senders handed out by [`Self::sender`] must have been dropped, otherwise this blocks.
    pub fn close_and_wait(self) -> Result<StatSummary> {
        drop(self.sender);
        self.handle
            .join()
            .unwrap_or(Err(Error::StatProcessorPanicked))
    }
}

struct Aggregator<P> {
    config: StatConfig,
    workers: usize,
    progress: P,
    summary: StatSummary,
    seen: u64,
    last_printed: u64,
    write_error: Option<std::io::Error>,
}

impl<P: Write> Aggregator<P> {
    fn new(config: StatConfig, workers: usize, progress: P) -> Self {
        let mut summary = StatSummary::default();
        summary.groups.insert(LABEL_ALL_QUERIES.to_string(), StatGroup::default());
        if config.prewarm_queries {
            summary.groups.insert(LABEL_COLD_QUERIES.to_string(), StatGroup::default());
            summary.groups.insert(LABEL_WARM_QUERIES.to_string(), StatGroup::default());
        }
        Self {
            config,
            workers,
            progress,
            summary,
            seen: 0,
            last_printed: 0,
            write_error: None,
        }
    }

    fn run<O: Write>(mut self, rx: Receiver<Stat>, mut out: O) -> Result<StatSummary> {
        for stat in rx {
            self.push(stat);
        }

        self.summary.queries = self.seen.saturating_sub(self.config.burn_in);
        let res = write!(
            out,
            "run complete after {} queries with {} workers:\n{}",
            self.summary.queries, self.workers, self.summary
        )
        .and_then(|_| out.flush());
        if let Some(e) = self.write_error.take() {
            return Err(Error::Write(e));
        }
        res.map_err(Error::Write)?;
        debug!(queries = self.summary.queries, "stat processor finished");
        Ok(self.summary)
    }

    fn push(&mut self, stat: Stat) {
        let burn_in = self.config.burn_in;
        let workers = self.workers;
        if self.seen < burn_in {
            self.seen += 1;
            if self.seen == burn_in {
                self.print(format_args!(
                    "burn-in complete after {burn_in} queries with {workers} workers\n"
                ));
            }
            return;
        }

        let groups = &mut self.summary.groups;
        groups.entry(stat.label).or_default().push(stat.value_ms);
        if !stat.is_partial {
            let mut add = |label: &str| {
                groups.entry(label.to_string()).or_default().push(stat.value_ms);
            };
            add(LABEL_ALL_QUERIES);
            if self.config.prewarm_queries {
                add(if stat.is_warm {
                    LABEL_WARM_QUERIES
                } else {
                    LABEL_COLD_QUERIES
                });
            }
            // with prewarming a query counts once, on its cold execution
            if !self.config.prewarm_queries || !stat.is_warm {
                self.seen += 1;
            }
        }

        let interval = self.config.print_interval;
        let limit = self.config.limit;
        if interval > 0
            && self.seen > self.last_printed
            && self.seen % interval == 0
            && (limit == 0 || self.seen < limit)
        {
            self.last_printed = self.seen;
            let table = self.summary.to_string();
            let queries = self.seen - burn_in;
            self.print(format_args!(
                "after {queries} queries with {workers} workers:\n{table}\n"
            ));
        }
    }

    fn print(&mut self, args: fmt::Arguments<'_>) {
        if self.write_error.is_some() {
            return;
        }
        if let Err(e) = self.progress.write_fmt(args) {
            warn!(%e, "could not write intermediate statistics");
            self.write_error = Some(e);
        }
    }
}

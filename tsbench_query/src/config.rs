use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::processor::StatConfig;

/// Settings for a query run that do not depend on the target database
#[derive(Debug, Clone, Parser)]
pub struct QueryRunnerConfig {
    /// Name of the database to query
    #[clap(long = "db-name", env = "TSBENCH_DB_NAME", default_value = "benchmark")]
    pub db_name: String,

    /// Number of concurrent requests to make
    #[clap(long = "workers", env = "TSBENCH_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Limit the number of queries to send, `0` sends every query in the file
    #[clap(long = "max-queries", env = "TSBENCH_MAX_QUERIES", default_value_t = 0)]
    pub max_queries: u64,

    /// Number of queries to ignore before collecting statistics
    #[clap(long = "burn-in", env = "TSBENCH_BURN_IN", default_value_t = 0)]
    pub burn_in: u64,

    /// Print intermediate statistics every this many queries, `0` disables them
    #[clap(
        long = "print-interval",
        env = "TSBENCH_PRINT_INTERVAL",
        default_value_t = 100
    )]
    pub print_interval: u64,

    /// Run each query twice in a row so the warm query is guaranteed a cache hit
    #[clap(
        long = "prewarm-queries",
        env = "TSBENCH_PREWARM_QUERIES",
        action = ArgAction::Set,
        default_value_t = false
    )]
    pub prewarm_queries: bool,

    /// File to read the queries from, standard input when absent
    #[clap(long = "file", env = "TSBENCH_FILE")]
    pub file: Option<PathBuf>,
}

impl QueryRunnerConfig {
    pub fn stat_config(&self) -> StatConfig {
        StatConfig {
            prewarm_queries: self.prewarm_queries,
            limit: self.max_queries,
            burn_in: self.burn_in,
            print_interval: self.print_interval,
        }
    }
}

impl Default for QueryRunnerConfig {
    fn default() -> Self {
        Self {
            db_name: "benchmark".to_string(),
            workers: 1,
            max_queries: 0,
            burn_in: 0,
            print_interval: 100,
            prewarm_queries: false,
            file: None,
        }
    }
}

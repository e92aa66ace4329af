//! Command line configuration shared by every load benchmark.

use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Parser};

use crate::{runner::WorkQueues, scan::ScanConfig};

/// Settings for a load run that do not depend on the target database
#[derive(Debug, Clone, Parser)]
pub struct RunnerConfig {
    /// Name of the database to create and load data into
    #[clap(long = "db-name", env = "TSBENCH_DB_NAME", default_value = "benchmark")]
    pub db_name: String,

    /// Number of items to batch together in a single insert
    #[clap(
        long = "batch-size",
        env = "TSBENCH_BATCH_SIZE",
        default_value_t = 10_000
    )]
    pub batch_size: usize,

    /// Number of parallel workers doing inserts
    #[clap(long = "workers", env = "TSBENCH_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Number of items to insert, `0` inserts everything
    #[clap(long = "limit", env = "TSBENCH_LIMIT", default_value_t = 0)]
    pub limit: u64,

    /// Whether to write data. Set this to `false` to measure input decoding speed
    #[clap(
        long = "do-load",
        env = "TSBENCH_DO_LOAD",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub do_load: bool,

    /// Whether to create the database. Disable on all but one client if running on a multi
    /// client setup
    #[clap(
        long = "do-create-db",
        env = "TSBENCH_DO_CREATE_DB",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub do_create_db: bool,

    /// Abort instead of dropping the database if it already exists
    #[clap(
        long = "do-abort-on-exist",
        env = "TSBENCH_DO_ABORT_ON_EXIST",
        action = ArgAction::Set,
        default_value_t = false
    )]
    pub do_abort_on_exist: bool,

    /// Period at which to print load rates, `0s` disables the report
    #[clap(
        long = "reporting-period",
        env = "TSBENCH_REPORTING_PERIOD",
        default_value = "10s"
    )]
    pub reporting_period: humantime::Duration,

    /// File to read the data from, standard input when absent
    #[clap(long = "file", env = "TSBENCH_FILE")]
    pub file: Option<PathBuf>,

    /// Give every worker its own queue, routing items by hashing their series key
    #[clap(
        long = "hash-workers",
        env = "TSBENCH_HASH_WORKERS",
        action = ArgAction::Set,
        default_value_t = false
    )]
    pub hash_workers: bool,

    /// Number of batches each queue holds before the scanner has to wait for a worker
    #[clap(
        long = "channel-capacity",
        env = "TSBENCH_CHANNEL_CAPACITY",
        default_value_t = 5
    )]
    pub channel_capacity: usize,
}

impl RunnerConfig {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig::new(self.batch_size).with_limit(self.limit)
    }

    pub fn work_queues(&self) -> WorkQueues {
        if self.hash_workers {
            WorkQueues::WorkerPerQueue
        } else {
            WorkQueues::SingleQueue
        }
    }

    /// Reporting period, `None` if periodic reporting is disabled
    pub fn reporting_period(&self) -> Option<Duration> {
        let period: Duration = self.reporting_period.into();
        (!period.is_zero()).then_some(period)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            db_name: "benchmark".to_string(),
            batch_size: 10_000,
            workers: 1,
            limit: 0,
            do_load: true,
            do_create_db: true,
            do_abort_on_exist: false,
            reporting_period: Duration::from_secs(10).into(),
            file: None,
            hash_workers: false,
            channel_capacity: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_default_impl() {
        let parsed = RunnerConfig::try_parse_from(["load"]).unwrap();
        let default = RunnerConfig::default();
        assert_eq!(parsed.db_name, default.db_name);
        assert_eq!(parsed.batch_size, default.batch_size);
        assert_eq!(parsed.workers, default.workers);
        assert_eq!(parsed.limit, default.limit);
        assert!(parsed.do_load);
        assert!(parsed.do_create_db);
        assert!(!parsed.do_abort_on_exist);
        assert_eq!(parsed.reporting_period(), Some(Duration::from_secs(10)));
        assert!(parsed.file.is_none());
        assert_eq!(parsed.work_queues(), WorkQueues::SingleQueue);
        assert_eq!(parsed.channel_capacity, 5);
    }

    #[test]
    fn flags() {
        let config = RunnerConfig::try_parse_from([
            "load",
            "--db-name",
            "cpu",
            "--batch-size",
            "3",
            "--workers",
            "4",
            "--limit",
            "100",
            "--do-load",
            "false",
            "--reporting-period",
            "0s",
            "--file",
            "/tmp/data.csv",
            "--hash-workers",
            "true",
        ])
        .unwrap();

        assert_eq!(config.db_name, "cpu");
        assert!(!config.do_load);
        assert_eq!(config.reporting_period(), None);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/data.csv")));
        assert_eq!(config.work_queues(), WorkQueues::WorkerPerQueue);

        let scan = config.scan_config();
        assert_eq!(scan.batch_size, 3);
        assert_eq!(scan.limit, 100);
        assert_eq!(scan.outstanding_limit, None);
    }

    #[test]
    fn bad_duration() {
        let err = RunnerConfig::try_parse_from(["load", "--reporting-period", "soon"]).unwrap_err();
        assert!(err.to_string().contains("--reporting-period"), "{err}");
    }
}

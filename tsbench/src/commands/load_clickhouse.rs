use anyhow::Context;
use clap::Parser;
use tokio::runtime::Handle;
use tracing::info;
use tsbench_clickhouse::{ClickHouseBenchmark, ClickHouseConfig};
use tsbench_load::{BenchmarkRunner, RunnerConfig};
use tsbench_logging::LoggingConfig;

#[derive(Debug, Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    runner_config: RunnerConfig,

    #[clap(flatten)]
    clickhouse_config: ClickHouseConfig,

    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,
}

pub(crate) fn command(config: Config, runtime: &Handle) -> anyhow::Result<()> {
    let Config {
        runner_config,
        clickhouse_config,
        ..
    } = config;

    info!(
        connect = %clickhouse_config.connect_string(&runner_config.db_name),
        url = %clickhouse_config.url,
        "loading into clickhouse"
    );
    let benchmark = ClickHouseBenchmark::new(
        clickhouse_config,
        runner_config.db_name.clone(),
        runner_config.hash_workers,
        runtime.clone(),
    );
    let runner = BenchmarkRunner::new(runner_config).context("invalid load configuration")?;
    runner.run(&benchmark)?;
    Ok(())
}

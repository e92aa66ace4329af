use anyhow::Context;
use clap::{ArgAction, Parser};
use tokio::runtime::Handle;
use tracing::info;
use tsbench_clickhouse::{ClickHouseConfig, ClickHouseQueryExecutor};
use tsbench_logging::LoggingConfig;
use tsbench_query::{QueryRunner, QueryRunnerConfig};

#[derive(Debug, Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    runner_config: QueryRunnerConfig,

    #[clap(flatten)]
    clickhouse_config: ClickHouseConfig,

    /// Print every query response
    #[clap(
        long = "print-responses",
        env = "TSBENCH_PRINT_RESPONSES",
        action = ArgAction::Set,
        default_value_t = false
    )]
    print_responses: bool,

    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,
}

pub(crate) fn command(config: Config, runtime: &Handle) -> anyhow::Result<()> {
    let client = config
        .clickhouse_config
        .client(Some(&config.runner_config.db_name))
        .context("configuring the clickhouse client")?;
    info!(
        url = %config.clickhouse_config.url,
        db_name = %config.runner_config.db_name,
        workers = config.runner_config.workers,
        "running queries"
    );

    let print_responses = config.print_responses;
    let runner = QueryRunner::new(config.runner_config).context("invalid query configuration")?;
    runner.run(|| {
        ClickHouseQueryExecutor::new(client.clone(), runtime.clone())
            .with_print_responses(print_responses)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        config: Config,
    }

    #[test]
    fn parses_query_flags() {
        let cli = Cli::try_parse_from([
            "run-queries-clickhouse",
            "--workers",
            "8",
            "--max-queries",
            "100",
            "--burn-in",
            "10",
            "--prewarm-queries",
            "true",
            "--print-responses",
            "true",
            "--user",
            "bench",
        ])
        .unwrap();
        let config = cli.config;
        assert_eq!(config.runner_config.workers, 8);
        assert_eq!(config.runner_config.stat_config().burn_in, 10);
        assert!(config.runner_config.prewarm_queries);
        assert!(config.print_responses);
        assert_eq!(config.clickhouse_config.user, "bench");
    }
}

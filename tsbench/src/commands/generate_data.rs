use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};
use tracing::info;
use tsbench_data::{DataSpec, Format, Interleave, Simulator, SimulatorConfig, UseCase};
use tsbench_logging::LoggingConfig;

const OUTPUT_BUFFER_SIZE: usize = 4 << 20;

#[derive(Debug, Parser)]
pub(crate) struct Config {
    /// Output format, one of influx, clickhouse, timescaledb
    #[clap(long = "format", env = "TSBENCH_FORMAT", default_value = "influx")]
    format: Format,

    /// Measurements to generate, one of devops, cpu-only, cpu-single
    #[clap(long = "use-case", env = "TSBENCH_USE_CASE", default_value = "devops")]
    use_case: UseCase,

    /// JSON measurement specification replacing the use case
    #[clap(long = "spec-path", env = "TSBENCH_SPEC_PATH")]
    spec_path: Option<PathBuf>,

    /// Print the measurement specification as JSON and exit
    #[clap(long = "print-spec", action = ArgAction::SetTrue)]
    print_spec: bool,

    /// Number of hosts reporting by the end of the time range
    #[clap(long = "scale", env = "TSBENCH_SCALE", default_value_t = 1)]
    scale: u64,

    /// Number of hosts reporting at the start of the time range, `0` starts with all of them
    #[clap(long = "initial-scale", env = "TSBENCH_INITIAL_SCALE", default_value_t = 0)]
    initial_scale: u64,

    /// Beginning of the time range, RFC3339
    #[clap(
        long = "timestamp-start",
        env = "TSBENCH_TIMESTAMP_START",
        default_value = "2016-01-01T00:00:00Z"
    )]
    timestamp_start: DateTime<Utc>,

    /// End of the time range, RFC3339
    #[clap(
        long = "timestamp-end",
        env = "TSBENCH_TIMESTAMP_END",
        default_value = "2016-01-02T06:00:00Z"
    )]
    timestamp_end: DateTime<Utc>,

    /// Time between two points of the same host and measurement
    #[clap(long = "log-interval", env = "TSBENCH_LOG_INTERVAL", default_value = "10s")]
    log_interval: humantime::Duration,

    /// Seed of the generator, `0` seeds from the current time
    #[clap(long = "seed", env = "TSBENCH_SEED", default_value_t = 0)]
    seed: u64,

    /// Number of points to generate, `0` generates the whole time range
    #[clap(long = "limit", env = "TSBENCH_LIMIT", default_value_t = 0)]
    limit: u64,

    /// Which of the interleaved groups this process writes
    #[clap(
        long = "interleaved-generation-group-id",
        env = "TSBENCH_INTERLEAVED_GENERATION_GROUP_ID",
        default_value_t = 0
    )]
    interleaved_group_id: u32,

    /// Number of processes splitting the output between them
    #[clap(
        long = "interleaved-generation-groups",
        env = "TSBENCH_INTERLEAVED_GENERATION_GROUPS",
        default_value_t = 1
    )]
    interleaved_groups: u32,

    /// File to write to, standard output when absent
    #[clap(long = "file", env = "TSBENCH_FILE")]
    file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,
}

impl Config {
    fn data_spec(&self) -> anyhow::Result<DataSpec> {
        match &self.spec_path {
            Some(path) => DataSpec::from_path(path).context("loading the measurement spec"),
            None => Ok(self.use_case.spec()),
        }
    }

    fn simulator_config(&self) -> SimulatorConfig {
        let seed = match self.seed {
            0 => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(1),
            seed => seed,
        };
        SimulatorConfig {
            start: self.timestamp_start,
            end: self.timestamp_end,
            log_interval: self.log_interval.into(),
            initial_scale: match self.initial_scale {
                0 => self.scale,
                initial => initial,
            },
            scale: self.scale,
            limit: self.limit,
            seed,
        }
    }
}

pub(crate) fn command(config: Config) -> anyhow::Result<()> {
    let spec = config.data_spec()?;
    if config.print_spec {
        println!("{}", spec.to_json_string_pretty()?);
        return Ok(());
    }

    let interleave = Interleave::new(config.interleaved_group_id, config.interleaved_groups)?;
    let simulator_config = config.simulator_config();
    info!(seed = simulator_config.seed, format = %config.format, "generating data");
    let simulator = Simulator::new(spec, simulator_config).context("configuring the simulator")?;

    let out: Box<dyn Write> = match &config.file {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let out = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, out);

    let summary = tsbench_data::generate(simulator, config.format, interleave, out)
        .context("writing data")?;
    info!(
        points = summary.points_written,
        bytes = summary.bytes_written,
        "generation complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        config: Config,
    }

    fn parse(args: &[&str]) -> Config {
        Cli::try_parse_from(std::iter::once("generate-data").chain(args.iter().copied()))
            .unwrap()
            .config
    }

    #[test]
    fn defaults() {
        let config = parse(&["--seed", "7", "--scale", "10"]);
        assert_eq!(config.format, Format::Influx);
        assert_eq!(config.use_case, UseCase::Devops);

        let sim = config.simulator_config();
        assert_eq!(sim.seed, 7);
        assert_eq!(sim.initial_scale, 10);
        assert_eq!(sim.start.to_rfc3339(), "2016-01-01T00:00:00+00:00");
        assert_eq!(sim.end.to_rfc3339(), "2016-01-02T06:00:00+00:00");
        assert_eq!(sim.log_interval, std::time::Duration::from_secs(10));
    }

    #[test]
    fn writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let config = parse(&[
            "--format",
            "clickhouse",
            "--use-case",
            "cpu-only",
            "--seed",
            "1",
            "--limit",
            "3",
            "--file",
            path.to_str().unwrap(),
        ]);
        command(config).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert!(lines.next().unwrap().starts_with("tags,hostname,region"));
        assert!(lines.next().unwrap().starts_with("cpu,usage_user"));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.filter(|l| l.starts_with("cpu,")).count(), 3);
    }

    #[test]
    fn rejects_bad_interleaving() {
        let config = parse(&[
            "--interleaved-generation-group-id",
            "2",
            "--interleaved-generation-groups",
            "2",
        ]);
        assert!(command(config).is_err());
    }
}

//! Entrypoint of the tsbench binary

use dotenvy::dotenv;
use tsbench_logging::{Builder, LoggingConfig, cli::LoggingConfigBuilderExt};

mod commands {
    pub(crate) mod generate_data;
    pub(crate) mod load_clickhouse;
    pub(crate) mod run_queries;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "tsbench",
    version,
    about = "Time series database benchmark suite",
    long_about = r#"Time series database benchmark suite

Examples:
    # Generate a day of devops data for 100 hosts in the ClickHouse input format
    tsbench generate-data --format clickhouse --use-case devops --scale 100 --file data.csv

    # Load it with 4 workers, routing each host to a fixed worker
    tsbench load-clickhouse --file data.csv --workers 4 --hash-workers true

    # Replay a query file and print latency statistics
    tsbench run-queries-clickhouse --file queries.txt --workers 8 --prewarm-queries true
"#
)]
struct Config {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
#[allow(clippy::large_enum_variant)]
enum Command {
    /// Generate synthetic time series for one of the loaders
    GenerateData(commands::generate_data::Config),

    /// Load generated data into ClickHouse
    LoadClickhouse(commands::load_clickhouse::Config),

    /// Replay a query file against ClickHouse and report latencies
    RunQueriesClickhouse(commands::run_queries::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    // The loaders block on this runtime from their own worker threads, so the commands
    // themselves run outside of it.
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tsbench-io")
        .build()?;

    match config.command {
        None => println!("command required, --help for help"),
        Some(Command::GenerateData(config)) => {
            init_logs(&config.logging_config);
            if let Err(e) = commands::generate_data::command(config) {
                eprintln!("Generate data command failed: {e:#}");
                std::process::exit(ReturnCode::Failure as _)
            }
        }
        Some(Command::LoadClickhouse(config)) => {
            init_logs(&config.logging_config);
            if let Err(e) = commands::load_clickhouse::command(config, tokio_runtime.handle()) {
                eprintln!("Load ClickHouse command failed: {e:#}");
                std::process::exit(ReturnCode::Failure as _)
            }
        }
        Some(Command::RunQueriesClickhouse(config)) => {
            init_logs(&config.logging_config);
            if let Err(e) = commands::run_queries::command(config, tokio_runtime.handle()) {
                eprintln!("Run queries command failed: {e:#}");
                std::process::exit(ReturnCode::Failure as _)
            }
        }
    }

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is fine, defaults apply
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}

fn init_logs(config: &LoggingConfig) {
    let installed = Builder::new()
        .with_default_log_filter("info")
        .with_logging_config(config)
        .install_global();
    if let Err(e) = installed {
        eprintln!("Initializing logs failed: {e}");
        std::process::exit(ReturnCode::Failure as _);
    }
}

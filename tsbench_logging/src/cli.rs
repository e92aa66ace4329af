//! Common CLI flags for logging
use clap::{ArgAction, Parser};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::{Builder, Result, config::*};

/// CLI config for the logging related subset of options.
#[derive(Debug, Parser, Clone)]
pub struct LoggingConfig {
    /// Logs: filter directive
    ///
    /// Configures log severity level filter, by target.
    ///
    /// Simplest options: error, warn, info, debug, trace
    ///
    /// Levels for different modules can be specified. For example
    /// `debug,tsbench_load::scan=info` specifies debug logging for all modules
    /// except for the `tsbench_load::scan` module which will only display info
    /// level logging.
    ///
    /// Overridden by `-v`.
    #[clap(long = "log-filter", env = "LOG_FILTER")]
    pub log_filter: Option<String>,

    /// Logs: filter short-hand
    ///
    /// Convenient way to set log severity level filter.
    /// Overrides `--log-filter`.
    ///
    /// -v   'info'
    ///
    /// -vv  'debug,hyper::proto::h1=info,h2=info'
    ///
    /// -vvv 'trace,hyper::proto::h1=info,h2=info'
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub log_verbose_count: u8,

    /// Logs: destination
    ///
    /// Can be one of: stdout, stderr. Defaults to stderr so that data written to standard output
    /// stays clean.
    #[clap(
        long = "log-destination",
        env = "LOG_DESTINATION",
        default_value = "stderr",
        verbatim_doc_comment
    )]
    pub log_destination: LogDestination,

    #[rustfmt::skip]
    /// Logs: message format
    ///
    /// Can be one of:
    ///
    /// full: human-readable, single line
    ///
    ///   2024-05-02T10:11:12.815Z  INFO tsbench_load::runner: load complete items_read=1000
    ///
    /// pretty: human-readable, multi line
    ///
    ///   2024-05-02T10:11:12.815Z  INFO tsbench_load::runner: load complete, items_read: 1000
    ///     at tsbench_load/src/runner.rs:270 on main
    ///
    /// json: machine-parseable
    ///
    ///   {"timestamp":"2024-05-02T10:11:12.815Z","level":"INFO","fields":{"message":"load complete","items_read":1000},"target":"tsbench_load::runner"}
    #[clap(long = "log-format", env = "LOG_FORMAT", default_value = "full", verbatim_doc_comment)]
    pub log_format: LogFormat,
}

impl LoggingConfig {
    pub fn to_builder(&self) -> Builder<BoxMakeWriter> {
        self.with_builder(Builder::new())
    }

    pub fn with_builder<W>(&self, builder: Builder<W>) -> Builder<BoxMakeWriter> {
        builder
            .with_log_filter(&self.log_filter)
            // -v overrides --log-filter, so it has to come second
            .with_log_verbose_count(self.log_verbose_count)
            .with_log_destination(self.log_destination)
            .with_log_format(self.log_format)
    }

    pub fn install_global_subscriber(&self) -> Result<()> {
        self.to_builder().install_global()
    }
}

/// Extends the [`Builder`] API.
pub trait LoggingConfigBuilderExt {
    /// Applies all config entries from a [`LoggingConfig`] to a [`Builder`].
    fn with_logging_config(self, config: &LoggingConfig) -> Builder<BoxMakeWriter>;
}

impl<W> LoggingConfigBuilderExt for Builder<W> {
    fn with_logging_config(self, config: &LoggingConfig) -> Builder<BoxMakeWriter> {
        config.with_builder(self)
    }
}

impl From<LoggingConfig> for Builder<BoxMakeWriter> {
    fn from(config: LoggingConfig) -> Self {
        config.to_builder()
    }
}

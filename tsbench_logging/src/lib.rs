//! Log initialization and setup

pub mod cli;
pub mod config;

pub use cli::LoggingConfig;
pub use config::*;

use std::{
    cmp::min,
    io::{self, Write},
};

use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, writer::BoxMakeWriter},
    layer::{Layered, SubscriberExt},
};

/// Maximum length of a log line.
/// Space for a final trailing newline if truncated.
///
/// Log collectors commonly chunk lines at 16KB and not all of them recombine the chunks, so lines
/// are truncated right below that and stay newline terminated if they were before.
const MAX_LINE_LENGTH: usize = 16 * 1024 - 1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid log filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("cannot set global tracing subscriber")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The subscriber stack that the formatting layer sits on
type Filtered = Layered<EnvFilter, Registry>;

/// Builder for the logging subscriber.
///
/// Filters are kept as strings and only parsed by [`build`](Self::build), so that an invalid
/// filter surfaces as an error there.
#[derive(Debug)]
pub struct Builder<W = BoxMakeWriter> {
    log_format: LogFormat,
    log_filter: Option<String>,
    // used when log_filter is none.
    default_log_filter: String,
    make_writer: W,
    with_target: bool,
    with_ansi: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Full,
            log_filter: None,
            default_log_filter: Self::DEFAULT_LOG_FILTER.to_string(),
            make_writer: make_writer(io::stderr),
            with_target: true,
            with_ansi: true,
        }
    }
}

impl Builder {
    pub const DEFAULT_LOG_FILTER: &'static str = "warn";

    pub fn new() -> Self {
        Self::default()
    }
}

impl<W> Builder<W> {
    pub fn with_writer<W2>(self, make_writer: W2) -> Builder<W2>
    where
        W2: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
    {
        Builder::<W2> {
            make_writer,
            // cannot use `..self` because W type parameter changes
            log_format: self.log_format,
            log_filter: self.log_filter,
            default_log_filter: self.default_log_filter,
            with_target: self.with_target,
            with_ansi: self.with_ansi,
        }
    }

    /// Set log_filter using a simple numeric "verbosity level".
    ///
    /// 0 means, keep existing `log_filter` value.
    pub fn with_log_verbose_count(self, log_verbose_count: u8) -> Self {
        let log_filter = match log_verbose_count {
            0 => self.log_filter,
            1 => Some("info".to_string()),
            2 => Some("debug,hyper::proto::h1=info,h2=info".to_string()),
            _ => Some("trace,hyper::proto::h1=info,h2=info".to_string()),
        };
        Self { log_filter, ..self }
    }

    pub fn with_log_filter(self, log_filter: &Option<String>) -> Self {
        Self {
            log_filter: log_filter.clone(),
            ..self
        }
    }

    pub fn with_default_log_filter(self, default_log_filter: impl Into<String>) -> Self {
        Self {
            default_log_filter: default_log_filter.into(),
            ..self
        }
    }

    pub fn with_log_format(self, log_format: LogFormat) -> Self {
        Self { log_format, ..self }
    }

    /// Write to standard output or standard error, one line at a time.
    ///
    /// Lines are capped at 16KB so that a whole line reaches the underlying writer in a single
    /// call and threads do not interleave partial lines.
    pub fn with_log_destination(self, log_destination: LogDestination) -> Builder<BoxMakeWriter> {
        let make_writer = match log_destination {
            LogDestination::Stdout => make_writer(io::stdout),
            LogDestination::Stderr => make_writer(io::stderr),
        };
        self.with_writer(make_writer)
    }

    /// Sets whether or not an event's target and location are displayed.
    ///
    /// Defaults to true. See [tracing_subscriber::fmt::Layer::with_target]
    pub fn with_target(self, with_target: bool) -> Self {
        Self {
            with_target,
            ..self
        }
    }

    /// Enable/disable ANSI encoding for formatted events (i.e. colors).
    ///
    /// Defaults to true. See [tracing_subscriber::fmt::Layer::with_ansi]
    pub fn with_ansi(self, with_ansi: bool) -> Self {
        Self { with_ansi, ..self }
    }
}

impl<W> Builder<W>
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    pub fn build(self) -> Result<impl Subscriber + Send + Sync> {
        let filter = self.log_filter.unwrap_or(self.default_log_filter);
        let log_filter = EnvFilter::try_new(&filter)
            .map_err(|source| Error::InvalidFilter { filter, source })?;

        let writer = self.make_writer;
        let with_target = self.with_target;
        let with_ansi = self.with_ansi;

        let log_layer: Box<dyn Layer<Filtered> + Send + Sync> = match self.log_format {
            LogFormat::Full => Box::new(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(with_target)
                    .with_ansi(with_ansi),
            ),
            LogFormat::Pretty => Box::new(
                fmt::layer()
                    .pretty()
                    .with_writer(writer)
                    .with_target(with_target)
                    .with_ansi(with_ansi),
            ),
            LogFormat::Json => Box::new(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(with_target)
                    .with_ansi(false),
            ),
        };

        // the filter is global so that field values of disabled events are never evaluated
        Ok(Registry::default().with(log_filter).with(log_layer))
    }

    /// Build a subscriber and install it as the global default for all threads.
    pub fn install_global(self) -> Result<()> {
        let subscriber = self.build()?;
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(())
    }
}

/// Wrap writers made by `f` in a line buffered, length limited writer
pub fn make_writer<F, W>(f: F) -> BoxMakeWriter
where
    F: Fn() -> W + Send + Sync + 'static,
    W: Write + 'static,
{
    BoxMakeWriter::new(move || {
        io::LineWriter::with_capacity(MAX_LINE_LENGTH, LimitedWriter(MAX_LINE_LENGTH, f()))
    })
}

struct LimitedWriter<W: Write>(usize, W);

impl<W: Write> Write for LimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let truncated = &buf[..min(self.0, buf.len())];
        let had_trailing_newline = buf[buf.len() - 1] == b'\n';
        if had_trailing_newline && (truncated[truncated.len() - 1] != b'\n') {
            // still a single write to the underlying writer
            let mut tmp = truncated.to_vec();
            tmp.push(b'\n');
            self.1.write_all(&tmp).map(|_| buf.len())
        } else {
            self.1.write_all(truncated).map(|_| buf.len())
        }
        // a garbled line from an interrupted write beats a silently dropped one
    }

    fn flush(&mut self) -> io::Result<()> {
        self.1.flush()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    //! Utilities for testing logging.
    use super::*;

    use std::sync::{Arc, Mutex};
    use tracing::{debug, error, info, trace, warn};

    /// Log writer capturing output in a shared buffer
    #[derive(Default, Debug, Clone)]
    pub(crate) struct TestWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl TestWriter {
        /// Return a writer and reference to the to-be captured output.
        pub(crate) fn new() -> (Self, Captured) {
            let writer = Self::default();
            let captured = Captured(Arc::clone(&writer.buffer));
            (writer, captured)
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    pub(crate) struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        /// Strips the leading timestamp (and level padding) from every line
        pub(crate) fn without_timestamps(&self) -> String {
            let timestamp =
                regex::Regex::new(r"(?m)^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+Z\s+").unwrap();
            timestamp.replace_all(&self.to_string(), "").to_string()
        }
    }

    impl std::fmt::Display for Captured {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let bytes = self.0.lock().unwrap();
            write!(f, "{}", std::str::from_utf8(&bytes).unwrap())
        }
    }

    /// Run `f` under a subscriber built from `builder` with test friendly settings and return
    /// everything it logged
    pub(crate) fn log_test<W, F>(builder: Builder<W>, f: F) -> Captured
    where
        W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
        F: Fn(),
    {
        let (writer, output) = TestWriter::new();
        let subscriber = builder
            .with_writer(make_writer(move || writer.clone()))
            .with_target(false)
            .with_ansi(false)
            .build()
            .expect("subscriber");

        tracing::subscriber::with_default(subscriber, f);

        output
    }

    /// Emit one event per level and return what got through
    pub(crate) fn simple_test<W>(builder: Builder<W>) -> Captured
    where
        W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
    {
        log_test(builder, || {
            error!("foo");
            warn!("woo");
            info!("bar");
            debug!("baz");
            trace!("trax");
        })
    }
}

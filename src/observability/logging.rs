//! Structured logging.
//!
//! # Responsibilities
//! - Build the JSON record encoder shared by production and tests
//! - Open the log sink (rolling file or stdout) behind a non-blocking writer
//! - Install the global logger once, then swap level or sink in place
//!
//! # Design Decisions
//! - Uses the tracing crate; `tracing::info!` and friends are the emit API
//! - Sink writes go through `tracing_appender::non_blocking`, which drops
//!   records rather than stall a request when the sink falls behind
//! - Level and sink sit behind `reload` layers so a configured logger can be
//!   replaced without reinstalling the global subscriber

use std::io;
use std::path::Path;
use std::sync::{Mutex, OnceLock, PoisonError};

use thiserror::Error;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, Layer, Registry};

use crate::config::LogConfig;

type SinkLayer = Box<dyn Layer<Registry> + Send + Sync>;
type SinkHandle = reload::Handle<SinkLayer, Registry>;
type LevelHandle = reload::Handle<LevelFilter, Layered<reload::Layer<SinkLayer, Registry>, Registry>>;

static LOGGER: OnceLock<StructuredLogger> = OnceLock::new();

/// Error type for logger setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log level {0:?}")]
    UnknownLevel(String),

    #[error("invalid log file path {0:?}")]
    BadPath(String),

    #[error("failed to open log sink: {0}")]
    Sink(#[from] InitError),

    #[error("failed to install logger: {0}")]
    Install(String),

    #[error("failed to swap logger: {0}")]
    Reload(#[from] reload::Error),
}

/// Parse a configured level name.
///
/// Accepts the usual tracing names plus `warning`, and maps the severities
/// above error (`dpanic`, `panic`, `fatal`) to error. Empty means info.
pub fn parse_level(name: &str) -> Result<LevelFilter, LoggingError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "" | "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "dpanic" | "panic" | "fatal" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(LoggingError::UnknownLevel(name.to_string())),
    }
}

/// Destination for encoded records.
pub enum LogSink {
    Stdout,
    /// Daily-rotated file keeping a bounded number of old files.
    File(RollingFileAppender),
    Writer(Box<dyn io::Write + Send>),
}

impl LogSink {
    /// Open the sink described by the `[log]` section.
    ///
    /// `filename` is split into directory, prefix and extension; rotated files
    /// are named `<stem>.<date>.<ext>`. `max_backups` bounds how many are
    /// kept. `max_size` and `max_age` are carried in the config but rotation
    /// here is by day only.
    pub fn from_config(config: &LogConfig) -> Result<Self, LoggingError> {
        if config.stdout {
            return Ok(LogSink::Stdout);
        }

        let path = Path::new(&config.filename);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LoggingError::BadPath(config.filename.clone()))?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut builder = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(stem)
            .max_log_files(config.max_backups.max(1));
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            builder = builder.filename_suffix(ext);
        }

        Ok(LogSink::File(builder.build(dir)?))
    }

    fn into_writer(self) -> Box<dyn io::Write + Send> {
        match self {
            LogSink::Stdout => Box::new(io::stdout()),
            LogSink::File(appender) => Box::new(appender),
            LogSink::Writer(w) => w,
        }
    }
}

/// JSON record encoder.
///
/// Each record is one line carrying timestamp, level, message, caller file
/// and line, and the event's fields in the order they were written.
pub fn encoder_layer<S, W>(writer: W) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(false)
        .with_span_list(false)
        .flatten_event(true)
}

/// A standalone subscriber using the production encoder.
///
/// Writes synchronously; meant for scoped use via
/// `tracing::subscriber::set_default`.
pub fn subscriber<W>(level: LevelFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(encoder_layer(writer))
        .with(level)
}

/// The process-wide logger.
pub struct StructuredLogger {
    level: LevelHandle,
    sink: SinkHandle,
    guard: Mutex<Option<WorkerGuard>>,
}

impl StructuredLogger {
    /// The installed logger, if [`configure`] has run.
    pub fn global() -> Option<&'static StructuredLogger> {
        LOGGER.get()
    }

    /// Change the minimum level.
    pub fn set_level(&self, level: LevelFilter) -> Result<(), LoggingError> {
        self.level.reload(level)?;
        Ok(())
    }

    /// Current minimum level.
    pub fn level(&self) -> Option<LevelFilter> {
        self.level.clone_current()
    }

    /// Swap both level and sink.
    fn replace(&self, level: LevelFilter, sink: LogSink) -> Result<(), LoggingError> {
        let (writer, guard) = tracing_appender::non_blocking(sink.into_writer());
        let layer: SinkLayer = encoder_layer(writer).boxed();
        self.sink.reload(layer)?;
        self.level.reload(level)?;
        // dropping the previous guard flushes whatever the old sink still buffers
        let previous = self
            .guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(guard);
        drop(previous);
        Ok(())
    }
}

/// Build the active logger from a level and a sink.
///
/// The first call installs the global subscriber. Later calls replace the
/// level and sink of the installed one.
pub fn configure(level: LevelFilter, sink: LogSink) -> Result<&'static StructuredLogger, LoggingError> {
    if let Some(logger) = LOGGER.get() {
        logger.replace(level, sink)?;
        return Ok(logger);
    }

    let (writer, guard) = tracing_appender::non_blocking(sink.into_writer());
    let layer: SinkLayer = encoder_layer(writer).boxed();
    let (sink_layer, sink_handle) = reload::Layer::new(layer);
    let (level_layer, level_handle) = reload::Layer::new(level);

    tracing_subscriber::registry()
        .with(sink_layer)
        .with(level_layer)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(LOGGER.get_or_init(|| StructuredLogger {
        level: level_handle,
        sink: sink_handle,
        guard: Mutex::new(Some(guard)),
    }))
}

/// Configure the logger from the `[log]` section.
pub fn init(config: &LogConfig) -> Result<&'static StructuredLogger, LoggingError> {
    let level = parse_level(&config.level)?;
    let sink = LogSink::from_config(config)?;
    configure(level, sink)
}

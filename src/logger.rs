use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::LoggerConfig;
use crate::context::BoundContext;
use crate::error::LogError;
use crate::level::{IntoLevel, Level};
use crate::record::{Callsite, ExceptionInfo, Fields, IntoFields, Record};
use crate::writer::{
    stderr_handler, ConsoleSink, ErrorHandler, ShutdownReport, StatsSnapshot, WriterHandle, WriterOptions,
};

/// Key bound by [`Logger::tagged`].
pub const LOG_TYPE_KEY: &str = "log_type";

struct Shared {
    min_level: Level,
    writer: Option<WriterHandle>,
    clock: Arc<dyn Clock>,
}

/// Caller-facing logging API.
///
/// A `Logger` is cheap to clone and safe to share between threads. All
/// loggers derived from one another through [`bind`](Logger::bind),
/// [`named`](Logger::named) and friends feed the same background writer;
/// each keeps its own immutable context.
///
/// Emitting never touches the disk: records are built on the caller's
/// thread, queued, and written by the writer task.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    context: BoundContext,
    name: Option<Arc<str>>,
}

/// Builder for [`Logger`] with the pieces that cannot live in a config file.
pub struct LoggerBuilder {
    config: LoggerConfig,
    clock: Option<Arc<dyn Clock>>,
    on_error: Option<ErrorHandler>,
    console: Option<Box<dyn ConsoleSink>>,
}

impl LoggerBuilder {
    /// Timestamp source for records. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Receives writer-side failures (rotation, write, flush). Defaults to
    /// printing on stderr.
    pub fn on_error(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Mirror lines to `sink` instead of the configured console stream.
    /// Enables the mirror even when `print_output` is off.
    pub fn console(mut self, sink: impl ConsoleSink) -> Self {
        self.console = Some(Box::new(sink));
        self
    }

    /// Validate the config and start the writer on the current tokio
    /// runtime. No writer is started when the config has no output.
    pub fn build(self) -> Result<Logger, LogError> {
        let config = self.config;
        config.validate()?;

        let on_error = self.on_error.unwrap_or_else(stderr_handler);
        let console: Option<Box<dyn ConsoleSink>> = match self.console {
            Some(sink) => Some(sink),
            None if config.print_output => Some(Box::new(config.console_target)),
            None => None,
        };
        let writer = if config.log_file.is_some() || console.is_some() {
            Some(WriterHandle::spawn(WriterOptions {
                log_file: config.resolved_log_file(),
                rotation: config.rotation_policy(),
                console,
                formatter: config.formatter(),
                flush: config.flush_policy,
                capacity: config.queue_capacity,
                overflow: config.overflow_policy,
                on_error,
            })?)
        } else {
            None
        };

        let logger = Logger {
            shared: Arc::new(Shared {
                min_level: config.log_level,
                writer,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            }),
            context: BoundContext::new(config.binding_dict.clone()),
            name: config.logger_name.as_deref().map(Arc::from),
        };

        if config.announce_startup {
            let log_file = config
                .resolved_log_file()
                .map_or_else(|| "None".to_string(), |p| p.display().to_string());
            logger.info(
                "logging set up",
                crate::fields! { "log_file" => log_file, "json" => config.json_formatter },
            );
        }
        Ok(logger)
    }
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Result<Self, LogError> {
        Self::builder(config).build()
    }

    pub fn builder(config: LoggerConfig) -> LoggerBuilder {
        LoggerBuilder {
            config,
            clock: None,
            on_error: None,
            console: None,
        }
    }

    /// Whether a record at `level` would be queued at all.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.shared.min_level && self.shared.writer.is_some()
    }

    pub fn min_level(&self) -> Level {
        self.shared.min_level
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>, fields: impl IntoFields) {
        self.emit_quiet(Level::Debug, message, fields, None, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>, fields: impl IntoFields) {
        self.emit_quiet(Level::Info, message, fields, None, Location::caller());
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>, fields: impl IntoFields) {
        self.emit_quiet(Level::Warning, message, fields, None, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>, fields: impl IntoFields) {
        self.emit_quiet(Level::Error, message, fields, None, Location::caller());
    }

    #[track_caller]
    pub fn critical(&self, message: impl Into<String>, fields: impl IntoFields) {
        self.emit_quiet(Level::Critical, message, fields, None, Location::caller());
    }

    /// Log at `ERROR` with `error` captured as the record's exception.
    #[track_caller]
    pub fn exception<E>(&self, message: impl Into<String>, error: &E, fields: impl IntoFields)
    where
        E: std::error::Error + ?Sized,
    {
        if !self.enabled(Level::Error) {
            return;
        }
        let info = ExceptionInfo::capture(error);
        self.emit_quiet(Level::Error, message, fields, Some(info), Location::caller());
    }

    /// Log with a level given by value, name or number.
    ///
    /// Unlike the leveled helpers this surfaces
    /// [`LogError::InvalidLevel`] and, under the `BLOCK` overflow policy,
    /// [`LogError::QueueOverflow`].
    #[track_caller]
    pub fn log(
        &self,
        level: impl IntoLevel,
        message: impl Into<String>,
        fields: impl IntoFields,
    ) -> Result<(), LogError> {
        let level = level.into_level()?;
        if !self.enabled(level) {
            return Ok(());
        }
        self.emit(level, message.into(), fields.into_fields(), None, Location::caller())
    }

    /// Child logger with `fields` added to the bound context.
    pub fn bind(&self, fields: impl IntoFields) -> Logger {
        Logger {
            shared: Arc::clone(&self.shared),
            context: self.context.bind(fields),
            name: self.name.clone(),
        }
    }

    /// Child logger without the given keys in its bound context.
    pub fn unbind<I, K>(&self, keys: I) -> Logger
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        Logger {
            shared: Arc::clone(&self.shared),
            context: self.context.unbind(keys),
            name: self.name.clone(),
        }
    }

    /// Child logger whose records carry `name` as their logger name.
    pub fn named(&self, name: impl Into<String>) -> Logger {
        Logger {
            shared: Arc::clone(&self.shared),
            context: self.context.clone(),
            name: Some(Arc::from(name.into())),
        }
    }

    /// Child logger whose records are tagged with a `log_type` field.
    pub fn tagged(&self, log_type: impl Into<String>) -> Logger {
        self.bind([(LOG_TYPE_KEY, log_type.into())])
    }

    pub fn context(&self) -> &BoundContext {
        &self.context
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The shared writer, if the logger has any output.
    pub fn writer(&self) -> Option<&WriterHandle> {
        self.shared.writer.as_ref()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.writer().map(WriterHandle::stats).unwrap_or_default()
    }

    /// Wait until everything logged so far has been written and flushed.
    pub async fn flush(&self) {
        if let Some(writer) = self.writer() {
            writer.flush().await;
        }
    }

    /// Drain and stop the shared writer. Affects every logger derived from
    /// the same root; later records are counted as dropped.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        match self.writer() {
            Some(writer) => writer.shutdown(timeout).await,
            None => ShutdownReport::default(),
        }
    }

    /// Leveled helpers cannot return errors; an overflow under `BLOCK` is
    /// already counted as dropped by the queue.
    fn emit_quiet(
        &self,
        level: Level,
        message: impl Into<String>,
        fields: impl IntoFields,
        exception: Option<ExceptionInfo>,
        location: &'static Location<'static>,
    ) {
        if !self.enabled(level) {
            return;
        }
        let _ = self.emit(level, message.into(), fields.into_fields(), exception, location);
    }

    fn emit(
        &self,
        level: Level,
        message: String,
        fields: Fields,
        exception: Option<ExceptionInfo>,
        location: &'static Location<'static>,
    ) -> Result<(), LogError> {
        let target = self.name.as_deref().unwrap_or("root");
        self.submit(level, message, fields, exception, Callsite::from_location(target, location))
    }

    /// Resolve bound context into a record and queue it.
    pub(crate) fn submit(
        &self,
        level: Level,
        message: String,
        fields: Fields,
        exception: Option<ExceptionInfo>,
        callsite: Callsite,
    ) -> Result<(), LogError> {
        if level < self.shared.min_level {
            return Ok(());
        }
        let Some(writer) = self.shared.writer.as_ref() else {
            return Ok(());
        };

        let fields = self.context.resolve(fields);
        let mut record = Record::at(self.shared.clock.now(), level, message, fields, exception)
            .with_callsite(callsite);
        if let Some(name) = &self.name {
            record = record.with_logger(name.as_ref());
        }
        writer.enqueue(record)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("min_level", &self.shared.min_level)
            .field("context", self.context.as_mapping())
            .field("has_writer", &self.shared.writer.is_some())
            .finish()
    }
}

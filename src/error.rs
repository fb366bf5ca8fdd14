use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors visible to the thread that emits a record or builds a logger.
///
/// Steady-state I/O failures never show up here; they stay inside the
/// writer and are reported as [`SinkError`] through the error handler.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("invalid logger configuration: {0}")]
    Config(String),

    #[error("log queue stayed full for {timeout:?}, record dropped")]
    QueueOverflow { timeout: Duration },

    #[error("no tokio runtime available to spawn the log writer")]
    NoRuntime,

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),

    #[error("failed to start console mirror: {0}")]
    Console(#[source] std::io::Error),
}

/// Failures observed by the background writer.
///
/// These are handed to the configured error handler and counted in
/// [`crate::writer::StatsSnapshot`]; they are never propagated to callers.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("cannot open log file {path}: {source}")]
    Rotation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed writing to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed flushing {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no log file is open, line dropped")]
    NoActiveFile,
}

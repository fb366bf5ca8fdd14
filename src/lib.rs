//! Structured asynchronous logging with time-based rotating files.
//!
//! Callers build [`Record`]s through a [`Logger`]; records are queued on a
//! bounded queue and a single background writer task formats them, applies
//! the [`RotationPolicy`] and appends them to `<base>.<period>` files, with
//! an optional console mirror.
//!
//! ```no_run
//! use std::time::Duration;
//! use rolling_log_sink::{fields, Logger, LoggerConfig};
//!
//! # async fn run() -> Result<(), rolling_log_sink::LogError> {
//! let logger = Logger::new(LoggerConfig::with_file("logs/service.log"))?;
//! let request = logger.bind(fields! { "request_id" => "xyz-789" });
//! request.info("order placed", fields! { "order_id" => 123 });
//! logger.shutdown(Duration::from_secs(2)).await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod format;
pub mod level;
pub mod logger;
pub mod record;
pub mod rotation;
pub mod writer;

mod queue;

#[cfg(feature = "tracing-layer")]
pub mod init;
#[cfg(feature = "tracing-layer")]
pub mod layer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LoggerConfig;
pub use context::BoundContext;
pub use error::{LogError, SinkError};
pub use format::{format, FormatMode, Formatter};
pub use level::{IntoLevel, Level};
pub use logger::{Logger, LoggerBuilder};
pub use queue::OverflowPolicy;
pub use record::{Callsite, ExceptionInfo, Fields, IntoFields, Record};
pub use rotation::{RotationPeriod, RotationPolicy, RotationTimezone};
pub use writer::{
    ConsoleSink, ConsoleTarget, ErrorHandler, FlushPolicy, ShutdownReport, StatsSnapshot, WriterHandle,
};

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::LogError;
use crate::format::{FormatMode, Formatter};
use crate::level::Level;
use crate::queue::OverflowPolicy;
use crate::record::Fields;
use crate::rotation::{RotationPeriod, RotationPolicy, RotationTimezone};
use crate::writer::{ConsoleTarget, FlushPolicy};

/// Logger configuration, read once when the logger is built.
///
/// **Fields**
/// - `log_file`: base path of the rotating file. Without it only the
///   console mirror (if enabled) receives output.
/// - `log_dir`: directory a relative `log_file` is placed in. Created on
///   first write.
/// - `log_level`: records below this level are rejected before enqueue.
/// - `print_output`: mirror every line to `console_target`.
/// - `json_formatter`: JSON lines when `true`, plain `k=v` lines otherwise.
/// - `binding_dict`: context bound to every record of the root logger.
/// - `queue_capacity`: maximum number of records waiting for the writer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Level,
    pub print_output: bool,
    pub console_target: ConsoleTarget,
    pub json_formatter: bool,
    pub include_callsite: bool,
    pub binding_dict: Fields,
    pub logger_name: Option<String>,
    pub rotation_period: RotationPeriod,
    pub rotation_timezone: RotationTimezone,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub flush_policy: FlushPolicy,
    /// Emit a `"logging set up"` record once the logger is ready.
    pub announce_startup: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            log_dir: None,
            log_level: Level::Info,
            print_output: false,
            console_target: ConsoleTarget::default(),
            json_formatter: true,
            include_callsite: false,
            binding_dict: Fields::new(),
            logger_name: None,
            rotation_period: RotationPeriod::Daily,
            rotation_timezone: RotationTimezone::Utc,
            queue_capacity: 1024,
            overflow_policy: OverflowPolicy::DropNewest,
            flush_policy: FlushPolicy::default(),
            announce_startup: false,
        }
    }
}

impl LoggerConfig {
    /// Shorthand for a config that writes to `log_file`.
    pub fn with_file(log_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: Some(log_file.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), LogError> {
        if self.queue_capacity == 0 {
            return Err(LogError::Config("queue_capacity must be at least 1".into()));
        }
        if self.flush_policy == FlushPolicy::EveryN(0) {
            return Err(LogError::Config("flush_policy EVERY_N needs n >= 1".into()));
        }
        if let Some(file) = &self.log_file {
            if file.as_os_str().is_empty() {
                return Err(LogError::Config("log_file must not be empty".into()));
            }
        }
        self.rotation_timezone.validate()
    }

    /// The base path rotated files are derived from.
    pub fn resolved_log_file(&self) -> Option<PathBuf> {
        let file = self.log_file.as_ref()?;
        match &self.log_dir {
            Some(dir) if file.is_relative() => Some(dir.join(file)),
            _ => Some(file.clone()),
        }
    }

    pub fn format_mode(&self) -> FormatMode {
        if self.json_formatter {
            FormatMode::Json
        } else {
            FormatMode::Plain
        }
    }

    pub(crate) fn formatter(&self) -> Formatter {
        Formatter::new(self.format_mode()).with_callsite(self.include_callsite)
    }

    pub(crate) fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy::new(self.rotation_period, self.rotation_timezone)
    }

    /// Whether any output is configured at all.
    pub fn has_output(&self) -> bool {
        self.log_file.is_some() || self.print_output
    }
}

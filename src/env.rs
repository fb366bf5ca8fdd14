//! Environment variable names read by [`LoggerConfig::from_env`].
//!
//! These are purely helpers; the logger itself never reads the
//! environment on its own.

use crate::config::LoggerConfig;
use crate::error::LogError;

/// Base path of the rotating log file.
pub const LOG_SINK_FILE_ENV: &str = "LOG_SINK_FILE";

/// Directory a relative log file is placed in.
pub const LOG_SINK_DIR_ENV: &str = "LOG_SINK_DIR";

/// Minimum level, by name or number.
pub const LOG_SINK_LEVEL_ENV: &str = "LOG_SINK_LEVEL";

/// `true`/`1` to mirror lines to the console.
pub const LOG_SINK_PRINT_ENV: &str = "LOG_SINK_PRINT";

/// `false`/`0` to switch to plain text lines.
pub const LOG_SINK_JSON_ENV: &str = "LOG_SINK_JSON";

/// Rotation period name or code (`DAILY`, `H`, `W0`, ...).
pub const LOG_SINK_ROTATION_ENV: &str = "LOG_SINK_ROTATION";

/// Queue capacity.
pub const LOG_SINK_QUEUE_CAPACITY_ENV: &str = "LOG_SINK_QUEUE_CAPACITY";

/// Logger name attached to every record.
pub const LOG_SINK_NAME_ENV: &str = "LOG_SINK_NAME";

fn parse_bool(key: &str, raw: &str) -> Result<bool, LogError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LogError::Config(format!("{} is not a boolean: {}", key, raw))),
    }
}

impl LoggerConfig {
    /// Defaults overridden by whichever `LOG_SINK_*` variables are set.
    pub fn from_env() -> Result<Self, LogError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LogError> {
        let mut cfg = LoggerConfig::default();

        if let Some(file) = lookup(LOG_SINK_FILE_ENV) {
            cfg.log_file = Some(file.into());
        }
        if let Some(dir) = lookup(LOG_SINK_DIR_ENV) {
            cfg.log_dir = Some(dir.into());
        }
        if let Some(level) = lookup(LOG_SINK_LEVEL_ENV) {
            cfg.log_level = level.parse()?;
        }
        if let Some(raw) = lookup(LOG_SINK_PRINT_ENV) {
            cfg.print_output = parse_bool(LOG_SINK_PRINT_ENV, &raw)?;
        }
        if let Some(raw) = lookup(LOG_SINK_JSON_ENV) {
            cfg.json_formatter = parse_bool(LOG_SINK_JSON_ENV, &raw)?;
        }
        if let Some(period) = lookup(LOG_SINK_ROTATION_ENV) {
            cfg.rotation_period = period.parse()?;
        }
        if let Some(raw) = lookup(LOG_SINK_QUEUE_CAPACITY_ENV) {
            cfg.queue_capacity = raw.trim().parse().map_err(|_| {
                LogError::Config(format!("{} is not a number: {}", LOG_SINK_QUEUE_CAPACITY_ENV, raw))
            })?;
        }
        if let Some(name) = lookup(LOG_SINK_NAME_ENV) {
            cfg.logger_name = Some(name);
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::config::LoggerConfig;
use crate::error::LogError;
use crate::layer::RecordLayer;
use crate::logger::Logger;

/// Install a global `tracing` subscriber that routes every event at or
/// above the logger's level into `logger`.
///
/// **Parameters**
/// - `logger`: the [`Logger`] whose context, level filter and writer the
///   events should go through. The subscriber keeps a clone.
///
/// **Errors**
/// - [`LogError::Subscriber`] if a global subscriber is already set.
pub fn init_tracing(logger: &Logger) -> Result<(), LogError> {
    let subscriber = Registry::default().with(RecordLayer::new(logger.clone()));
    tracing::subscriber::set_global_default(subscriber).map_err(|e| LogError::Subscriber(e.to_string()))
}

/// Build a [`Logger`] from `config` and install it as the global `tracing`
/// subscriber in one step.
///
/// Must be called from within a tokio runtime. Equivalent to
/// [`Logger::new`] followed by [`init_tracing`]; the returned logger is the
/// handle to call [`Logger::shutdown`] on before exit.
pub fn init_tracing_with_config(config: LoggerConfig) -> Result<Logger, LogError> {
    let logger = Logger::new(config)?;
    init_tracing(&logger)?;
    Ok(logger)
}

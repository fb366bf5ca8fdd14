//! Routes `tracing` macros through a rotating log file configured from
//! `LOG_SINK_*` environment variables.
//!
//! ```text
//! LOG_SINK_FILE=/tmp/bridge.log LOG_SINK_PRINT=1 cargo run --example tracing_bridge
//! ```

use std::time::Duration;

use rolling_log_sink::init::init_tracing_with_config;
use rolling_log_sink::LoggerConfig;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), rolling_log_sink::LogError> {
    let mut config = LoggerConfig::from_env()?;
    if !config.has_output() {
        config.print_output = true;
    }
    let logger = init_tracing_with_config(config)?;

    debug!("filtered unless LOG_SINK_LEVEL=DEBUG");
    info!(user = "abc-123", attempts = 3, "login");
    warn!(reason = ?Some("slow disk"), "upstream degraded");

    let report = logger.shutdown(Duration::from_secs(2)).await;
    eprintln!("{:?}", report.stats);
    Ok(())
}

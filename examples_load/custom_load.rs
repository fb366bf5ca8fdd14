use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use rolling_log_sink::init::init_tracing_with_config;
use rolling_log_sink::{FlushPolicy, LoggerConfig, OverflowPolicy, RotationPeriod};

#[tokio::main]
async fn main() -> Result<(), rolling_log_sink::LogError> {
    let config = LoggerConfig {
        log_dir: Some(std::env::temp_dir().join("rolling-log-sink-load")),
        rotation_period: RotationPeriod::Minutely,
        queue_capacity: 50_000,
        overflow_policy: OverflowPolicy::Block(Duration::from_millis(200)),
        flush_policy: FlushPolicy::EveryN(1_000),
        ..LoggerConfig::with_file("custom_load.log")
    };
    let logger = init_tracing_with_config(config)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let report = logger.shutdown(Duration::from_secs(10)).await;
    println!("{:?}", report.stats);
    Ok(())
}

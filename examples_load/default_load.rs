use std::time::Instant;
use tokio::time::Duration;

use rolling_log_sink::{fields, Logger, LoggerConfig};

#[tokio::main]
async fn main() -> Result<(), rolling_log_sink::LogError> {
    let config = LoggerConfig {
        log_dir: Some(std::env::temp_dir().join("rolling-log-sink-load")),
        ..LoggerConfig::with_file("default_load.log")
    };
    let logger = Logger::new(config)?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        logger.error("default load test error", fields! { "iteration" => i });
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let report = logger.shutdown(Duration::from_secs(10)).await;
    println!("written={} dropped={} discarded={}",
        report.stats.written,
        report.stats.dropped,
        report.discarded
    );
    Ok(())
}

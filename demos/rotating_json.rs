//! Writes a handful of records through rotating JSON files, then through a
//! plain-text mirror on stdout.
//!
//! Run with `cargo run --example rotating_json`; files land in
//! `$TMPDIR/rolling-log-sink-demo/`.

use std::time::Duration;

use rolling_log_sink::{fields, ConsoleTarget, Logger, LoggerConfig, RotationPeriod};

#[derive(Debug, thiserror::Error)]
#[error("division by zero")]
struct DivideByZero;

fn divide(a: i64, b: i64) -> Result<i64, DivideByZero> {
    if b == 0 {
        return Err(DivideByZero);
    }
    Ok(a / b)
}

#[tokio::main]
async fn main() -> Result<(), rolling_log_sink::LogError> {
    let dir = std::env::temp_dir().join("rolling-log-sink-demo");

    let json = Logger::new(LoggerConfig {
        log_dir: Some(dir.clone()),
        rotation_period: RotationPeriod::Secondly,
        binding_dict: fields! { "initial_key" => "initial_value" },
        logger_name: Some("demo".into()),
        announce_startup: true,
        ..LoggerConfig::with_file("structured.log")
    })?;

    json.info("Initial log with one binding", ());
    let request = json.bind(fields! { "user_id" => 123, "request_id" => "xyz-789" });
    request.info("Log after adding two new bindings", ());
    request
        .unbind(["initial_key"])
        .warning("Log after removing one binding", fields! { "user" => "test" });

    tokio::time::sleep(Duration::from_millis(1100)).await;
    json.tagged("trade").info(
        "Trade executed",
        fields! { "symbol" => "BTCUSDT", "exec_price" => 65000.5, "exec_size" => 0.1 },
    );
    if let Err(err) = divide(10, 0) {
        json.exception("Calculation failed", &err, fields! { "a" => 10, "b" => 0 });
    }

    let report = json.shutdown(Duration::from_secs(2)).await;
    println!("json logger: {:?}", report.stats);

    let plain = Logger::new(LoggerConfig {
        print_output: true,
        console_target: ConsoleTarget::Stdout,
        json_formatter: false,
        include_callsite: true,
        ..LoggerConfig::default()
    })?;
    plain.info("This is a plain-text info message.", fields! { "note" => "two words" });
    plain.shutdown(Duration::from_secs(2)).await;

    println!("files written to {}", dir.display());
    Ok(())
}

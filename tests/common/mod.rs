#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rolling_log_sink::{ConsoleSink, ErrorHandler, FlushPolicy, LoggerConfig, SinkError};
use serde_json::Value;

/// Config writing `app.log` into `dir`, flushing after every record.
pub fn file_config(dir: &Path) -> LoggerConfig {
    LoggerConfig {
        log_dir: Some(dir.to_path_buf()),
        flush_policy: FlushPolicy::EveryRecord,
        ..LoggerConfig::with_file("app.log")
    }
}

/// All regular files in `dir`, sorted by name.
pub fn log_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn read_json_lines(path: &Path) -> Vec<Value> {
    read_lines(path)
        .iter()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// The single log file expected in `dir`, parsed as JSON lines.
pub fn only_file_json(dir: &Path) -> Vec<Value> {
    let files = log_files(dir);
    assert_eq!(files.len(), 1, "expected exactly one log file, found {:?}", files);
    read_json_lines(&files[0])
}

/// Error handler that records every failure it sees.
pub fn capture_errors() -> (ErrorHandler, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: ErrorHandler = Arc::new(move |err: &SinkError| sink.lock().push(err.to_string()));
    (handler, seen)
}

/// Console mirror that keeps every line, or fails every write.
#[derive(Clone, Default)]
pub struct CapturedConsole {
    pub lines: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl ConsoleSink for CapturedConsole {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "console closed"));
        }
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

/// Console mirror whose first write hangs until the sender side is used
/// or dropped, like a terminal nobody reads.
pub struct StuckConsole {
    pub release: std::sync::mpsc::Receiver<()>,
}

impl ConsoleSink for StuckConsole {
    fn write_line(&mut self, _line: &str) -> io::Result<()> {
        let _ = self.release.recv();
        Ok(())
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::{LogError, SinkError};
use crate::format::Formatter;
use crate::queue::{OverflowPolicy, Payload, Queue};
use crate::record::Record;
use crate::rotation::{RollingFile, RotationPolicy};

/// When buffered bytes are pushed to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlushPolicy {
    EveryRecord,
    EveryN(usize),
    Interval(Duration),
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::Interval(Duration::from_secs(1))
    }
}

/// Stream used by the console mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsoleTarget {
    #[default]
    Stderr,
    Stdout,
}

/// Lines the console mirror may hold before new ones are dropped.
pub const CONSOLE_BUFFER: usize = 1024;

/// How long a draining writer waits for the console mirror to catch up.
const CONSOLE_DRAIN: Duration = Duration::from_secs(1);

/// Time an aborted writer gets to close its file before it is cancelled.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Destination of the console mirror.
///
/// Sinks run on a dedicated thread fed by a bounded channel, so a slow or
/// stalled stream only loses mirrored lines and never holds up the file.
pub trait ConsoleSink: Send + 'static {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

impl ConsoleSink for ConsoleTarget {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            ConsoleTarget::Stdout => writeln!(io::stdout().lock(), "{}", line),
            ConsoleTarget::Stderr => writeln!(io::stderr().lock(), "{}", line),
        }
    }
}

/// Callback receiving failures observed by the writer.
pub type ErrorHandler = Arc<dyn Fn(&SinkError) + Send + Sync>;

pub(crate) fn stderr_handler() -> ErrorHandler {
    Arc::new(|err: &SinkError| eprintln!("rolling-log-sink: {}", err))
}

/// Counters shared between producers and the writer task.
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Accepted into the queue.
    pub enqueued: AtomicU64,
    /// Accepted by at least one output: written to the file or handed to
    /// the console mirror.
    pub written: AtomicU64,
    /// Lost to overflow, enqueue after shutdown, or failed writes.
    pub dropped: AtomicU64,
    /// Still queued when a shutdown timed out.
    pub discarded: AtomicU64,
    pub rotations: AtomicU64,
    pub write_errors: AtomicU64,
    /// Mirrored lines lost to a full console buffer or a failed write.
    pub console_errors: AtomicU64,
}

impl WriterStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            console_errors: self.console_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub written: u64,
    pub dropped: u64,
    pub discarded: u64,
    pub rotations: u64,
    pub write_errors: u64,
    pub console_errors: u64,
}

/// Result of [`WriterHandle::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ShutdownReport {
    /// Entries thrown away because the drain exceeded its timeout.
    pub discarded: u64,
    /// Counters at the moment the writer stopped.
    pub stats: StatsSnapshot,
}

/// Everything the writer task needs, fixed at spawn time.
pub(crate) struct WriterOptions {
    pub(crate) log_file: Option<PathBuf>,
    pub(crate) rotation: RotationPolicy,
    pub(crate) console: Option<Box<dyn ConsoleSink>>,
    pub(crate) formatter: Formatter,
    pub(crate) flush: FlushPolicy,
    pub(crate) capacity: usize,
    pub(crate) overflow: OverflowPolicy,
    pub(crate) on_error: ErrorHandler,
}

#[derive(Default)]
struct Control {
    abort: AtomicBool,
}

/// Producer-side handle to the background writer. Cheap to share.
pub struct WriterHandle {
    queue: Arc<Queue>,
    control: Arc<Control>,
    stats: Arc<WriterStats>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WriterHandle {
    /// Spawn the writer on the current tokio runtime.
    pub(crate) fn spawn(options: WriterOptions) -> Result<Self, LogError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LogError::NoRuntime)?;

        let stats = Arc::new(WriterStats::default());
        let queue = Arc::new(Queue::new(options.capacity, options.overflow, Arc::clone(&stats)));
        let control = Arc::new(Control::default());
        let console = options
            .console
            .map(|sink| Console::start(sink, Arc::clone(&stats)))
            .transpose()
            .map_err(LogError::Console)?;

        let worker = Worker {
            queue: Arc::clone(&queue),
            control: Arc::clone(&control),
            stats: Arc::clone(&stats),
            file: options
                .log_file
                .map(|path| RollingFile::new(path, options.rotation)),
            console,
            formatter: options.formatter,
            flush: options.flush,
            unflushed: 0,
            last_flush: Instant::now(),
            last_seq: None,
            on_error: options.on_error,
        };
        let task = runtime.spawn(worker.run());

        Ok(WriterHandle {
            queue,
            control,
            stats,
            task: Mutex::new(Some(task)),
        })
    }

    /// Hand a record to the writer. Never performs I/O.
    pub(crate) fn enqueue(&self, record: Record) -> Result<(), LogError> {
        self.queue.push(record)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of records waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stop consuming. Producers keep enqueueing under the overflow policy.
    pub fn pause(&self) {
        self.queue.set_paused(true);
    }

    pub fn resume(&self) {
        self.queue.set_paused(false);
    }

    /// Wait until every record enqueued before this call has been written
    /// and flushed. Returns immediately once the writer is shut down.
    pub async fn flush(&self) {
        if let Some(done) = self.queue.push_barrier() {
            let _ = done.await;
        }
    }

    /// Close the queue, drain it in order, flush and close the file.
    ///
    /// If draining takes longer than `timeout` the writer stops, whatever
    /// is still queued is discarded and counted in the report. A writer
    /// that does not stop within a short grace period is cancelled. Calling
    /// this again returns a report with `discarded == 0`.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.queue.close();
        let task = self.task.lock().take();

        let discarded_before = self.stats.discarded.load(Ordering::Relaxed);
        if let Some(mut task) = task {
            let joined = match tokio::time::timeout(timeout, &mut task).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    self.control.abort.store(true, Ordering::SeqCst);
                    self.queue.wake();
                    match tokio::time::timeout(ABORT_GRACE, &mut task).await {
                        Ok(joined) => Some(joined),
                        Err(_) => {
                            task.abort();
                            let left = self.queue.discard_all();
                            self.stats.discarded.fetch_add(left, Ordering::Relaxed);
                            tracing::debug!(discarded = left, "log writer cancelled");
                            None
                        }
                    }
                }
            };
            if let Some(Err(err)) = joined {
                eprintln!("rolling-log-sink: writer task failed: {}", err);
            }
        }

        let stats = self.stats.snapshot();
        ShutdownReport {
            discarded: stats.discarded - discarded_before,
            stats,
        }
    }
}

impl Drop for WriterHandle {
    /// Once the last logger is gone the writer drains what is left and
    /// closes the file on its own.
    fn drop(&mut self) {
        self.queue.close();
    }
}

struct Worker {
    queue: Arc<Queue>,
    control: Arc<Control>,
    stats: Arc<WriterStats>,
    file: Option<RollingFile>,
    console: Option<Console>,
    formatter: Formatter,
    flush: FlushPolicy,
    unflushed: usize,
    last_flush: Instant,
    last_seq: Option<u64>,
    on_error: ErrorHandler,
}

impl Worker {
    async fn run(mut self) {
        let mut aborted = false;
        loop {
            if self.control.abort.load(Ordering::SeqCst) {
                let discarded = self.queue.discard_all();
                self.stats.discarded.fetch_add(discarded, Ordering::Relaxed);
                aborted = true;
                break;
            }

            if let Some(entry) = self.queue.pop() {
                debug_assert!(self.last_seq.map_or(true, |last| entry.seq > last));
                self.last_seq = Some(entry.seq);
                match entry.payload {
                    Payload::Record(record) => self.write_record(&record).await,
                    Payload::Flush(done) => {
                        self.flush_file().await;
                        let _ = done.send(());
                    }
                }
                continue;
            }
            if self.queue.is_finished() {
                break;
            }

            let queue = Arc::clone(&self.queue);
            match self.flush_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = queue.wait_ready() => {}
                        _ = sleep_until(deadline) => self.flush_file().await,
                    }
                }
                None => queue.wait_ready().await,
            }
        }

        if let Some(file) = self.file.as_mut() {
            if let Err(err) = file.close().await {
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                (self.on_error)(&err);
            }
        }
        if let Some(console) = self.console.take() {
            console.close(if aborted { Duration::ZERO } else { CONSOLE_DRAIN }).await;
        }
        tracing::debug!(
            written = self.stats.written.load(Ordering::Relaxed),
            discarded = self.stats.discarded.load(Ordering::Relaxed),
            "log writer stopped"
        );
    }

    async fn write_record(&mut self, record: &Record) {
        let line = self.formatter.format(record);
        let mut delivered = false;

        if let Some(file) = self.file.as_mut() {
            if file.needs_rotation(record.timestamp()) {
                match file.rotate(record.timestamp()).await {
                    Ok(path) => {
                        self.stats.rotations.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(path = %path.display(), "opened log file");
                    }
                    Err(err) => {
                        self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                        (self.on_error)(&err);
                    }
                }
            }
            match file.write_line(&line).await {
                Ok(()) => {
                    delivered = true;
                    self.unflushed += 1;
                }
                Err(err) => {
                    self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                    (self.on_error)(&err);
                }
            }
        }

        if let Some(console) = &self.console {
            if console.offer(&line) {
                delivered = true;
            } else {
                self.stats.console_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        if delivered {
            self.stats.written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }

        let due = match self.flush {
            FlushPolicy::EveryRecord => true,
            FlushPolicy::EveryN(n) => self.unflushed >= n,
            FlushPolicy::Interval(every) => self.last_flush.elapsed() >= every,
        };
        if due {
            self.flush_file().await;
        }
    }

    /// Deadline for the next interval flush, if anything is buffered.
    fn flush_deadline(&self) -> Option<Instant> {
        match self.flush {
            FlushPolicy::Interval(every) if self.unflushed > 0 => Some(self.last_flush + every),
            _ => None,
        }
    }

    async fn flush_file(&mut self) {
        self.unflushed = 0;
        self.last_flush = Instant::now();
        if let Some(file) = self.file.as_mut() {
            if let Err(err) = file.flush().await {
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                (self.on_error)(&err);
            }
        }
    }
}

/// Console mirror running on its own thread.
struct Console {
    lines: mpsc::Sender<String>,
    done: oneshot::Receiver<()>,
}

impl Console {
    fn start(mut sink: Box<dyn ConsoleSink>, stats: Arc<WriterStats>) -> io::Result<Self> {
        let (lines, mut rx) = mpsc::channel::<String>(CONSOLE_BUFFER);
        let (finished, done) = oneshot::channel();
        std::thread::Builder::new()
            .name("log-console".into())
            .spawn(move || {
                while let Some(line) = rx.blocking_recv() {
                    if sink.write_line(&line).is_err() {
                        stats.console_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                let _ = finished.send(());
            })?;
        Ok(Console { lines, done })
    }

    /// Never waits: a full buffer rejects the line.
    fn offer(&self, line: &str) -> bool {
        self.lines.try_send(line.to_string()).is_ok()
    }

    /// Stop feeding the thread and give it up to `wait` to write what it
    /// already holds.
    async fn close(self, wait: Duration) {
        let Console { lines, done } = self;
        drop(lines);
        let _ = tokio::time::timeout(wait, done).await;
    }
}

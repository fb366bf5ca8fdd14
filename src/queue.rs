use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Notify};

use crate::error::LogError;
use crate::record::Record;
use crate::writer::WriterStats;

/// What `enqueue` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverflowPolicy {
    /// Wait up to the timeout for space, then fail with
    /// [`LogError::QueueOverflow`]. Blocks the calling OS thread.
    Block(Duration),
    /// Evict the oldest queued record to make room.
    DropOldest,
    /// Reject the incoming record.
    #[default]
    DropNewest,
}

pub(crate) enum Payload {
    Record(Record),
    /// Barrier: signalled once every earlier entry reached the outputs.
    Flush(oneshot::Sender<()>),
}

pub(crate) struct QueueEntry {
    /// Position in the global enqueue order. Only used for ordering.
    pub(crate) seq: u64,
    pub(crate) payload: Payload,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    /// Number of `Payload::Record` entries; barriers do not use capacity.
    records: usize,
    next_seq: u64,
    closed: bool,
    /// While set, `pop` hands out nothing.
    paused: bool,
}

impl QueueState {
    fn push(&mut self, payload: Payload) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if matches!(payload, Payload::Record(_)) {
            self.records += 1;
        }
        self.entries.push_back(QueueEntry { seq, payload });
    }

    fn evict_oldest_record(&mut self) -> bool {
        let Some(pos) = self
            .entries
            .iter()
            .position(|e| matches!(e.payload, Payload::Record(_)))
        else {
            return false;
        };
        self.entries.remove(pos);
        self.records -= 1;
        true
    }
}

/// Bounded multi-producer, single-consumer FIFO.
///
/// Producers take a short mutex and never touch I/O. The consumer waits on
/// a [`Notify`] so it sleeps while the queue is empty.
pub(crate) struct Queue {
    state: Mutex<QueueState>,
    space: Condvar,
    ready: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    stats: Arc<WriterStats>,
}

impl Queue {
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy, stats: Arc<WriterStats>) -> Self {
        Queue {
            state: Mutex::new(QueueState::default()),
            space: Condvar::new(),
            ready: Notify::new(),
            capacity: capacity.max(1),
            policy,
            stats,
        }
    }

    /// Enqueue a record according to the overflow policy. Records offered
    /// after `close` are counted as dropped.
    pub(crate) fn push(&self, record: Record) -> Result<(), LogError> {
        let mut state = self.state.lock();
        if state.closed {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        if state.records >= self.capacity {
            match self.policy {
                OverflowPolicy::DropNewest => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                OverflowPolicy::DropOldest => {
                    if state.evict_oldest_record() {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                OverflowPolicy::Block(timeout) => {
                    let deadline = Instant::now() + timeout;
                    while state.records >= self.capacity && !state.closed {
                        if self.space.wait_until(&mut state, deadline).timed_out()
                            && state.records >= self.capacity
                        {
                            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                            return Err(LogError::QueueOverflow { timeout });
                        }
                    }
                    if state.closed {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        return Ok(());
                    }
                }
            }
        }

        state.push(Payload::Record(record));
        drop(state);
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.ready.notify_one();
        Ok(())
    }

    /// Enqueue a flush barrier. Returns `None` once the queue is closed.
    pub(crate) fn push_barrier(&self) -> Option<oneshot::Receiver<()>> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        state.push(Payload::Flush(tx));
        drop(state);
        self.ready.notify_one();
        Some(rx)
    }

    pub(crate) fn pop(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock();
        if state.paused {
            return None;
        }
        let entry = state.entries.pop_front()?;
        if matches!(entry.payload, Payload::Record(_)) {
            state.records -= 1;
            drop(state);
            self.space.notify_one();
        }
        Some(entry)
    }

    /// Remove everything still queued and return how many records that was.
    pub(crate) fn discard_all(&self) -> u64 {
        let mut state = self.state.lock();
        let discarded = state.records as u64;
        state.entries.clear();
        state.records = 0;
        drop(state);
        self.space.notify_all();
        discarded
    }

    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.space.notify_all();
        self.ready.notify_one();
    }

    /// Closed with nothing left to hand out.
    pub(crate) fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.closed && state.entries.is_empty()
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
        self.ready.notify_one();
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().records
    }

    /// Wake the consumer without adding an entry.
    pub(crate) fn wake(&self) {
        self.ready.notify_one();
    }

    pub(crate) async fn wait_ready(&self) {
        self.ready.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use chrono::Utc;

    fn record(message: &str) -> Record {
        Record::at(Utc::now(), Level::Info, message, (), None)
    }

    fn queue(capacity: usize, policy: OverflowPolicy) -> (Queue, Arc<WriterStats>) {
        let stats = Arc::new(WriterStats::default());
        (Queue::new(capacity, policy, Arc::clone(&stats)), stats)
    }

    fn messages(queue: &Queue) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(entry) = queue.pop() {
            if let Payload::Record(r) = entry.payload {
                out.push(r.message().to_string());
            }
        }
        out
    }

    #[test]
    fn sequence_follows_enqueue_order() {
        let (queue, _) = queue(8, OverflowPolicy::DropNewest);
        for m in ["a", "b", "c"] {
            queue.push(record(m)).unwrap();
        }
        let seqs: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn drop_newest_keeps_first_records() {
        let (queue, stats) = queue(1, OverflowPolicy::DropNewest);
        for m in ["first", "second", "third"] {
            queue.push(record(m)).unwrap();
        }
        assert_eq!(stats.dropped.load(Ordering::Relaxed), 2);
        assert_eq!(messages(&queue), vec!["first"]);
    }

    #[test]
    fn drop_oldest_keeps_latest_records() {
        let (queue, stats) = queue(2, OverflowPolicy::DropOldest);
        for m in ["a", "b", "c", "d"] {
            queue.push(record(m)).unwrap();
        }
        assert_eq!(stats.dropped.load(Ordering::Relaxed), 2);
        assert_eq!(messages(&queue), vec!["c", "d"]);
    }

    #[test]
    fn block_times_out_with_overflow_error() {
        let (queue, stats) = queue(1, OverflowPolicy::Block(Duration::from_millis(20)));
        queue.push(record("fits")).unwrap();
        let err = queue.push(record("waits")).unwrap_err();
        assert!(matches!(err, LogError::QueueOverflow { .. }));
        assert_eq!(stats.dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn block_resumes_when_consumer_pops() {
        let (queue, _) = queue(1, OverflowPolicy::Block(Duration::from_secs(5)));
        let queue = Arc::new(queue);
        queue.push(record("one")).unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.pop().is_some()
            })
        };
        queue.push(record("two")).unwrap();
        assert!(consumer.join().unwrap());
        assert_eq!(messages(&queue), vec!["two"]);
    }

    #[test]
    fn barriers_bypass_capacity() {
        let (queue, _) = queue(1, OverflowPolicy::DropNewest);
        queue.push(record("full")).unwrap();
        assert!(queue.push_barrier().is_some());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn closed_queue_drops_and_discard_counts_records() {
        let (queue, stats) = queue(4, OverflowPolicy::DropNewest);
        queue.push(record("a")).unwrap();
        queue.push(record("b")).unwrap();
        let _barrier = queue.push_barrier();
        queue.close();
        queue.push(record("late")).unwrap();

        assert_eq!(stats.dropped.load(Ordering::Relaxed), 1);
        assert!(queue.push_barrier().is_none());
        assert_eq!(queue.discard_all(), 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn paused_queue_holds_entries_until_resumed() {
        let (queue, _) = queue(4, OverflowPolicy::DropNewest);
        queue.set_paused(true);
        queue.push(record("held")).unwrap();
        queue.close();
        assert!(queue.pop().is_none());
        assert!(!queue.is_finished());

        queue.set_paused(false);
        assert_eq!(messages(&queue), vec!["held"]);
        assert!(queue.is_finished());
    }
}

//! Mock source/sink for testing the mirroring cycle.
//!
//! Records all commits and forwards for assertions. The sink can be
//! configured to fail after N successful sends, to exercise the
//! "publish failure aborts the cycle before its commit" path.

use mirroring_kafka::client::{BoxFuture, DestinationProducer, SourceConsumer};
use mirroring_kafka::{MirrorError, MirrorRecord, OffsetMap, Result, TopicPartition};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Build a source record on partition `partition` of topic "events".
pub fn rec(partition: i32, offset: i64, key: Option<&[u8]>, ts: i64) -> MirrorRecord {
    MirrorRecord {
        partition: TopicPartition::new("events", partition),
        offset,
        key: key.map(|k| k.to_vec()),
        payload: Some(format!("payload-{offset}").into_bytes()),
        timestamp_ms: ts,
    }
}

/// Mock [`SourceConsumer`] that serves pre-loaded batches (one per cycle)
/// and records every commit call.
#[derive(Default)]
pub struct MockSource {
    batches: Mutex<VecDeque<Vec<MirrorRecord>>>,
    commits: Mutex<Vec<OffsetMap>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batches(batches: Vec<Vec<MirrorRecord>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// All commit calls made so far, in order.
    pub fn commits(&self) -> Vec<OffsetMap> {
        self.commits.lock().unwrap().clone()
    }
}

impl SourceConsumer for MockSource {
    fn poll_batch(&self, max_records: usize, _timeout: Duration) -> BoxFuture<'_, Vec<MirrorRecord>> {
        Box::pin(async move {
            let batch = self
                .batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            Ok(batch.into_iter().take(max_records).collect())
        })
    }

    fn commit_offsets(&self, offsets: &OffsetMap) -> Result<()> {
        self.commits.lock().unwrap().push(offsets.clone());
        Ok(())
    }
}

/// Mock [`DestinationProducer`] recording every forwarded record.
pub struct MockSink {
    forwarded: Mutex<Vec<(String, MirrorRecord)>>,
    fail_after: AtomicUsize,
    flushes: AtomicUsize,
    fail_flush: AtomicBool,
}

impl Default for MockSink {
    fn default() -> Self {
        Self {
            forwarded: Mutex::new(Vec::new()),
            fail_after: AtomicUsize::new(usize::MAX),
            flushes: AtomicUsize::new(0),
            fail_flush: AtomicBool::new(false),
        }
    }
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send after `n` successful ones.
    pub fn fail_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// Make every flush fail.
    pub fn fail_flush(&self) {
        self.fail_flush.store(true, Ordering::SeqCst);
    }

    /// All `(topic, record)` pairs forwarded so far, in order.
    pub fn forwarded(&self) -> Vec<(String, MirrorRecord)> {
        self.forwarded.lock().unwrap().clone()
    }

    /// How many times the sink was flushed.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl DestinationProducer for MockSink {
    fn forward<'a>(&'a self, topic: &'a str, record: &'a MirrorRecord) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut forwarded = self.forwarded.lock().unwrap();
            if forwarded.len() >= self.fail_after.load(Ordering::SeqCst) {
                return Err(MirrorError::publish(topic, "simulated broker rejection"));
            }
            forwarded.push((topic.to_string(), record.clone()));
            Ok(())
        })
    }

    fn flush(&self) -> Result<()> {
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(MirrorError::publish("events-mirror", "simulated flush failure"));
        }
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

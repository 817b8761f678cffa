//! Core data model for mirrored records and per-cycle offset accounting.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Identifies one partition of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// A single record read from the source topic (or scanned from the
/// destination tail). Immutable once read.
///
/// `timestamp_ms` is the broker timestamp in milliseconds since epoch;
/// `-1` means the broker did not supply one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    pub partition: TopicPartition,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    pub timestamp_ms: i64,
}

impl MirrorRecord {
    /// The offset to commit once this record has been handled.
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }

    /// Whether the broker supplied a timestamp for this record.
    pub fn has_timestamp(&self) -> bool {
        self.timestamp_ms >= 0
    }
}

/// Per-cycle accumulation of "next offset to commit" per partition.
///
/// Offsets are committed atomically at the end of a cycle and never
/// persisted anywhere but the broker's own offset store. Within one cycle
/// the stored offset for a partition never decreases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap {
    inner: HashMap<TopicPartition, i64>,
}

impl OffsetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a record as fully handled (skipped or forwarded), advancing the
    /// partition's pending commit position to `record.offset + 1`.
    pub fn record_handled(&mut self, record: &MirrorRecord) {
        let next = record.next_offset();
        self.inner
            .entry(record.partition.clone())
            .and_modify(|v| *v = (*v).max(next))
            .or_insert(next);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn get(&self, partition: &TopicPartition) -> Option<i64> {
        self.inner.get(partition).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TopicPartition, i64)> {
        self.inner.iter().map(|(tp, v)| (tp, *v))
    }
}

/// Per-cycle counters, for observability only.
///
/// Returned from the cycle function rather than held as shared state, so
/// there is no cross-cycle aliasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCounters {
    pub read: u64,
    pub sent: u64,
    pub skipped: u64,
}

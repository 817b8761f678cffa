// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lookback deduplication baseline.
//!
//! The destination topic's own recent tail is the ground truth for "what was
//! already mirrored", so no external dedup store is needed. At startup the
//! engine scans the tail of every destination partition (see
//! [`crate::client::scan_destination_tail`]) and builds a [`Baseline`]: an
//! ordered window of `(timestamp, key)` pairs extended backward by a fixed
//! lookback margin from the newest destination record.
//!
//! During the steady-state loop each polled source record is classified:
//!
//! - **Skip**: the baseline is non-empty, the record's timestamp is inside
//!   the window the baseline covers (`<=` the baseline's maximum), and its
//!   key appears in the baseline.
//! - **Forward**: everything else, including records without a key or
//!   without a broker timestamp, which the baseline can never vouch for.
//!
//! The baseline is built once and never refreshed mid-run; a restart
//! rebuilds it. Suppression is therefore best-effort and time-bounded, which
//! is exactly the at-least-once contract.

use crate::record::MirrorRecord;
use std::collections::HashSet;
use std::time::Duration;

/// What to do with one polled source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Already present at the destination; do not publish, still commit.
    Skip,
    /// Publish to the destination with identical key, value and timestamp.
    Forward,
}

/// Recent destination history: `(timestamp, key)` pairs sorted ascending by
/// timestamp, plus a key set for O(1) membership checks.
///
/// Read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    entries: Vec<(i64, Vec<u8>)>,
    keys: HashSet<Vec<u8>>,
}

impl Baseline {
    /// An empty baseline: every record forwards.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a baseline from scanned `(timestamp, key)` pairs.
    ///
    /// Pairs arrive in partition scan order; they are sorted ascending by
    /// timestamp here. Duplicate keys are fine (the window may cover the
    /// same key several times).
    pub fn from_pairs(mut pairs: Vec<(i64, Vec<u8>)>) -> Self {
        pairs.sort_by_key(|(ts, _)| *ts);
        let keys = pairs.iter().map(|(_, key)| key.clone()).collect();
        Self {
            entries: pairs,
            keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The newest timestamp the baseline covers, if any.
    pub fn max_timestamp_ms(&self) -> Option<i64> {
        self.entries.last().map(|(ts, _)| *ts)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.keys.contains(key)
    }

    /// The ordered `(timestamp, key)` window.
    pub fn entries(&self) -> &[(i64, Vec<u8>)] {
        &self.entries
    }

    /// Classify one source record.
    ///
    /// A record is a skip candidate only while its timestamp is still inside
    /// the window the baseline covers; among candidates, only a key match
    /// actually skips. Records outside the window forward regardless of key,
    /// so a long-running source can re-use keys without being suppressed.
    pub fn classify(&self, record: &MirrorRecord) -> Disposition {
        let Some(max_ts) = self.max_timestamp_ms() else {
            return Disposition::Forward;
        };
        if !record.has_timestamp() || record.timestamp_ms > max_ts {
            return Disposition::Forward;
        }
        match &record.key {
            Some(key) if self.contains_key(key) => Disposition::Skip,
            _ => Disposition::Forward,
        }
    }
}

/// Accumulates the destination tail scan into a [`Baseline`].
///
/// The broker-facing scan (see [`crate::client::scan_destination_tail`])
/// feeds records in here; everything that decides what enters the window
/// lives in this type so it can be tested without a broker.
///
/// Scan protocol, per the reconstruction algorithm:
/// 1. [`observe_tail`](Self::observe_tail) with each partition's last
///    record; the minimum of their timestamps becomes `earliest`.
/// 2. [`target_timestamp_ms`](Self::target_timestamp_ms) resolves the
///    lookback seek target, `earliest - lookback` (falling back to the
///    caller's wall clock when no tail record carried a timestamp).
/// 3. [`observe_drained`](Self::observe_drained) with every record drained
///    from the seek point forward.
/// 4. [`build`](Self::build).
///
/// Records without a broker timestamp are ignored entirely; records without
/// a key still lower `earliest` but contribute no window entry, since the
/// classification rule can never match them.
#[derive(Debug, Default)]
pub struct BaselineBuilder {
    pairs: Vec<(i64, Vec<u8>)>,
    earliest: Option<i64>,
}

impl BaselineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the last record of one destination partition.
    pub fn observe_tail(&mut self, record: &MirrorRecord) {
        if !record.has_timestamp() {
            return;
        }
        self.earliest = Some(
            self.earliest
                .map_or(record.timestamp_ms, |e| e.min(record.timestamp_ms)),
        );
        if let Some(key) = &record.key {
            self.pairs.push((record.timestamp_ms, key.clone()));
        }
    }

    /// Record one record drained from the lookback seek point forward.
    pub fn observe_drained(&mut self, record: &MirrorRecord) {
        if let (true, Some(key)) = (record.has_timestamp(), &record.key) {
            self.pairs.push((record.timestamp_ms, key.clone()));
        }
    }

    /// The earliest tail timestamp observed so far, if any.
    pub fn earliest_ms(&self) -> Option<i64> {
        self.earliest
    }

    /// The timestamp the lookback seek resolves to: the earliest tail
    /// timestamp minus the lookback margin. When every partition was empty
    /// (or no tail record carried a timestamp), `now_ms` stands in for
    /// `earliest`.
    pub fn target_timestamp_ms(&self, now_ms: i64, lookback: Duration) -> i64 {
        self.earliest.unwrap_or(now_ms) - lookback.as_millis() as i64
    }

    /// Finish the scan, sorting the collected window.
    pub fn build(self) -> Baseline {
        Baseline::from_pairs(self.pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TopicPartition;

    fn rec(offset: i64, key: Option<&[u8]>, ts: i64) -> MirrorRecord {
        MirrorRecord {
            partition: TopicPartition::new("events", 0),
            offset,
            key: key.map(|k| k.to_vec()),
            payload: Some(b"payload".to_vec()),
            timestamp_ms: ts,
        }
    }

    #[test]
    fn empty_baseline_forwards_everything() {
        let baseline = Baseline::empty();
        assert_eq!(baseline.classify(&rec(0, Some(b"k1"), 100)), Disposition::Forward);
        assert!(baseline.is_empty());
        assert_eq!(baseline.max_timestamp_ms(), None);
    }

    #[test]
    fn pairs_are_sorted_ascending() {
        let baseline = Baseline::from_pairs(vec![
            (300, b"c".to_vec()),
            (100, b"a".to_vec()),
            (200, b"b".to_vec()),
        ]);
        let timestamps: Vec<i64> = baseline.entries().iter().map(|(ts, _)| *ts).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
        assert_eq!(baseline.max_timestamp_ms(), Some(300));
        assert_eq!(baseline.len(), 3);
    }

    #[test]
    fn known_key_inside_window_skips() {
        let baseline = Baseline::from_pairs(vec![(1000, b"k1".to_vec())]);
        assert_eq!(baseline.classify(&rec(5, Some(b"k1"), 900)), Disposition::Skip);
    }

    #[test]
    fn unknown_key_inside_window_forwards() {
        let baseline = Baseline::from_pairs(vec![(1000, b"k1".to_vec())]);
        assert_eq!(baseline.classify(&rec(6, Some(b"k2"), 950)), Disposition::Forward);
    }

    #[test]
    fn known_key_outside_window_forwards() {
        let baseline = Baseline::from_pairs(vec![(1000, b"k1".to_vec())]);
        assert_eq!(baseline.classify(&rec(7, Some(b"k1"), 1500)), Disposition::Forward);
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let baseline = Baseline::from_pairs(vec![(1000, b"k1".to_vec())]);
        assert_eq!(baseline.classify(&rec(8, Some(b"k1"), 1000)), Disposition::Skip);
    }

    #[test]
    fn keyless_record_always_forwards() {
        let baseline = Baseline::from_pairs(vec![(1000, b"k1".to_vec())]);
        assert_eq!(baseline.classify(&rec(9, None, 900)), Disposition::Forward);
    }

    #[test]
    fn record_without_timestamp_always_forwards() {
        let baseline = Baseline::from_pairs(vec![(1000, b"k1".to_vec())]);
        assert_eq!(baseline.classify(&rec(10, Some(b"k1"), -1)), Disposition::Forward);
    }

    // =========================================================================
    // Reconstruction (BaselineBuilder)
    // =========================================================================

    const LOOKBACK: Duration = Duration::from_secs(1800);
    const LOOKBACK_MS: i64 = 1800 * 1000;

    #[test]
    fn empty_destination_yields_empty_baseline_with_wall_clock_target() {
        let builder = BaselineBuilder::new();
        let now_ms = 10_000_000;

        assert_eq!(builder.earliest_ms(), None);
        assert_eq!(builder.target_timestamp_ms(now_ms, LOOKBACK), now_ms - LOOKBACK_MS);

        let baseline = builder.build();
        assert!(baseline.is_empty());
        assert_eq!(baseline.classify(&rec(0, Some(b"k1"), 100)), Disposition::Forward);
    }

    #[test]
    fn earliest_is_the_minimum_across_partition_tails() {
        let mut builder = BaselineBuilder::new();
        builder.observe_tail(&rec(90, Some(b"a"), 5000));
        builder.observe_tail(&rec(14, Some(b"b"), 3000));
        builder.observe_tail(&rec(77, Some(b"c"), 7000));

        assert_eq!(builder.earliest_ms(), Some(3000));
        assert_eq!(builder.target_timestamp_ms(999_999, LOOKBACK), 3000 - LOOKBACK_MS);
    }

    #[test]
    fn keyless_tail_lowers_earliest_without_a_window_entry() {
        let mut builder = BaselineBuilder::new();
        builder.observe_tail(&rec(5, Some(b"a"), 5000));
        builder.observe_tail(&rec(9, None, 2000));

        assert_eq!(builder.earliest_ms(), Some(2000));
        let baseline = builder.build();
        assert_eq!(baseline.len(), 1);
        assert!(!baseline.contains_key(b""));
    }

    #[test]
    fn timestampless_tail_is_ignored_entirely() {
        let mut builder = BaselineBuilder::new();
        builder.observe_tail(&rec(3, Some(b"a"), -1));

        assert_eq!(builder.earliest_ms(), None);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn drained_records_are_filtered_like_tail_records() {
        let mut builder = BaselineBuilder::new();
        builder.observe_tail(&rec(50, Some(b"tail"), 9000));
        builder.observe_drained(&rec(40, Some(b"k1"), 8000));
        builder.observe_drained(&rec(41, None, 8100));
        builder.observe_drained(&rec(42, Some(b"k2"), -1));

        let baseline = builder.build();
        assert_eq!(baseline.len(), 2);
        assert!(baseline.contains_key(b"k1"));
        assert!(!baseline.contains_key(b"k2"));
    }

    #[test]
    fn build_sorts_the_scanned_window_ascending() {
        let mut builder = BaselineBuilder::new();
        builder.observe_tail(&rec(1, Some(b"late"), 9000));
        builder.observe_drained(&rec(2, Some(b"early"), 1000));
        builder.observe_drained(&rec(3, Some(b"mid"), 5000));

        let baseline = builder.build();
        let timestamps: Vec<i64> = baseline.entries().iter().map(|(ts, _)| *ts).collect();
        assert_eq!(timestamps, vec![1000, 5000, 9000]);
        assert_eq!(baseline.max_timestamp_ms(), Some(9000));
    }

    #[test]
    fn drained_records_alone_never_set_earliest() {
        // Only partition tails establish the scan's reference point.
        let mut builder = BaselineBuilder::new();
        builder.observe_drained(&rec(4, Some(b"k1"), 2000));

        assert_eq!(builder.earliest_ms(), None);
        let now_ms = 50_000_000;
        assert_eq!(builder.target_timestamp_ms(now_ms, LOOKBACK), now_ms - LOOKBACK_MS);
    }
}

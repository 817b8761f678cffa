//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics via the `metrics` facade:
//! - Records read / forwarded / skipped
//! - Cycle duration
//! - Offset commits
//! - Baseline size
//! - Publish failures
//!
//! All metrics are prefixed with `mirror_`; counters end in `_total`.
//! The counters here are observability only; correctness never depends
//! on them.

use crate::record::CycleCounters;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record one completed poll cycle.
pub fn record_cycle(counters: &CycleCounters, duration: Duration) {
    counter!("mirror_records_read_total").increment(counters.read);
    counter!("mirror_records_forwarded_total").increment(counters.sent);
    counter!("mirror_records_skipped_total").increment(counters.skipped);
    histogram!("mirror_cycle_duration_seconds").record(duration.as_secs_f64());
}

/// Record a successful offset commit covering `partitions` partitions.
pub fn record_commit(partitions: usize) {
    counter!("mirror_offset_commits_total").increment(1);
    gauge!("mirror_committed_partitions").set(partitions as f64);
}

/// Record the size of the reconstructed lookback baseline.
pub fn record_baseline_size(entries: usize) {
    gauge!("mirror_baseline_entries").set(entries as f64);
}

/// Record a failed publish to the destination topic.
pub fn record_publish_failure(topic: &str) {
    counter!("mirror_publish_failures_total", "topic" => topic.to_string()).increment(1);
}

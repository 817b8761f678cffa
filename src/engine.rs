// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The mirroring engine: steady-state replication loop.
//!
//! One sequential worker. Each cycle polls a bounded batch from the source,
//! classifies every record against the startup [`Baseline`] (skip or
//! forward), forwards in partition-local offset order waiting for each
//! acknowledgement, then commits the cycle's offsets in a single call.
//!
//! # Shutdown
//!
//! The loop is cooperative: the stop signal (a `watch` channel, set by the
//! signal handler) is observed only at the top of a cycle. A cycle already
//! in flight runs to completion, including its commit, so shutdown never
//! leaves a half-handled cycle; the cost is up to one cycle of latency.
//!
//! # Failure
//!
//! Any error aborts the loop and propagates to the caller; the process
//! exits and the supervisor restarts it. Records handled before the failure
//! in the same cycle were never committed, so they will be re-polled and
//! re-forwarded; duplicates here are expected under at-least-once
//! semantics, and the rebuilt baseline suppresses the recent ones.

use crate::baseline::{Baseline, Disposition};
use crate::client::{self, DestinationProducer, KafkaSink, KafkaSource, SourceConsumer};
use crate::config::{EngineConfig, KafkaSettings};
use crate::error::Result;
use crate::metrics;
use crate::record::{CycleCounters, OffsetMap};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info};

/// Result of one poll cycle: the counters and the offsets that were
/// committed (empty when the poll returned nothing).
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub counters: CycleCounters,
    pub offsets: OffsetMap,
}

/// The mirroring daemon's engine. Holds the per-side settings and the loop
/// tunables; all per-cycle state is local to the cycle function.
pub struct MirrorEngine {
    src: KafkaSettings,
    dest: KafkaSettings,
    config: EngineConfig,
}

impl MirrorEngine {
    pub fn new(src: KafkaSettings, dest: KafkaSettings, config: EngineConfig) -> Self {
        Self { src, dest, config }
    }

    /// Run until the stop signal is observed.
    ///
    /// Reconstructs the lookback baseline from the destination tail, then
    /// loops: poll, classify, forward, commit, sleep. The inter-cycle sleep
    /// is cut short when the stop signal arrives, but a cycle in flight is
    /// never interrupted.
    pub async fn run(&self, mut stopping: watch::Receiver<bool>) -> Result<()> {
        info!("Mirroring started");

        let group = self.config.consumer_group(&self.dest.topic);
        let baseline =
            client::scan_destination_tail(&self.dest, &group, &self.config).await?;
        info!(
            entries = baseline.len(),
            max_timestamp_ms = baseline.max_timestamp_ms(),
            dest_topic = %self.dest.topic,
            "Baseline reconstructed"
        );
        metrics::record_baseline_size(baseline.len());

        while !*stopping.borrow() {
            let started = Instant::now();

            // Scoped acquisition: both clients close their sessions on drop,
            // on success and error paths alike.
            let source = KafkaSource::new(client::acquire_consumer(&self.src, &group)?);
            let sink = KafkaSink::new(
                client::acquire_producer(&self.dest)?,
                self.config.ack_timeout_duration(),
            );

            let outcome =
                run_cycle(&source, &sink, &self.dest.topic, &baseline, &self.config).await?;

            metrics::record_cycle(&outcome.counters, started.elapsed());
            debug!(
                read = outcome.counters.read,
                sent = outcome.counters.sent,
                skipped = outcome.counters.skipped,
                src_topic = %self.src.topic,
                dest_topic = %self.dest.topic,
                "Mirroring done"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.cycle_delay_duration()) => {}
                _ = stopping.changed() => {}
            }
        }

        info!("Mirroring stopped");
        Ok(())
    }
}

/// One poll cycle against the trait seams.
///
/// Records are handled in poll order, which is partition-local offset order;
/// no cross-partition ordering is guaranteed or required. Every handled
/// record (skipped or forwarded) advances its partition's pending commit
/// offset to `offset + 1`, and the whole map is committed in one call at
/// cycle end. The sink is flushed before the commit, so a commit can only
/// ever cover acknowledged records. An empty poll commits nothing.
pub async fn run_cycle<S, D>(
    source: &S,
    sink: &D,
    dest_topic: &str,
    baseline: &Baseline,
    config: &EngineConfig,
) -> Result<CycleOutcome>
where
    S: SourceConsumer + ?Sized,
    D: DestinationProducer + ?Sized,
{
    let records = source
        .poll_batch(config.max_poll_records, config.poll_timeout_duration())
        .await?;

    let mut counters = CycleCounters::default();
    let mut offsets = OffsetMap::new();

    for record in &records {
        counters.read += 1;
        match baseline.classify(record) {
            Disposition::Skip => {
                counters.skipped += 1;
            }
            Disposition::Forward => {
                // Per-record acknowledgement keeps partition order strict and
                // ensures a failed send never advances the commit position.
                sink.forward(dest_topic, record).await?;
                counters.sent += 1;
            }
        }
        offsets.record_handled(record);
    }

    if !offsets.is_empty() {
        sink.flush()?;
        source.commit_offsets(&offsets)?;
    }

    Ok(CycleOutcome { counters, offsets })
}

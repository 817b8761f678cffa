// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Kafka connection provider and the engine's broker-facing seams.
//!
//! This module owns everything that touches `rdkafka`:
//!
//! - building client configs from [`KafkaSettings`] (SASL credentials, TLS
//!   material, producer durability settings),
//! - scoped acquisition of consumers and producers (both release their
//!   network session on drop, so every exit path including errors tears the
//!   connection down),
//! - the [`SourceConsumer`] / [`DestinationProducer`] traits the engine loop
//!   is written against (tests substitute mocks),
//! - the destination tail scan that reconstructs the lookback [`Baseline`]
//!   at startup.
//!
//! # Producer durability
//!
//! The destination producer waits for acknowledgement from the full in-sync
//! replica set (`acks=all`) and compresses with lz4. `message.max.bytes` is
//! raised to ~10 MB; events above that bound fail the publish and surface as
//! a cycle-fatal [`MirrorError::Publish`].

use crate::baseline::{Baseline, BaselineBuilder};
use crate::config::{EngineConfig, KafkaSettings};
use crate::error::{MirrorError, Result};
use crate::metrics;
use crate::record::{MirrorRecord, OffsetMap, TopicPartition};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on a single produced message, in bytes. Oversized events have
/// been observed around 2.5 MB; this leaves ample headroom.
const MAX_REQUEST_SIZE: &str = "10485880";

/// How long the consumer may hold a fetch open waiting for data.
const FETCH_MAX_WAIT_MS: &str = "1000";

/// Once a poll has yielded data, how long to wait for the rest of the batch
/// to settle before returning it, instead of holding the poll open for the
/// full window.
const BATCH_SETTLE_WAIT: Duration = Duration::from_millis(500);

/// The wait for the next record of a batch: the full remaining window while
/// the batch is still empty, a short settle wait once data has arrived.
fn batch_wait(records_so_far: usize, remaining: Duration) -> Duration {
    if records_so_far == 0 {
        remaining
    } else {
        remaining.min(BATCH_SETTLE_WAIT)
    }
}

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What the engine needs from the source side: a bounded poll and an atomic
/// offset commit. Implemented by [`KafkaSource`]; tests use a recording mock.
pub trait SourceConsumer: Send + Sync {
    /// Poll up to `max_records` records, waiting at most `timeout`.
    /// An empty result is valid (idle source).
    fn poll_batch(&self, max_records: usize, timeout: Duration) -> BoxFuture<'_, Vec<MirrorRecord>>;

    /// Commit every partition's pending offset in a single call.
    fn commit_offsets(&self, offsets: &OffsetMap) -> Result<()>;
}

/// What the engine needs from the destination side: publish one record and
/// wait for the broker's acknowledgement.
pub trait DestinationProducer: Send + Sync {
    /// Publish `record` to `topic` with identical key, value and timestamp,
    /// resolving once the broker has acknowledged it.
    fn forward<'a>(&'a self, topic: &'a str, record: &'a MirrorRecord) -> BoxFuture<'a, ()>;

    /// Drain anything still queued. Called once per cycle after the forward
    /// loop and before the cycle's offsets are committed, so a commit can
    /// only ever cover acknowledged records.
    fn flush(&self) -> Result<()>;
}

/// Shared connection parameters for both client roles.
///
/// A CA file yields a secure context (`ssl.ca.location`); a client
/// certificate/key pair extends it. SASL mechanism, protocol and credentials
/// pass straight through. Returned as pairs so tests can assert on them
/// without an actual client.
pub(crate) fn connection_params(settings: &KafkaSettings) -> Vec<(&'static str, String)> {
    let mut params = vec![("bootstrap.servers", settings.servers.clone())];
    if let Some(protocol) = &settings.security_protocol {
        params.push(("security.protocol", protocol.clone()));
    }
    if let Some(mechanism) = &settings.sasl_mechanism {
        params.push(("sasl.mechanism", mechanism.clone()));
    }
    if let Some(username) = &settings.username {
        params.push(("sasl.username", username.clone()));
    }
    if let Some(password) = &settings.password {
        params.push(("sasl.password", password.clone()));
    }
    if let Some(ca) = &settings.ca_file {
        params.push(("ssl.ca.location", ca.display().to_string()));
    }
    if let (Some(cert), Some(key)) = (&settings.cert_file, &settings.key_file) {
        params.push(("ssl.certificate.location", cert.display().to_string()));
        params.push(("ssl.key.location", key.display().to_string()));
    }
    params
}

fn base_config(settings: &KafkaSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    for (key, value) in connection_params(settings) {
        config.set(key, value);
    }
    config
}

/// Acquire a consumer joined to `group` and subscribed to the settings'
/// topic, ready to poll. Manual commits only; a first-ever run for the group
/// starts from the latest offset. Released (leaves group, closes session) on
/// drop.
pub fn acquire_consumer(settings: &KafkaSettings, group: &str) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = base_config(settings)
        .set("group.id", group)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "latest")
        .set("fetch.wait.max.ms", FETCH_MAX_WAIT_MS)
        .create()
        .map_err(|e| MirrorError::kafka("create consumer", e))?;
    consumer
        .subscribe(&[settings.topic.as_str()])
        .map_err(|e| MirrorError::kafka("subscribe", e))?;
    debug!(topic = %settings.topic, group, "Init consumer");
    Ok(consumer)
}

/// Acquire a producer connected to the destination cluster, ready to
/// publish. Flushed and closed on drop.
pub fn acquire_producer(settings: &KafkaSettings) -> Result<FutureProducer> {
    let producer: FutureProducer = base_config(settings)
        .set("acks", "all")
        .set("compression.type", "lz4")
        .set("message.max.bytes", MAX_REQUEST_SIZE)
        .create()
        .map_err(|e| MirrorError::kafka("create producer", e))?;
    debug!(topic = %settings.topic, "Init producer");
    Ok(producer)
}

/// Convert a consumed message into the engine's record type, detaching the
/// borrowed key and payload.
fn to_record(message: &BorrowedMessage<'_>) -> MirrorRecord {
    MirrorRecord {
        partition: TopicPartition::new(message.topic(), message.partition()),
        offset: message.offset(),
        key: message.key().map(|k| k.to_vec()),
        payload: message.payload().map(|p| p.to_vec()),
        timestamp_ms: message.timestamp().to_millis().unwrap_or(-1),
    }
}

/// [`SourceConsumer`] backed by an rdkafka [`StreamConsumer`].
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    pub fn new(consumer: StreamConsumer) -> Self {
        Self { consumer }
    }
}

impl SourceConsumer for KafkaSource {
    fn poll_batch(&self, max_records: usize, timeout: Duration) -> BoxFuture<'_, Vec<MirrorRecord>> {
        Box::pin(async move {
            let deadline = Instant::now() + timeout;
            let mut records = Vec::new();
            while records.len() < max_records {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let wait = batch_wait(records.len(), remaining);
                match tokio::time::timeout(wait, self.consumer.recv()).await {
                    Ok(Ok(message)) => records.push(to_record(&message)),
                    Ok(Err(e)) => return Err(MirrorError::kafka("poll", e)),
                    // Nothing more within the wait: the batch is done.
                    Err(_) => break,
                }
            }
            Ok(records)
        })
    }

    fn commit_offsets(&self, offsets: &OffsetMap) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        for (tp, next_offset) in offsets.iter() {
            tpl.add_partition_offset(&tp.topic, tp.partition, Offset::Offset(next_offset))
                .map_err(MirrorError::Commit)?;
        }
        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(MirrorError::Commit)?;
        metrics::record_commit(offsets.len());
        Ok(())
    }
}

/// [`DestinationProducer`] backed by an rdkafka [`FutureProducer`].
pub struct KafkaSink {
    producer: FutureProducer,
    ack_timeout: Duration,
}

impl KafkaSink {
    pub fn new(producer: FutureProducer, ack_timeout: Duration) -> Self {
        Self {
            producer,
            ack_timeout,
        }
    }
}

impl DestinationProducer for KafkaSink {
    fn forward<'a>(&'a self, topic: &'a str, record: &'a MirrorRecord) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut outgoing = FutureRecord::<[u8], [u8]>::to(topic);
            if let Some(key) = record.key.as_deref() {
                outgoing = outgoing.key(key);
            }
            if let Some(payload) = record.payload.as_deref() {
                outgoing = outgoing.payload(payload);
            }
            if record.has_timestamp() {
                outgoing = outgoing.timestamp(record.timestamp_ms);
            }
            match self.producer.send(outgoing, self.ack_timeout).await {
                Ok(_) => Ok(()),
                Err((e, _unsent)) => {
                    metrics::record_publish_failure(topic);
                    Err(MirrorError::publish(topic, e.to_string()))
                }
            }
        })
    }

    /// With per-record acknowledgement nothing should be outstanding; this
    /// is the close half of the scoped-producer contract.
    fn flush(&self) -> Result<()> {
        self.producer
            .flush(self.ack_timeout)
            .map_err(|e| MirrorError::kafka("flush", e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Destination tail scan (lookback baseline reconstruction)
// ═══════════════════════════════════════════════════════════════════════════════

/// Reconstruct the lookback [`Baseline`] from the destination topic's own
/// recent tail.
///
/// 1. For every partition, read the watermarks; for non-empty partitions
///    fetch the last record and track the minimum of their timestamps
///    (`earliest`). If every partition is empty, `earliest` is the current
///    wall clock.
/// 2. Resolve `earliest - lookback` to per-partition offsets and seek there.
/// 3. Drain a bounded batch from those positions and collect every
///    `(timestamp, key)` pair.
///
/// An empty destination yields an empty baseline: the loop then forwards
/// everything, which is the correct cold-start behavior.
///
/// The scan consumer never joins the group (partitions are assigned
/// directly), so it cannot disturb the mirroring group's committed offsets.
pub async fn scan_destination_tail(
    settings: &KafkaSettings,
    group: &str,
    config: &EngineConfig,
) -> Result<Baseline> {
    let timeout = config.poll_timeout_duration();
    let consumer: StreamConsumer = base_config(settings)
        .set("group.id", group)
        .set("enable.auto.commit", "false")
        .create()
        .map_err(|e| MirrorError::kafka("create baseline consumer", e))?;

    let metadata = consumer
        .fetch_metadata(Some(settings.topic.as_str()), timeout)
        .map_err(|e| MirrorError::kafka("fetch metadata", e))?;
    let topic_metadata = metadata
        .topics()
        .iter()
        .find(|t| t.name() == settings.topic)
        .ok_or_else(|| {
            MirrorError::Baseline(format!("destination topic '{}' not found", settings.topic))
        })?;
    let partitions: Vec<i32> = topic_metadata.partitions().iter().map(|p| p.id()).collect();

    let mut builder = BaselineBuilder::new();
    let mut non_empty = 0usize;

    for &partition in &partitions {
        let (low, high) = consumer
            .fetch_watermarks(&settings.topic, partition, timeout)
            .map_err(|e| MirrorError::kafka("fetch watermarks", e))?;
        if high <= low {
            continue;
        }
        non_empty += 1;

        // Seek to the partition's last record and read it.
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&settings.topic, partition, Offset::Offset(high - 1))
            .map_err(|e| MirrorError::kafka("assign tail", e))?;
        consumer
            .assign(&tpl)
            .map_err(|e| MirrorError::kafka("assign tail", e))?;
        match tokio::time::timeout(timeout, consumer.recv()).await {
            Ok(Ok(message)) => builder.observe_tail(&to_record(&message)),
            Ok(Err(e)) => return Err(MirrorError::kafka("read tail", e)),
            Err(_) => {
                warn!(partition, topic = %settings.topic, "Timed out reading tail record");
            }
        }
    }

    let target_ts = builder.target_timestamp_ms(
        chrono::Utc::now().timestamp_millis(),
        config.lookback_duration(),
    );

    if non_empty > 0 {
        // Resolve the lookback target timestamp to an offset per partition
        // and drain everything from there forward.
        let mut by_time = TopicPartitionList::new();
        for &partition in &partitions {
            by_time
                .add_partition_offset(&settings.topic, partition, Offset::Offset(target_ts))
                .map_err(|e| MirrorError::kafka("offsets for times", e))?;
        }
        let resolved = consumer
            .offsets_for_times(by_time, timeout)
            .map_err(|e| MirrorError::kafka("offsets for times", e))?;

        let mut assignment = TopicPartitionList::new();
        let mut resolvable = 0usize;
        for element in resolved.elements() {
            if let Offset::Offset(offset) = element.offset() {
                assignment
                    .add_partition_offset(element.topic(), element.partition(), Offset::Offset(offset))
                    .map_err(|e| MirrorError::kafka("assign lookback", e))?;
                resolvable += 1;
            }
        }

        if resolvable > 0 {
            consumer
                .assign(&assignment)
                .map_err(|e| MirrorError::kafka("assign lookback", e))?;
            let deadline = Instant::now() + timeout;
            let mut drained = 0usize;
            while drained < config.max_poll_records {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(remaining, consumer.recv()).await {
                    Ok(Ok(message)) => {
                        drained += 1;
                        builder.observe_drained(&to_record(&message));
                    }
                    Ok(Err(e)) => return Err(MirrorError::kafka("drain lookback", e)),
                    Err(_) => break,
                }
            }
            debug!(drained, target_ts, "Lookback drain complete");
        }
    }

    Ok(builder.build())
}

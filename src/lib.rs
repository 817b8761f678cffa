//! # Mirroring Kafka
//!
//! A long-running daemon that keeps a destination Kafka topic in sync with a
//! source topic, preserving message key, value and timestamp, with
//! best-effort duplicate suppression across restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          mirroring-kafka                             │
//! │                                                                      │
//! │  startup:  ┌──────────────────┐     ┌─────────────────────────────┐  │
//! │            │ Destination tail │────►│ Baseline (ts, key) window   │  │
//! │            │ scan (lookback)  │     │ sorted asc, key set         │  │
//! │            └──────────────────┘     └──────────────┬──────────────┘  │
//! │                                                    │                 │
//! │  each cycle:                                       ▼                 │
//! │  ┌───────────────┐   ┌──────────────┐   ┌───────────────────────┐    │
//! │  │ Source poll   │──►│ Classify     │──►│ Forward (acks=all) or │    │
//! │  │ (≤1000 / 10s) │   │ skip/forward │   │ skip, then commit all │    │
//! │  └───────────────┘   └──────────────┘   └───────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery Semantics
//!
//! At-least-once. Offsets are committed only after every record of a cycle
//! has been handled, so a crash re-polls from the last commit; the lookback
//! baseline (destination tail extended 30 minutes backward) suppresses the
//! duplicates a restart would otherwise produce. Exactly-once is a
//! non-goal: there is no transactional producer and no persistent dedup
//! ledger.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mirroring_kafka::{EngineConfig, KafkaSettings, MirrorEngine};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> mirroring_kafka::Result<()> {
//!     let src = KafkaSettings::from_env("prod")?;
//!     let dest = KafkaSettings::from_env("staging")?;
//!     let (_stop_tx, stop_rx) = watch::channel(false);
//!
//!     let engine = MirrorEngine::new(src, dest, EngineConfig::default());
//!     engine.run(stop_rx).await
//! }
//! ```

pub mod baseline;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod record;

// Re-exports for convenience
pub use baseline::{Baseline, Disposition};
pub use client::{DestinationProducer, SourceConsumer};
pub use config::{EngineConfig, KafkaSettings};
pub use engine::{run_cycle, CycleOutcome, MirrorEngine};
pub use error::{MirrorError, Result};
pub use record::{CycleCounters, MirrorRecord, OffsetMap, TopicPartition};

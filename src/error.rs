// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the mirroring engine.
//!
//! All errors are fatal to the current cycle. There is no in-process retry
//! or backoff: an error propagates out of the engine, the process exits and
//! an external supervisor restarts it. Because a failed cycle never reaches
//! its offset commit, the next run re-polls from the last committed offset;
//! duplicates across a failed cycle are expected (at-least-once).
//!
//! # Error Categories
//!
//! | Error Type | Source | Description |
//! |------------|--------|-------------|
//! | `Kafka` | broker | Connectivity, auth or protocol failure in a named client operation |
//! | `Publish` | broker | A send was rejected or timed out (includes oversized records) |
//! | `Commit` | broker | The cycle's offset commit failed |
//! | `Baseline` | startup | The destination tail scan could not be completed |
//! | `Config` | startup | Missing or inconsistent settings |

use thiserror::Error;

/// Result type alias for mirroring operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors that can occur while mirroring.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Kafka client error during a named operation (create, subscribe,
    /// poll, metadata, ...). Covers connectivity and auth failures.
    #[error("Kafka error ({operation}): {source}")]
    Kafka {
        operation: &'static str,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    /// The destination broker rejected or timed out a send.
    ///
    /// Oversized records (beyond `message.max.bytes`) surface here too.
    #[error("Publish to '{topic}' failed: {message}")]
    Publish { topic: String, message: String },

    /// The cycle's offset commit failed. The next successful cycle re-polls
    /// from the last committed offset.
    #[error("Offset commit failed: {0}")]
    Commit(#[source] rdkafka::error::KafkaError),

    /// The lookback scan of the destination tail could not be completed.
    #[error("Baseline scan failed: {0}")]
    Baseline(String),

    /// Invalid or missing configuration. Fix the environment and restart.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MirrorError {
    /// Create a Kafka error tagged with the client operation that failed.
    pub fn kafka(operation: &'static str, source: rdkafka::error::KafkaError) -> Self {
        Self::Kafka { operation, source }
    }

    /// Create a publish error for the given destination topic.
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised before the engine entered its
    /// steady-state loop (settings or baseline reconstruction).
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Baseline(_))
    }
}

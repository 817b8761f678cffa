//! Settings for the mirroring daemon.
//!
//! Two kinds of settings exist:
//!
//! - [`KafkaSettings`]: connection parameters for one side (source or
//!   destination), loaded once per process from namespaced environment
//!   variables and never mutated.
//! - [`EngineConfig`]: tunables for the steady-state loop and the lookback
//!   scan, with serde defaults matching the deployed values.
//!
//! # Environment Variables
//!
//! With `--src=prod`, the source side reads (uppercased prefix):
//!
//! ```text
//! PROD_KAFKA_SERVER             bootstrap servers (required)
//! PROD_KAFKA_TOPIC              topic name (required)
//! PROD_KAFKA_USERNAME           SASL username
//! PROD_KAFKA_PASSWORD           SASL password
//! PROD_KAFKA_SASL_MECHANISM     e.g. PLAIN, SCRAM-SHA-512
//! PROD_KAFKA_SECURITY_PROTOCOL  e.g. SASL_SSL
//! PROD_KAFKA_CA_FILE            CA certificate path
//! PROD_KAFKA_CERT_FILE          client certificate path
//! PROD_KAFKA_KEY_FILE           client key path
//! ```
//!
//! `CERT_FILE` and `KEY_FILE` must be given together or not at all.

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings for one side of the mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaSettings {
    /// Bootstrap servers, comma separated.
    pub servers: String,

    /// Topic to consume from (source) or publish to (destination).
    pub topic: String,

    /// SASL username, if the cluster requires authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// SASL password.
    #[serde(default)]
    pub password: Option<String>,

    /// SASL mechanism (e.g. `PLAIN`, `SCRAM-SHA-512`).
    #[serde(default)]
    pub sasl_mechanism: Option<String>,

    /// Security protocol (e.g. `SASL_SSL`, `SSL`, `PLAINTEXT`).
    #[serde(default)]
    pub security_protocol: Option<String>,

    /// CA certificate file for TLS.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Client certificate file. Requires `key_file`.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Client key file. Requires `cert_file`.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl KafkaSettings {
    /// Load settings for one side from `<NAME>_KAFKA_*` environment
    /// variables, where `<NAME>` is the uppercased logical label given on
    /// the command line (`--src`/`--dest`).
    ///
    /// Empty values are treated as unset. `SERVER` and `TOPIC` are required.
    pub fn from_env(name: &str) -> Result<Self> {
        let prefix = name.to_uppercase();
        let var = |suffix: &str| {
            std::env::var(format!("{prefix}_KAFKA_{suffix}"))
                .ok()
                .filter(|v| !v.is_empty())
        };

        let servers = var("SERVER")
            .ok_or_else(|| MirrorError::Config(format!("{prefix}_KAFKA_SERVER is not set")))?;
        let topic = var("TOPIC")
            .ok_or_else(|| MirrorError::Config(format!("{prefix}_KAFKA_TOPIC is not set")))?;

        let settings = Self {
            servers,
            topic,
            username: var("USERNAME"),
            password: var("PASSWORD"),
            sasl_mechanism: var("SASL_MECHANISM"),
            security_protocol: var("SECURITY_PROTOCOL"),
            ca_file: var("CA_FILE").map(PathBuf::from),
            cert_file: var("CERT_FILE").map(PathBuf::from),
            key_file: var("KEY_FILE").map(PathBuf::from),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check internal consistency: a client certificate and key must be
    /// given together or not at all.
    pub fn validate(&self) -> Result<()> {
        match (&self.cert_file, &self.key_file) {
            (Some(_), None) | (None, Some(_)) => Err(MirrorError::Config(
                "cert_file and key_file must be given together".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Create minimal plaintext settings for testing.
    pub fn for_testing(servers: &str, topic: &str) -> Self {
        Self {
            servers: servers.to_string(),
            topic: topic.to_string(),
            username: None,
            password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ca_file: None,
            cert_file: None,
            key_file: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EngineConfig: steady-state loop and lookback tunables
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunables for the mirroring loop and the lookback scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum records fetched per poll cycle (and per lookback drain).
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,

    /// Bound on one poll (and on the lookback drain) as a duration string.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: String,

    /// Sleep between cycles, to avoid tight-looping on an idle source.
    #[serde(default = "default_cycle_delay")]
    pub cycle_delay: String,

    /// How far behind the newest destination record the lookback scan
    /// extends. Bounds the restart re-scan while absorbing clock skew and
    /// commit lag.
    #[serde(default = "default_lookback")]
    pub lookback: String,

    /// Suffix of the consumer group name. Stable across restarts so that
    /// committed offsets persist per destination topic.
    #[serde(default = "default_group_suffix")]
    pub group_suffix: String,

    /// Per-send acknowledgement bound for the destination producer.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout: String,
}

fn default_max_poll_records() -> usize {
    1000
}

fn default_poll_timeout() -> String {
    "10s".to_string()
}

fn default_cycle_delay() -> String {
    "5s".to_string()
}

fn default_lookback() -> String {
    "30m".to_string()
}

fn default_group_suffix() -> String {
    "vq1".to_string()
}

fn default_ack_timeout() -> String {
    "30s".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_poll_records: default_max_poll_records(),
            poll_timeout: default_poll_timeout(),
            cycle_delay: default_cycle_delay(),
            lookback: default_lookback(),
            group_suffix: default_group_suffix(),
            ack_timeout: default_ack_timeout(),
        }
    }
}

impl EngineConfig {
    /// Parse `poll_timeout` to a Duration.
    pub fn poll_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.poll_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Parse `cycle_delay` to a Duration.
    pub fn cycle_delay_duration(&self) -> Duration {
        humantime::parse_duration(&self.cycle_delay).unwrap_or(Duration::from_secs(5))
    }

    /// Parse `lookback` to a Duration.
    pub fn lookback_duration(&self) -> Duration {
        humantime::parse_duration(&self.lookback).unwrap_or(Duration::from_secs(1800))
    }

    /// Parse `ack_timeout` to a Duration.
    pub fn ack_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.ack_timeout).unwrap_or(Duration::from_secs(30))
    }

    /// The consumer group for a given destination topic:
    /// `mirroring_<dest-topic>_<suffix>`.
    pub fn consumer_group(&self, dest_topic: &str) -> String {
        format!("mirroring_{}_{}", dest_topic, self.group_suffix)
    }

    /// Small bounds suitable for tests.
    pub fn for_testing() -> Self {
        Self {
            max_poll_records: 10,
            poll_timeout: "100ms".to_string(),
            cycle_delay: "10ms".to_string(),
            lookback: "30m".to_string(),
            group_suffix: "vq1".to_string(),
            ack_timeout: "1s".to_string(),
        }
    }
}

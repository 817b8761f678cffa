//! Shared test utilities for the engine tests.
//!
//! Provides recording mock implementations of the source-consumer and
//! destination-producer seams, plus record builders.

pub mod mock_kafka;

pub use mock_kafka::*;

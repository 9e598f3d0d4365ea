//! # Integration Tests
//!
//! Dispatchers talking to each other, or to raw peers, over the channel
//! transport. Each module covers one protocol concern end to end.

pub mod error_envelopes;
pub mod relay;
pub mod signatures;
pub mod telemetry;

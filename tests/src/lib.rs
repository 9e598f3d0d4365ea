//! # OCPP Dispatch Test Suite
//!
//! Multi-node flows over the in-memory channel transport.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Node builder, raw peers, polling helpers
//! │
//! └── integration/      # End-to-end flows between dispatchers
//!     ├── request_response.rs
//!     ├── error_envelopes.rs
//!     ├── signatures.rs
//!     ├── relay.rs
//!     └── telemetry.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p ocpp-tests
//!
//! # By category
//! cargo test -p ocpp-tests integration::relay::
//! cargo test -p ocpp-tests integration::signatures::
//! ```

#![allow(unused_variables)]
#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

pub mod harness;
pub mod integration;

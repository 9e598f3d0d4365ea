//! # OCPP Dispatch - Generic Message Dispatch Core
//!
//! Turns inbound OCPP-J text frames into typed requests, runs them through
//! registered handlers, and emits exactly one response per request. Sends
//! requests on behalf of the application and correlates their replies.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                              DISPATCHER                               │
//! ├───────────────────────────────────────────────────────────────────────┤
//! │   Transport ──▶ receive() ──▶ OcppFrame::parse                        │
//! │                                   │                                   │
//! │             ┌─────────────────────┼─────────────────────┐             │
//! │             ▼                     ▼                     ▼             │
//! │      not for this node      CALL for this node    replies/errors      │
//! │       relay::forward        ActionRegistry        PendingRequestStore │
//! │                                   │               SentResponseCache   │
//! │                                   ▼                                   │
//! │          parse ─▶ verify ─▶ handlers ─▶ select ─▶ sign ─▶ emit        │
//! │                                                                       │
//! │   send_request() ─▶ sign ─▶ emit CALL ─▶ await reply | timeout        │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ocpp_dispatch::{Dispatcher, DispatcherConfig};
//! use ocpp_types::messages::{HeartbeatRequest, HeartbeatResponse};
//!
//! let dispatcher = Dispatcher::builder(DispatcherConfig::for_node("CSMS"))
//!     .transport(transport)
//!     .build()?;
//! dispatcher.on::<HeartbeatRequest>(|_ctx, _req| async move {
//!     anyhow::Ok(Some(HeartbeatResponse { current_time: chrono::Utc::now() }))
//! })?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handler;
pub mod pending;
mod pipeline;
pub mod registry;
pub mod relay;
mod requester;
pub mod response_cache;
pub mod transport;

// Re-exports for public API
pub use config::{ConfigError, DispatcherConfig, HandlerSelection, SigningFailurePolicy};
pub use dispatcher::{Dispatcher, DispatcherBuilder, MIN_MAINTENANCE_INTERVAL};
pub use error::{DispatchError, TransportError};
pub use events::{
    ExceptionEvent, RequestErrorReceivedEvent, RequestReceivedEvent, ResponseErrorReceivedEvent,
    ResponseReceivedEvent, ResponseSentEvent,
};
pub use handler::{Handler, HandlerContext, HandlerId};
pub use pending::{PendingRequestStore, PendingStats};
pub use registry::{ActionRegistry, ActionSlots};
pub use relay::{ForwardAll, ForwardDecision, ForwardingPolicy};
pub use response_cache::{SentResponse, SentResponseCache};
pub use transport::channel::{self, ChannelTransport, Inbox, WireMessage};
pub use transport::{InboundFrame, OutboundFrame, Transport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

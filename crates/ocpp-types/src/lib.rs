//! # OCPP Types Crate
//!
//! The vocabulary every other crate in the workspace speaks:
//!
//! - **Identifiers**: node, request, event-tracking and connection ids.
//! - **Addressing**: [`NetworkPath`] and [`SourceRouting`], and the pure
//!   [`reply_route`] computation.
//! - **Frames**: OCPP-J array envelopes in standard and overlay-network layout.
//! - **Message contract**: [`RequestPayload`]/[`ResponsePayload`] and the
//!   generic [`Request`]/[`Response`] envelopes with their taxonomy factories.
//! - **Result taxonomy**: [`ResultCode`] and [`DispatchResult`].
//!
//! ## Design Principles
//!
//! - **Uniform responses**: a substituted failure has the same type as a real
//!   answer; only `result.code` tells them apart.
//! - **No panics on input**: every parse returns a typed error.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod addressing;
pub mod error_code;
pub mod errors;
pub mod frame;
pub mod identifiers;
pub mod message;
pub mod messages;
pub mod result;
pub mod signature;

pub use addressing::{reply_route, NetworkPath, ReplyRoute, SourceRouting};
pub use error_code::ErrorCode;
pub use errors::{AddressingError, FrameError, IdentifierError, ParseError};
pub use frame::{
    CallFrame, CallResultFrame, FrameRejection, FrameRouting, MessageTypeId, NetworkingMode,
    OcppErrorMessage, OcppFrame,
};
pub use identifiers::{ConnectionId, EventTrackingId, NetworkingNodeId, RequestId};
pub use message::{
    canonical_json, runtime_between, InboundRequestMeta, Request, RequestPayload, Response,
    ResponsePayload, DEFAULT_REQUEST_TIMEOUT,
};
pub use result::{DispatchResult, ResultCode};
pub use signature::{MessageDirection, Signature, SigningMethod, SIGNATURES_FIELD};

/// Default upper bound on an inbound frame, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

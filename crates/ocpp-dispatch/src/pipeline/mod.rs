//! The generic pipelines every action runs through.
//!
//! | Module | Frame | Side |
//! |--------|-------|------|
//! | `request` | CALL | responder |
//! | `response` | CALLRESULT | requester |
//! | `error` | CALLERROR / CALLRESULTERROR | requester / responder |

pub(crate) mod error;
pub(crate) mod request;
pub(crate) mod response;

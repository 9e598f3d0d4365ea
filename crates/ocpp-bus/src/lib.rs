//! # OCPP Bus - Lifecycle Notification
//!
//! Two ways to watch the dispatch core, neither of which can influence the
//! outcome of an exchange:
//!
//! - **Observer sets** ([`ObserverSet`]): typed, per-action subscribers that
//!   receive the full request/response. Faults are isolated and logged.
//! - **Event bus** ([`InMemoryEventBus`]): untyped [`DispatchEvent`]
//!   summaries for metrics, audit logs and dashboards.
//!
//! ```text
//! ┌──────────────┐    notify()     ┌──────────────┐
//! │  Dispatcher  │ ──────────────▶ │ ObserverSet  │ ──▶ typed observers
//! │              │                 └──────────────┘
//! │              │    publish()    ┌──────────────┐
//! │              │ ──────────────▶ │  Event Bus   │ ──▶ subscribe() / event_stream()
//! └──────────────┘                 └──────────────┘
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod observers;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{DispatchEvent, EventFilter, EventTopic};
pub use observers::{NotifyReport, Observer, ObserverId, ObserverSet};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

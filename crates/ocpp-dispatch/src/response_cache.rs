//! # Time-Bounded Sent-Response Cache
//!
//! Remembers responses this node emitted so that a later CALLRESULTERROR can
//! be tied back to its action and the time between sending the response and
//! receiving the rejection can be computed.
//!
//! - Entries are valid for a fixed TTL after insertion
//! - Expired entries are garbage-collected on insert and by [`SentResponseCache::purge_expired`]
//! - This bounds memory usage without a background task

use chrono::{DateTime, Utc};
use ocpp_types::RequestId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A response as it went on the wire.
#[derive(Debug, Clone)]
pub struct SentResponse {
    pub action: &'static str,
    pub response_timestamp: DateTime<Utc>,
    pub payload: Value,
}

struct Entry {
    response: SentResponse,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<RequestId, Entry>,
    last_gc: Instant,
}

/// Time-bounded cache of sent responses, keyed by request id.
pub struct SentResponseCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    gc_interval: Duration,
}

impl SentResponseCache {
    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_gc_interval(ttl, Self::DEFAULT_GC_INTERVAL)
    }

    #[must_use]
    pub fn with_gc_interval(ttl: Duration, gc_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                last_gc: Instant::now(),
            }),
            ttl,
            gc_interval,
        }
    }

    /// Remember a response. Replaces any earlier entry for the same id.
    pub fn insert(&self, request_id: RequestId, response: SentResponse) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if now.duration_since(inner.last_gc) > self.gc_interval {
            let ttl = self.ttl;
            inner
                .entries
                .retain(|_, entry| now.duration_since(entry.inserted_at) <= ttl);
            inner.last_gc = now;
        }

        inner.entries.insert(
            request_id,
            Entry {
                response,
                inserted_at: now,
            },
        );
    }

    /// Remove and return the response for `request_id` if it has not expired.
    pub fn take(&self, request_id: &RequestId) -> Option<SentResponse> {
        let entry = self.inner.lock().entries.remove(request_id)?;
        (entry.inserted_at.elapsed() <= self.ttl).then_some(entry.response)
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.duration_since(entry.inserted_at) <= ttl);
        inner.last_gc = now;
        before - inner.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

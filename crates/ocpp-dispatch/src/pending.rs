//! Pending Request Store - correlates sent requests with their replies.
//!
//! Maps request ids to the requester waiting for a CALLRESULT or CALLERROR.

use crate::error::DispatchError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ocpp_types::{ConnectionId, FrameRouting, NetworkingMode, OcppErrorMessage, RequestId};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What arrived for a pending request.
#[derive(Debug, Clone)]
pub enum PendingReply {
    /// A CALLRESULT, not yet parsed.
    Result {
        payload: Value,
        routing: FrameRouting,
        connection: ConnectionId,
        mode: NetworkingMode,
    },
    /// A CALLERROR.
    Error(OcppErrorMessage),
}

/// A pending request waiting for response
struct PendingRequest {
    /// Channel to send the reply
    sender: oneshot::Sender<PendingReply>,
    /// When request was registered
    created_at: Instant,
    /// Action name (for logging)
    action: &'static str,
    /// Timeout for this request
    timeout: Duration,
}

/// Statistics for pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests completed
    pub total_completed: AtomicU64,
    /// Total requests timed out
    pub total_timeouts: AtomicU64,
    /// Total requests cancelled (dropped)
    pub total_cancelled: AtomicU64,
}

/// Pending request store.
///
/// Flow:
/// 1. The requester calls `register()` to get a oneshot receiver
/// 2. The requester sends the CALL
/// 3. The inbound path receives the reply and calls `complete()`
/// 4. The requester awaits the receiver or times out and calls `expire()`
pub struct PendingRequestStore {
    /// Map of request id to pending request
    pending: DashMap<RequestId, PendingRequest>,
    /// Statistics
    stats: Arc<PendingStats>,
}

impl PendingRequestStore {
    /// Create a new pending request store
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a pending request and get a receiver for the reply.
    ///
    /// # Errors
    ///
    /// `DuplicateRequestId` if the id is already awaiting a reply.
    pub fn register(
        &self,
        request_id: RequestId,
        action: &'static str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<PendingReply>, DispatchError> {
        let (tx, rx) = oneshot::channel();

        match self.pending.entry(request_id.clone()) {
            Entry::Occupied(_) => return Err(DispatchError::DuplicateRequestId(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    sender: tx,
                    created_at: Instant::now(),
                    action,
                    timeout,
                });
            }
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            request_id = %request_id,
            action = action,
            "Registered pending request"
        );

        Ok(rx)
    }

    /// Complete a pending request with its reply.
    ///
    /// Returns true if the request was found and completed, false if not found or already completed.
    pub fn complete(&self, request_id: &RequestId, reply: PendingReply) -> bool {
        if let Some((_, pending)) = self.pending.remove(request_id) {
            let response_time = pending.created_at.elapsed();

            match pending.sender.send(reply) {
                Ok(()) => {
                    self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        request_id = %request_id,
                        action = pending.action,
                        response_time_ms = response_time.as_millis(),
                        "Completed pending request"
                    );
                    true
                }
                Err(_) => {
                    // Receiver was dropped (requester gave up)
                    self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        request_id = %request_id,
                        action = pending.action,
                        "Pending request receiver dropped"
                    );
                    false
                }
            }
        } else {
            warn!(
                request_id = %request_id,
                "Reply for unknown or expired request"
            );
            false
        }
    }

    /// The action of a pending request.
    #[must_use]
    pub fn action_of(&self, request_id: &RequestId) -> Option<&'static str> {
        self.pending.get(request_id).map(|pending| pending.action)
    }

    /// Remove a request whose requester stopped waiting because it timed out.
    pub fn expire(&self, request_id: &RequestId) -> bool {
        if self.pending.remove(request_id).is_some() {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Remove expired requests (TTL cleanup).
    ///
    /// Returns the number of requests removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, request| {
            let elapsed = now.duration_since(request.created_at);
            if elapsed > request.timeout {
                warn!(
                    request_id = %id,
                    action = request.action,
                    elapsed_ms = elapsed.as_millis(),
                    timeout_ms = request.timeout.as_millis(),
                    "Removing expired pending request"
                );
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false // Remove
            } else {
                true // Keep
            }
        });

        removed
    }

    /// Get number of currently pending requests
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    /// Check if a request id is pending
    #[must_use]
    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Cancel a pending request
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        if self.pending.remove(request_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Cancel everything. Waiting requesters observe a dropped sender.
    pub fn cancel_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.stats
            .total_cancelled
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }
}

impl Default for PendingRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

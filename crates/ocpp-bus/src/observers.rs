//! # Observer Sets
//!
//! Typed multi-subscriber notification with fault isolation. Every observer
//! runs on its own task with an identical `Arc` of the event; an observer
//! that returns an error or panics is logged and counted, never propagated.
//!
//! Registration takes a write lock only while the list is modified.
//! Notification snapshots the list under a read lock and releases it before
//! any observer runs, so observers may subscribe or unsubscribe freely.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Trait for event observers.
#[async_trait]
pub trait Observer<E>: Send + Sync {
    /// Handle one event.
    async fn notify(&self, event: Arc<E>) -> anyhow::Result<()>;
}

#[async_trait]
impl<E, F, Fut> Observer<E> for F
where
    E: Send + Sync + 'static,
    F: Fn(Arc<E>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn notify(&self, event: Arc<E>) -> anyhow::Result<()> {
        (self)(event).await
    }
}

/// Handle returned by [`ObserverSet::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Outcome of one notification round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyReport {
    /// Observers that completed successfully.
    pub delivered: usize,
    /// Observers that returned an error or panicked.
    pub failed: usize,
}

impl NotifyReport {
    /// Total observers notified.
    #[must_use]
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Ordered, id-addressed set of observers for one event type.
pub struct ObserverSet<E> {
    name: &'static str,
    observers: RwLock<Vec<(ObserverId, Arc<dyn Observer<E>>)>>,
    next_id: AtomicU64,
}

impl<E: Send + Sync + 'static> ObserverSet<E> {
    /// Create an empty set. `name` labels log lines.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add an observer; it is notified after every earlier one is started.
    pub fn subscribe(&self, observer: impl Observer<E> + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(observer)));
        debug!(set = self.name, observer = id.0, "Observer subscribed");
        id
    }

    /// Remove an observer. Returns true if it was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        before != observers.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Notify every observer concurrently and wait for all of them.
    pub async fn notify(&self, event: E) -> NotifyReport {
        let snapshot: Vec<Arc<dyn Observer<E>>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        if snapshot.is_empty() {
            return NotifyReport::default();
        }

        let event = Arc::new(event);
        let tasks = snapshot.into_iter().map(|observer| {
            let event = Arc::clone(&event);
            tokio::spawn(async move { observer.notify(event).await })
        });

        let mut report = NotifyReport::default();
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(set = self.name, error = %e, "Observer failed");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(set = self.name, error = %e, "Observer panicked");
                }
            }
        }
        report
    }
}

impl<E> fmt::Debug for ObserverSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("name", &self.name)
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

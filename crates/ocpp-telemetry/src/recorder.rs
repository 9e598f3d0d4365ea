//! Feeds bus events into metrics and the log.

use crate::metrics::DispatchMetrics;
use ocpp_bus::{DispatchEvent, EventFilter, InMemoryEventBus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Record one event.
pub fn record_event(metrics: &DispatchMetrics, event: &DispatchEvent) {
    trace!(
        topic = ?event.topic(),
        action = event.action().unwrap_or("-"),
        request_id = %event.request_id(),
        "Dispatch event"
    );
    metrics.record(event);
}

/// Subscribe to `bus` and record every event until `shutdown` fires or the
/// bus is dropped.
pub fn spawn_metrics_recorder(
    bus: &InMemoryEventBus,
    metrics: DispatchMetrics,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut subscription = bus.subscribe(EventFilter::all());
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(event) => record_event(&metrics, &event),
                    None => break,
                },
            }
        }
        debug!("Metrics recorder stopped");
    })
}

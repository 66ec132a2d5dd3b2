//! Event notification for phase and section status changes.
//!
//! `EventNotifier` fans `WorkflowEvent`s out to any number of subscribers over
//! a tokio broadcast channel. Publishing is fire-and-forget: a notifier with no
//! subscribers drops events silently, and a slow subscriber that lags behind
//! the channel capacity is told how many events it missed.

use docket_common::{PhaseStatus, WorkflowEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Publishes workflow events to external subscribers.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventNotifier {
    /// Create a notifier buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; returns the number of subscribers that received it.
    pub fn publish(&self, event: WorkflowEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Mirror every event into the tracing log until the notifier is dropped.
    pub fn spawn_log_sink(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event log sink lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_event(event: &WorkflowEvent) {
    match (event.status, event.section_id.as_deref()) {
        (_, Some(section)) => debug!(
            case_id = %event.case_id,
            phase = %event.phase_id,
            section,
            "{}",
            event.message
        ),
        (PhaseStatus::Active, None) => debug!(
            case_id = %event.case_id,
            phase = %event.phase_id,
            progress = event.progress,
            "{}",
            event.message
        ),
        (PhaseStatus::Error, None) => warn!(
            case_id = %event.case_id,
            phase = %event.phase_id,
            "{}",
            event.message
        ),
        (status, None) => info!(
            case_id = %event.case_id,
            phase = %event.phase_id,
            %status,
            "{}",
            event.message
        ),
    }
}

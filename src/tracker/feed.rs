use super::error::TrackerError;
use super::event::PresenceEvent;
use super::tracker::SessionTracker;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Channel-driven ingest loop feeding presence events into the tracker
///
/// This is the seam the external presence gateway plugs into: it pushes
/// `PresenceEvent`s onto the sender half and the feed drives the tracker on
/// a spawned task. One bad event never stops the loop — errors are logged
/// and the next event is processed. Redelivery of a failed event is the
/// gateway's decision, not the feed's.
pub struct PresenceFeed {
    tracker: Arc<SessionTracker>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceFeed {
    pub fn new(tracker: Arc<SessionTracker>) -> Self {
        Self {
            tracker,
            task_handle: Mutex::new(None),
        }
    }

    /// Start consuming events from the receiver
    ///
    /// The loop runs until the sender side is dropped or `stop` is called.
    pub async fn start(&self, mut events: mpsc::Receiver<PresenceEvent>) {
        let tracker = Arc::clone(&self.tracker);

        let task = tokio::spawn(async move {
            info!("Presence feed started");

            while let Some(event) = events.recv().await {
                match tracker.handle_presence_event(&event).await {
                    Ok(()) => {}
                    Err(err @ TrackerError::StateInconsistency { .. }) => {
                        // Recoverable: the member starts fresh on their next join
                        warn!("Dropped presence event: {}", err);
                    }
                    Err(err) => {
                        error!("Failed to process presence event: {:#}", anyhow::Error::new(err));
                    }
                }
            }

            info!("Presence feed stopped");
        });

        let mut handle = self.task_handle.lock().await;
        *handle = Some(task);
    }

    /// Wait for the ingest task to drain and finish
    ///
    /// The sender half must be dropped first, otherwise this waits forever.
    pub async fn stop(&self) {
        let mut handle = self.task_handle.lock().await;
        if let Some(task) = handle.take() {
            if let Err(e) = task.await {
                error!("Presence feed task panicked: {}", e);
            }
        }
    }
}

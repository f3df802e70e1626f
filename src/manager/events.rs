//! Lifecycle notification fan-out
//!
//! Notifications are for logging and telemetry. Publishing never blocks and
//! never fails; a subscriber that falls behind skips what it missed.

use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::types::session::{SessionEvent, SessionEventKind};

pub(crate) struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        log::debug!("Session event: {event:?}");
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    /// Stream of notifications published from now on, filtered by `kind`
    ///
    /// Ends once every sender is gone.
    pub(crate) fn subscribe(
        &self,
        kind: Option<SessionEventKind>,
    ) -> impl Stream<Item = SessionEvent> + Send + use<> {
        let mut rx = self.tx.subscribe();

        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if kind.is_none_or(|kind| event.kind() == kind) {
                            yield event;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Event subscriber lagged; skipped {skipped} notifications");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

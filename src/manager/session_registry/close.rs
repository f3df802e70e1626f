//! Closing sessions

use futures::future::join_all;
use std::sync::Arc;

use crate::types::session::{SessionEvent, SessionState};

use super::super::session::SessionSlot;
use super::core::SessionRegistry;

impl SessionRegistry {
    /// Close the named session
    ///
    /// Closing a name that is not live is a no-op. Returns whether a session
    /// was closed.
    pub async fn close(&self, name: &str) -> bool {
        let slot = self.inner.directory.lock().await.live.remove(name);
        match slot {
            Some(slot) => {
                self.close_slot(name, &slot).await;
                true
            }
            None => {
                log::debug!("[{name}] close requested for unknown session");
                false
            }
        }
    }

    /// Close every live session concurrently
    ///
    /// Each close is independent of the others. Returns how many sessions
    /// were closed.
    pub async fn close_all(&self) -> usize {
        let slots: Vec<(String, Arc<SessionSlot>)> =
            self.inner.directory.lock().await.live.drain().collect();
        let count = slots.len();

        join_all(
            slots
                .iter()
                .map(|(name, slot)| self.close_slot(name, slot)),
        )
        .await;

        count
    }

    async fn close_slot(&self, name: &str, slot: &SessionSlot) {
        // Waits for an in-flight execute on this session to finish first
        slot.runtime.lock().await.close().await;
        slot.set_state(SessionState::Disconnected);

        log::info!("[{name}] session closed");
        self.inner.events.publish(SessionEvent::SessionClosed {
            name: name.to_string(),
        });
    }
}

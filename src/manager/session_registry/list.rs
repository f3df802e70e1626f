//! Session snapshots and notification subscriptions

use futures::Stream;

use crate::error::Result;
use crate::types::session::{SessionEvent, SessionEventKind, SessionInfo};

use super::core::SessionRegistry;

impl SessionRegistry {
    /// Snapshot of every live session, oldest first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .inner
            .directory
            .lock()
            .await
            .live
            .values()
            .map(|slot| slot.snapshot())
            .collect();

        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        sessions
    }

    /// Snapshot of the named session
    ///
    /// # Errors
    /// Returns `SessionNotFound` if no live session has this name
    pub async fn get(&self, name: &str) -> Result<SessionInfo> {
        Ok(self.inner.lookup(name).await?.snapshot())
    }

    /// Interpreter process id of a local session; `None` for remote sessions
    ///
    /// Waits for an in-flight execute on the session to finish.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if no live session has this name
    pub async fn pid(&self, name: &str) -> Result<Option<u32>> {
        let slot = self.inner.lookup(name).await?;
        let runtime = slot.runtime.lock().await;
        Ok(runtime.pid())
    }

    /// Lifecycle notifications published from now on
    ///
    /// `None` subscribes to every kind. The stream ends when the registry is
    /// dropped.
    pub fn subscribe(
        &self,
        kind: Option<SessionEventKind>,
    ) -> impl Stream<Item = SessionEvent> + Send + use<> {
        self.inner.events.subscribe(kind)
    }
}

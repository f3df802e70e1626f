//! Command routing to the owning runtime

use std::time::Duration;

use crate::error::Result;
use crate::types::session::CommandOutput;

use super::core::SessionRegistry;

impl SessionRegistry {
    /// Execute a command in the named session
    ///
    /// Last-used is updated before dispatch. Concurrent calls on one session
    /// queue behind each other; different sessions run independently.
    ///
    /// # Errors
    /// - `SessionNotFound` if no live session has this name
    /// - `CommandTimeout` / `ExecutionFailure` from the runtime
    pub async fn execute(
        &self,
        name: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let slot = self.inner.lookup(name).await?;
        slot.touch();

        let mut runtime = slot.runtime.lock().await;
        log::debug!("[{name}] executing command ({} bytes)", command.len());
        let result = runtime.execute(command, timeout).await;
        slot.set_state(runtime.state());
        result
    }
}

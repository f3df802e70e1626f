//! Remote session runtime
//!
//! A remote session holds no process of its own. Every execution starts a
//! short-lived bridging subprocess (`ssh` over a multiplexed control socket,
//! or a PowerShell script driving a named PSSession) that establishes or
//! reuses the session's remote connection and forwards one command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, ShellError};
use crate::types::options::{ManagerOptions, RemoteOptions};
use crate::types::session::{CommandOutput, SessionState};

use super::dialect::ShellDialect;
use super::oneshot::run_bounded;

/// Session bound to a remote host
#[derive(Debug)]
pub struct RemoteSession {
    name: String,
    dialect: ShellDialect,
    remote: RemoteOptions,
    working_dir: Option<PathBuf>,
    config: Arc<ManagerOptions>,
    state: SessionState,
}

impl RemoteSession {
    /// Record a remote session; no connection is made until the first command
    #[must_use]
    pub fn new(
        name: &str,
        dialect: ShellDialect,
        remote: RemoteOptions,
        working_dir: Option<PathBuf>,
        config: Arc<ManagerOptions>,
    ) -> Self {
        log::debug!("[{name}] remote session for {} via {dialect:?}", remote.host);
        Self {
            name: name.to_string(),
            dialect,
            remote,
            working_dir,
            config,
            state: SessionState::Connected,
        }
    }

    /// Session name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection options of this session
    #[must_use]
    pub const fn options(&self) -> &RemoteOptions {
        &self.remote
    }

    /// Current connection state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Forward one command to the remote host
    ///
    /// The bridging subprocess's exit status decides `success`; a non-zero
    /// exit with empty stderr is still a failure.
    ///
    /// # Errors
    /// - `ExecutionFailure` if the session is closed or the bridge cannot run
    /// - `CommandTimeout` if the bridge outlives `timeout` (it is killed)
    pub async fn execute(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        if self.state != SessionState::Connected {
            return Err(ShellError::execution(format!(
                "session {} is not connected (state: {:?})",
                self.name, self.state
            )));
        }

        let command = self.dialect.rewrite_env_prefix(command);
        let command = match self.working_dir {
            Some(ref dir) => self.dialect.within_directory(dir, &command),
            None => command.into_owned(),
        };

        let bridge = self
            .dialect
            .bridge(&self.config, &self.name, &self.remote, &command);
        log::debug!("[{}] bridging via {}", self.name, bridge.program.display());

        run_bounded(&bridge, timeout, Some(&self.name)).await
    }

    /// Tear down the remote connection
    ///
    /// Runs the removal bridge once, bounded by the control timeout, and
    /// ignores its outcome. Calling it twice is harmless.
    pub async fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Disconnected;

        let removal = self
            .dialect
            .bridge_removal(&self.config, &self.name, &self.remote);
        match run_bounded(&removal, self.config.control_timeout, Some(&self.name)).await {
            Ok(output) if output.success => {
                log::debug!("[{}] remote connection removed", self.name);
            }
            Ok(output) => {
                log::debug!("[{}] remote removal reported: {}", self.name, output.stderr);
            }
            Err(e) => log::warn!("[{}] remote removal failed: {e}", self.name),
        }
    }
}

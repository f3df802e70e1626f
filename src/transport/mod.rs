//! Transport layer between the registries and interpreter subprocesses
//!
//! This module provides the channel abstraction and its two implementations:
//! a long-lived local interpreter multiplexed through sentinel framing, and a
//! remote host reached through one bridging subprocess per command.

pub mod dialect;
pub mod framing;
pub mod local;
pub mod remote;

mod oneshot;

use std::time::Duration;

use crate::error::Result;
use crate::types::session::{CommandOutput, SessionState};

pub(crate) use oneshot::run_bounded;

/// Channel executing commands for one session
///
/// Implementations assume at most one `execute` in flight; callers serialize.
pub trait CommandChannel: Send {
    /// Execute one command
    ///
    /// # Errors
    /// Returns `CommandTimeout` when `timeout` elapses and `ExecutionFailure`
    /// when the channel cannot run the command
    fn execute(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<CommandOutput>> + Send;

    /// Current connection state
    fn state(&self) -> SessionState;

    /// Release the channel; never fails
    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;
}

impl CommandChannel for LocalSession {
    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        Self::execute(self, command, timeout).await
    }

    fn state(&self) -> SessionState {
        Self::state(self)
    }

    async fn close(&mut self) {
        Self::close(self).await;
    }
}

impl CommandChannel for RemoteSession {
    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        Self::execute(self, command, timeout).await
    }

    fn state(&self) -> SessionState {
        Self::state(self)
    }

    async fn close(&mut self) {
        Self::close(self).await;
    }
}

pub use dialect::{Invocation, ShellDialect};
pub use framing::{CapturePhase, FramedOutput, Framer, MarkerFactory, Markers, StreamKind};
pub use local::{ExitNotice, ExitReporter, LocalSession};
pub use remote::RemoteSession;

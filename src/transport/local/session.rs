//! Local session state and command execution

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Result, ShellError};
use crate::transport::dialect::ShellDialect;
use crate::transport::framing::{FramedOutput, Framer, MarkerFactory};
use crate::types::identifiers::CorrelationId;
use crate::types::session::{CommandOutput, SessionState};

/// Framer plus the one waiting `execute`, shared with the reader tasks
pub(super) struct CaptureSlot {
    pub framer: Framer,
    pub waiter: Option<(CorrelationId, oneshot::Sender<FramedOutput>)>,
    /// Set once stdout reached end of stream
    pub closed: bool,
}

pub(super) type SharedSlot = Arc<parking_lot::Mutex<CaptureSlot>>;

impl CaptureSlot {
    pub(super) fn shared() -> SharedSlot {
        Arc::new(parking_lot::Mutex::new(Self {
            framer: Framer::new(),
            waiter: None,
            closed: false,
        }))
    }
}

/// Session backed by a long-lived local interpreter subprocess
///
/// At most one command is in flight at a time; callers sharing a session
/// must serialize their `execute` calls (the session registry does).
pub struct LocalSession {
    pub(super) name: String,
    pub(super) dialect: ShellDialect,
    pub(super) markers: MarkerFactory,
    pub(super) process: Option<Child>,
    pub(super) stdin: Option<ChildStdin>,
    pub(super) pid: Option<u32>,
    pub(super) slot: SharedSlot,
    pub(super) state: SessionState,
    pub(super) closing: Arc<AtomicBool>,
    pub(super) close_grace: Duration,
    pub(super) reader_tasks: Vec<JoinHandle<()>>,
}

impl LocalSession {
    /// Session name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id of the interpreter
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current connection state
    ///
    /// Reports `Disconnected` as soon as the interpreter's stdout has closed.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.state == SessionState::Connected && self.slot.lock().closed {
            SessionState::Disconnected
        } else {
            self.state
        }
    }

    /// Execute one command in the interpreter
    ///
    /// On timeout the interpreter keeps running; the command's late output is
    /// discarded by correlation id so it cannot leak into a later command.
    ///
    /// # Errors
    /// - `ExecutionFailure` if the session is not connected, stdin cannot be
    ///   written, or the interpreter exits before the command completes
    /// - `CommandTimeout` if the command does not complete within `timeout`
    pub async fn execute(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let state = self.state();
        if state != SessionState::Connected {
            return Err(ShellError::execution(format!(
                "session {} is not connected (state: {state:?})",
                self.name
            )));
        }

        let command = self.dialect.rewrite_env_prefix(command);
        let output = self.run_framed(&command, timeout).await?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.success,
            exit_code: None,
            truncated: output.truncated,
            timestamp: Utc::now(),
        })
    }

    /// Frame, send and await one command
    pub(super) async fn run_framed(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<FramedOutput> {
        let (id, markers) = self.markers.next();
        let wrapped = self.dialect.frame(command, &markers);
        let (tx, rx) = oneshot::channel();

        {
            let mut slot = self.slot.lock();
            if slot.closed {
                return Err(ShellError::execution(format!(
                    "session {} interpreter has exited",
                    self.name
                )));
            }
            slot.framer.arm(id, markers);
            slot.waiter = Some((id, tx));
        }

        if let Err(e) = self.write_stdin(&wrapped).await {
            self.disarm(id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(_)) => Err(ShellError::execution(format!(
                "session {} interpreter exited before command {id} completed",
                self.name
            ))),
            Err(_) => {
                self.disarm(id);
                log::debug!("[{}] command {id} timed out; detached", self.name);
                Err(ShellError::command_timeout(timeout, Some(&self.name)))
            }
        }
    }

    fn disarm(&self, id: CorrelationId) {
        let mut slot = self.slot.lock();
        slot.framer.disarm(id);
        if slot.waiter.as_ref().is_some_and(|(waiting, _)| *waiting == id) {
            slot.waiter = None;
        }
    }

    pub(super) async fn write_stdin(&mut self, data: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ShellError::execution(format!("session {} stdin not available", self.name)))?;

        stdin.write_all(data.as_bytes()).await.map_err(|e| {
            ShellError::execution(format!("failed to write to session {}: {e}", self.name))
        })?;

        stdin.flush().await.map_err(|e| {
            ShellError::execution(format!("failed to flush session {}: {e}", self.name))
        })?;

        Ok(())
    }
}

impl std::fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSession")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for LocalSession {
    fn drop(&mut self) {
        self.drop_impl();
    }
}

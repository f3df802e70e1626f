//! Session state structures
//!
//! A live session is a `SessionSlot`: the snapshot record behind a short
//! synchronous lock, and the runtime behind an async lock that also
//! serializes execute calls on that session.

use chrono::Utc;
use std::time::Duration;

use crate::error::Result;
use crate::transport::{CommandChannel, LocalSession, RemoteSession};
use crate::types::identifiers::InstanceId;
use crate::types::options::RemoteOptions;
use crate::types::session::{CommandOutput, SessionInfo, SessionState};

/// Runtime owning a session's handle
///
/// Local-only and remote-only operations are reachable only on their variant.
#[derive(Debug)]
pub enum SessionRuntime {
    /// Long-lived local interpreter
    Local(LocalSession),
    /// Remote host reached through bridging subprocesses
    Remote(RemoteSession),
}

impl SessionRuntime {
    /// Interpreter process id (local sessions only)
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        match self {
            Self::Local(session) => session.pid(),
            Self::Remote(_) => None,
        }
    }

    /// Remote connection options (remote sessions only)
    #[must_use]
    pub const fn remote_options(&self) -> Option<&RemoteOptions> {
        match self {
            Self::Local(_) => None,
            Self::Remote(session) => Some(session.options()),
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self {
            Self::Local(session) => CommandChannel::state(session),
            Self::Remote(session) => CommandChannel::state(session),
        }
    }

    pub(super) async fn execute(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        match self {
            Self::Local(session) => CommandChannel::execute(session, command, timeout).await,
            Self::Remote(session) => CommandChannel::execute(session, command, timeout).await,
        }
    }

    pub(super) async fn close(&mut self) {
        match self {
            Self::Local(session) => CommandChannel::close(session).await,
            Self::Remote(session) => CommandChannel::close(session).await,
        }
    }
}

/// Live session entry held by the registry
pub(crate) struct SessionSlot {
    /// Incarnation; exit notices of an earlier process with the same name
    /// carry a different one
    pub instance: InstanceId,
    pub info: parking_lot::Mutex<SessionInfo>,
    pub runtime: tokio::sync::Mutex<SessionRuntime>,
}

impl SessionSlot {
    pub(crate) fn new(instance: InstanceId, info: SessionInfo, runtime: SessionRuntime) -> Self {
        Self {
            instance,
            info: parking_lot::Mutex::new(info),
            runtime: tokio::sync::Mutex::new(runtime),
        }
    }

    pub(crate) fn snapshot(&self) -> SessionInfo {
        self.info.lock().clone()
    }

    pub(crate) fn touch(&self) {
        self.info.lock().last_used_at = Utc::now();
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.info.lock().state = state;
    }
}

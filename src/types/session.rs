//! Session records, command results and lifecycle notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::options::RemoteOptions;

/// Host identifier recorded for local sessions
pub const LOCALHOST: &str = "localhost";

// ============================================================================
// Session State
// ============================================================================

/// Connection state of a session
///
/// `Connecting → Connected → Disconnected | Failed`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Subprocess started, readiness not yet proven
    Connecting,
    /// Commands may be executed
    Connected,
    /// Closed or the subprocess exited
    Disconnected,
    /// The subprocess failed
    Failed,
}

impl SessionState {
    /// Whether no further transitions are possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

/// Whether a session runs on this machine or on a remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    /// Long-lived local interpreter subprocess
    Local,
    /// Bridged to a remote host per command
    Remote,
}

// ============================================================================
// Requests
// ============================================================================

/// Request parameters for creating a session
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Unique session name
    pub name: String,
    /// Remote target; `None` creates a local session
    pub remote: Option<RemoteOptions>,
    /// Working directory: the local interpreter starts there, remote
    /// commands change into it first
    pub working_dir: Option<PathBuf>,
}

impl CreateSessionRequest {
    /// Request for a local session
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: None,
            working_dir: None,
        }
    }

    /// Request for a remote session
    pub fn remote(name: impl Into<String>, options: RemoteOptions) -> Self {
        Self {
            name: name.into(),
            remote: Some(options),
            working_dir: None,
        }
    }

    /// Set the working directory
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

// ============================================================================
// Snapshots and Results
// ============================================================================

/// Snapshot of a session returned by `list` and `get`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Unique session name
    pub name: String,

    /// Local or remote
    pub locality: Locality,

    /// Target host (`"localhost"` for local sessions)
    pub host: String,

    /// Current connection state
    pub state: SessionState,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the session last received a command
    pub last_used_at: DateTime<Utc>,

    /// Remote connection options (remote sessions only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteOptions>,
}

/// Result of one command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Captured standard output, trimmed
    pub stdout: String,

    /// Captured standard error, trimmed
    pub stderr: String,

    /// Whether the command completed successfully
    pub success: bool,

    /// Process exit code when the command ran in its own process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Whether captured output exceeded the buffer cap and lost its head
    #[serde(default)]
    pub truncated: bool,

    /// When the result was produced
    pub timestamp: DateTime<Utc>,
}

impl CommandOutput {
    /// Result record for a command that never produced output of its own
    ///
    /// Used when an error is folded into a plain result for callers that only
    /// render records.
    #[must_use]
    pub fn from_error(err: &crate::ShellError) -> Self {
        let stderr = if err.is_timeout() {
            format!("{err}. The command did not finish in time; retry with a longer timeout.")
        } else {
            err.to_string()
        };
        Self {
            stdout: String::new(),
            stderr,
            success: false,
            exit_code: None,
            truncated: false,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Lifecycle Notifications
// ============================================================================

/// Kind of session lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// A session was created
    Created,
    /// A session was closed by request
    Closed,
    /// A session's subprocess went away
    Disconnected,
    /// Session creation or the subprocess failed
    Error,
}

/// Session lifecycle notification
///
/// For logging and telemetry only; never a control signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session was created
    SessionCreated {
        /// Session name
        name: String,
        /// Local or remote
        locality: Locality,
    },
    /// A session was closed by request
    SessionClosed {
        /// Session name
        name: String,
    },
    /// A session's subprocess exited without being asked to
    SessionDisconnected {
        /// Session name
        name: String,
    },
    /// Session creation or the subprocess failed
    SessionError {
        /// Session name
        name: String,
        /// Error message
        message: String,
    },
}

impl SessionEvent {
    /// Kind of this notification
    #[must_use]
    pub const fn kind(&self) -> SessionEventKind {
        match self {
            Self::SessionCreated { .. } => SessionEventKind::Created,
            Self::SessionClosed { .. } => SessionEventKind::Closed,
            Self::SessionDisconnected { .. } => SessionEventKind::Disconnected,
            Self::SessionError { .. } => SessionEventKind::Error,
        }
    }

    /// Name of the session this notification is about
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::SessionCreated { name, .. }
            | Self::SessionClosed { name }
            | Self::SessionDisconnected { name }
            | Self::SessionError { name, .. } => name,
        }
    }
}

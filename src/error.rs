//! Error types for shell sessions and background jobs

use thiserror::Error;

/// Main error type for the session and job managers
#[derive(Error, Debug)]
pub enum ShellError {
    /// A live session already uses this name
    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    /// No live session with this name
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The interpreter never answered the readiness probe
    #[error("Session {name} did not become ready within {timeout_ms}ms")]
    SessionInitTimeout {
        /// Session name
        name: String,
        /// Initialization budget that elapsed
        timeout_ms: u64,
    },

    /// The interpreter could not be started or exited before it was ready
    #[error("Session {name} failed to start: {message}")]
    SessionStartFailure {
        /// Session name
        name: String,
        /// Error message
        message: String,
    },

    /// A command did not complete within its timeout
    ///
    /// Distinct from a command that ran and returned a failure: the command
    /// may still be running and the session (if any) is still usable.
    #[error("Command timed out after {timeout_ms}ms{}", session_suffix(.session))]
    CommandTimeout {
        /// Timeout that elapsed
        timeout_ms: u64,
        /// Session the command was sent to, if any
        session: Option<String>,
    },

    /// A job with this name is already tracked
    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    /// No tracked job with this name
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The job process was not confirmed spawned
    #[error("Failed to spawn job {name}: {message}")]
    SpawnFailure {
        /// Job name
        name: String,
        /// Error message
        message: String,
    },

    /// Unexpected subprocess-layer failure
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    /// Request arguments are inconsistent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for session and job operations
pub type Result<T> = std::result::Result<T, ShellError>;

fn session_suffix(session: &Option<String>) -> String {
    match session {
        Some(name) => format!(" in session {name} (session is still connected)"),
        None => String::new(),
    }
}

impl ShellError {
    /// Create a session start failure
    pub fn start_failure(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SessionStartFailure {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a command timeout error
    #[must_use]
    pub fn command_timeout(timeout: std::time::Duration, session: Option<&str>) -> Self {
        Self::CommandTimeout {
            timeout_ms: duration_ms(timeout),
            session: session.map(str::to_string),
        }
    }

    /// Create a spawn failure
    pub fn spawn_failure(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SpawnFailure {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an execution failure
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::ExecutionFailure(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error is a command or initialization timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. } | Self::SessionInitTimeout { .. }
        )
    }
}

pub(crate) fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

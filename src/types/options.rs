//! Manager options and configuration
//!
//! This module contains the configuration for the session and job managers,
//! including a builder pattern, JSON file loading and environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, ShellError};
use crate::transport::ShellDialect;

// ============================================================================
// Defaults
// ============================================================================

const DEFAULT_INIT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PROBE_INTERVAL_MS: u64 = 500;
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONTROL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CLOSE_GRACE_MS: u64 = 500;
const DEFAULT_TAIL_LINES: usize = 100;
const DEFAULT_SSH_CONTROL_PERSIST_SECS: u64 = 600;
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "KODEGEN_SHELL_";

// ============================================================================
// Remote Options
// ============================================================================

/// Authentication method for a remote connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Whatever the transport negotiates by default
    Default,
    /// HTTP basic (PowerShell remoting)
    Basic,
    /// Negotiate (PowerShell remoting)
    Negotiate,
    /// Kerberos
    Kerberos,
    /// CredSSP (PowerShell remoting)
    CredSsp,
    /// Public key (ssh)
    PublicKey,
    /// Password (ssh)
    Password,
}

/// Connection parameters recorded for a remote session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOptions {
    /// Target host, optionally `user@host`
    pub host: String,

    /// Credential reference: an ssh identity file or an exported
    /// PowerShell credential (`Export-Clixml`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<PathBuf>,

    /// Authentication method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMethod>,

    /// Port override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Use TLS for the remote transport (PowerShell remoting only)
    #[serde(default)]
    pub use_tls: bool,

    /// Connection establishment timeout
    #[serde(default, with = "option_millis", skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<Duration>,
}

impl RemoteOptions {
    /// Options for `host` with transport defaults
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            credential: None,
            auth: None,
            port: None,
            use_tls: false,
            connect_timeout: None,
        }
    }

    /// Set the credential reference
    #[must_use]
    pub fn credential(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential = Some(path.into());
        self
    }

    /// Set the authentication method
    #[must_use]
    pub const fn auth(mut self, auth: AuthMethod) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enable or disable TLS
    #[must_use]
    pub const fn use_tls(mut self, enabled: bool) -> Self {
        self.use_tls = enabled;
        self
    }

    /// Set the connection timeout
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Manager Options
// ============================================================================

/// Main options for the session and job managers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Interpreter dialect for sessions, one-shot commands and jobs
    pub dialect: ShellDialect,
    /// Interpreter program override (`bash` / `pwsh` by default)
    pub shell_program: Option<PathBuf>,
    /// ssh program override for remote Bash sessions
    pub ssh_program: Option<PathBuf>,
    /// Working directory for local sessions and jobs without their own
    pub working_dir: Option<PathBuf>,
    /// Budget for a local session to answer its readiness probe
    #[serde(with = "millis")]
    pub init_timeout: Duration,
    /// Interval between readiness probes
    #[serde(with = "millis")]
    pub probe_interval: Duration,
    /// Default timeout for `execute` when the caller gives none
    #[serde(with = "millis")]
    pub command_timeout: Duration,
    /// Timeout for remote connection removal on close
    #[serde(with = "millis")]
    pub control_timeout: Duration,
    /// How long a closing local interpreter may take to exit on its own
    #[serde(with = "millis")]
    pub close_grace: Duration,
    /// Directory for default job output files (system temp dir when unset)
    pub job_output_dir: Option<PathBuf>,
    /// Number of trailing lines returned by job output reads
    pub output_tail_lines: usize,
    /// Directory for ssh control sockets (system temp dir when unset)
    pub ssh_control_dir: Option<PathBuf>,
    /// How long an idle ssh master connection is kept open
    #[serde(with = "millis")]
    pub ssh_control_persist: Duration,
    /// Buffered lifecycle notifications per subscriber
    pub event_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            dialect: ShellDialect::Bash,
            shell_program: None,
            ssh_program: None,
            working_dir: None,
            init_timeout: Duration::from_millis(DEFAULT_INIT_TIMEOUT_MS),
            probe_interval: Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            control_timeout: Duration::from_millis(DEFAULT_CONTROL_TIMEOUT_MS),
            close_grace: Duration::from_millis(DEFAULT_CLOSE_GRACE_MS),
            job_output_dir: None,
            output_tail_lines: DEFAULT_TAIL_LINES,
            ssh_control_dir: None,
            ssh_control_persist: Duration::from_secs(DEFAULT_SSH_CONTROL_PERSIST_SECS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ManagerOptions {
    /// Create a new builder for `ManagerOptions`
    #[must_use]
    pub fn builder() -> ManagerOptionsBuilder {
        ManagerOptionsBuilder::default()
    }

    /// Load options from a JSON file; missing fields keep their defaults
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            ShellError::invalid_config(format!("{}: {e}", path.display()))
        })
    }

    /// Defaults with `KODEGEN_SHELL_*` environment overrides applied
    ///
    /// # Errors
    /// Returns error if an override has an invalid value
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides looked up by key suffix (e.g. `INIT_TIMEOUT_MS`)
    ///
    /// # Errors
    /// Returns error if an override has an invalid value
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dialect) = lookup("DIALECT") {
            self.dialect = dialect.parse()?;
        }
        if let Some(program) = lookup("PROGRAM") {
            self.shell_program = Some(PathBuf::from(program));
        }
        if let Some(program) = lookup("SSH_PROGRAM") {
            self.ssh_program = Some(PathBuf::from(program));
        }
        if let Some(ms) = lookup("INIT_TIMEOUT_MS") {
            self.init_timeout = Duration::from_millis(parse_number("INIT_TIMEOUT_MS", &ms)?);
        }
        if let Some(ms) = lookup("COMMAND_TIMEOUT_MS") {
            self.command_timeout =
                Duration::from_millis(parse_number("COMMAND_TIMEOUT_MS", &ms)?);
        }
        if let Some(dir) = lookup("JOB_OUTPUT_DIR") {
            self.job_output_dir = Some(PathBuf::from(dir));
        }
        if let Some(lines) = lookup("TAIL_LINES") {
            self.output_tail_lines = parse_number("TAIL_LINES", &lines)?;
        }
        Ok(self)
    }

    /// Directory default job output files are created in
    #[must_use]
    pub fn job_output_dir(&self) -> PathBuf {
        self.job_output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Directory ssh control sockets are created in
    #[must_use]
    pub fn ssh_control_dir(&self) -> PathBuf {
        self.ssh_control_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ShellError::invalid_config(format!("{ENV_PREFIX}{key}={value}: {e}")))
}

// ============================================================================
// Builder for ManagerOptions
// ============================================================================

/// Builder for `ManagerOptions`
#[derive(Debug, Default)]
pub struct ManagerOptionsBuilder {
    options: ManagerOptions,
}

impl ManagerOptionsBuilder {
    /// Set the interpreter dialect
    #[must_use]
    pub const fn dialect(mut self, dialect: ShellDialect) -> Self {
        self.options.dialect = dialect;
        self
    }

    /// Set the interpreter program
    #[must_use]
    pub fn shell_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.options.shell_program = Some(program.into());
        self
    }

    /// Set the ssh program
    #[must_use]
    pub fn ssh_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.options.ssh_program = Some(program.into());
        self
    }

    /// Set the default working directory
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.working_dir = Some(dir.into());
        self
    }

    /// Set the session initialization timeout
    #[must_use]
    pub const fn init_timeout(mut self, timeout: Duration) -> Self {
        self.options.init_timeout = timeout;
        self
    }

    /// Set the readiness probe interval
    #[must_use]
    pub const fn probe_interval(mut self, interval: Duration) -> Self {
        self.options.probe_interval = interval;
        self
    }

    /// Set the default command timeout
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Set the control command timeout
    #[must_use]
    pub const fn control_timeout(mut self, timeout: Duration) -> Self {
        self.options.control_timeout = timeout;
        self
    }

    /// Set the close grace period
    #[must_use]
    pub const fn close_grace(mut self, grace: Duration) -> Self {
        self.options.close_grace = grace;
        self
    }

    /// Set the job output directory
    #[must_use]
    pub fn job_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.job_output_dir = Some(dir.into());
        self
    }

    /// Set the number of output tail lines
    #[must_use]
    pub const fn output_tail_lines(mut self, lines: usize) -> Self {
        self.options.output_tail_lines = lines;
        self
    }

    /// Set the ssh control socket directory
    #[must_use]
    pub fn ssh_control_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.ssh_control_dir = Some(dir.into());
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> ManagerOptions {
        self.options
    }
}

// ============================================================================
// Duration (de)serialization as milliseconds
// ============================================================================

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(crate::error::duration_ms(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&crate::error::duration_ms(*duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

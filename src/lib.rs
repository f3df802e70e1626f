//! # Persistent shell sessions and background jobs
//!
//! Lets an agent whose own command channel is one-shot-per-call run commands
//! against long-lived shell sessions, and start, track and reap detached
//! background processes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kodegen_shell_session::{CreateSessionRequest, ExecutionGateway, ManagerOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = ExecutionGateway::new(ManagerOptions::from_env()?);
//!
//!     gateway.create_session(CreateSessionRequest::local("build")).await?;
//!     gateway.execute(Some("build"), "cd /tmp && export MODE=release", None).await?;
//!
//!     let output = gateway
//!         .execute(Some("build"), "echo $MODE in $(pwd)", Some(Duration::from_secs(5)))
//!         .await?;
//!     log::info!("{}", output.stdout);
//!
//!     gateway.close_session("build").await;
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### 1. Sessions
//!
//! A local session owns one interpreter subprocess. Each command is wrapped
//! in sentinels unique to the session and the command, so output of one
//! command can never be attributed to another, even after a timeout. A
//! remote session forwards each command through a short-lived bridging
//! subprocess (`ssh` with connection multiplexing, or a PowerShell
//! PSSession) that reuses one named remote connection.
//!
//! ### 2. Background jobs
//!
//! ```no_run
//! # use kodegen_shell_session::{ExecutionGateway, ManagerOptions, StartJobRequest};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = ExecutionGateway::new(ManagerOptions::default());
//! let job = gateway.start_job(StartJobRequest::new("server", "python3 -m http.server")).await?;
//! log::info!("started pid {}", job.pid);
//!
//! let output = gateway.job_output("server", true).await?;
//! gateway.remove_job("server", true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### 3. Lifecycle notifications
//!
//! ```no_run
//! # use kodegen_shell_session::{ExecutionGateway, ManagerOptions, SessionEventKind};
//! # use futures::StreamExt;
//! # async fn example(gateway: ExecutionGateway) {
//! let mut disconnects = Box::pin(gateway.subscribe(Some(SessionEventKind::Disconnected)));
//! while let Some(event) = disconnects.next().await {
//!     log::warn!("session {} went away", event.name());
//! }
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`gateway`]: External entry point returning plain records
//! - [`manager`]: Session registry and lifecycle notifications
//! - [`jobs`]: Detached background job registry
//! - [`transport`]: Interpreter dialects, sentinel framing, local and remote runtimes
//! - [`types`]: Records, requests and configuration
//! - [`shutdown`]: Exit hook closing every session on a termination signal
//! - [`error`]: Error types and handling
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, ShellError>`](Result). A
//! command that timed out is a distinct error from a command that ran and
//! failed; the latter is an `Ok` record with `success == false`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod gateway;
pub mod jobs;
pub mod manager;
pub mod shutdown;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use error::{Result, ShellError};
pub use gateway::ExecutionGateway;
pub use jobs::JobRegistry;
pub use manager::{SessionRegistry, SessionRuntime};
pub use shutdown::spawn_shutdown_hook;
pub use transport::{LocalSession, RemoteSession, ShellDialect};

// Re-export type submodules for flat public API
pub use types::identifiers::{CorrelationId, InstanceId};
pub use types::job::{
    JobInfo, JobOutput, JobState, JobStatusReport, OutputTarget, RemoveJobResponse,
    StartJobRequest, StreamSink,
};
pub use types::options::{AuthMethod, ManagerOptions, ManagerOptionsBuilder, RemoteOptions};
pub use types::session::{
    CommandOutput, CreateSessionRequest, Locality, SessionEvent, SessionEventKind, SessionInfo,
    SessionState,
};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Type definitions for shell sessions and jobs
//!
//! This module contains the record and configuration types used throughout
//! the crate, organized into logical submodules:
//!
//! - [`identifiers`] - Type-safe ID wrappers (`CorrelationId`, `InstanceId`)
//! - [`session`] - Session snapshots, command results and lifecycle events
//! - [`job`] - Job records, output targets and job-control responses
//! - [`options`] - Manager configuration and remote connection options

pub mod identifiers;
pub mod job;
pub mod options;
pub mod session;

// Re-export commonly used types
pub use identifiers::{CorrelationId, InstanceId};
pub use job::{
    JobInfo, JobOutput, JobState, JobStatusReport, OutputTarget, RemoveJobResponse,
    StartJobRequest, StreamSink,
};
pub use options::{AuthMethod, ManagerOptions, ManagerOptionsBuilder, RemoteOptions};
pub use session::{
    CommandOutput, CreateSessionRequest, LOCALHOST, Locality, SessionEvent, SessionEventKind,
    SessionInfo, SessionState,
};

//! Job records and job-control responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Output Targets
// ============================================================================

/// Where a job stream should go, as declared by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// stdout: a generated file in the job output directory;
    /// stderr: merged with stdout
    #[default]
    Default,
    /// Thrown away
    Discard,
    /// A caller-supplied file
    File(PathBuf),
    /// stderr only: written to the same destination as stdout
    MergeWithStdout,
}

/// Where a job stream actually goes after resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSink {
    /// Written to this file
    File(PathBuf),
    /// Thrown away
    Discarded,
    /// stderr only: shares the stdout destination
    MergedWithStdout,
}

impl StreamSink {
    /// File backing this sink, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Discarded | Self::MergedWithStdout => None,
        }
    }
}

/// Request parameters for starting a job
#[derive(Debug, Clone)]
pub struct StartJobRequest {
    /// Unique job name
    pub name: String,
    /// Command text run by the configured interpreter
    pub command: String,
    /// Working directory of the job
    pub working_dir: Option<PathBuf>,
    /// Declared stdout target
    pub stdout: OutputTarget,
    /// Declared stderr target
    pub stderr: OutputTarget,
}

impl StartJobRequest {
    /// Request with default output targets
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            working_dir: None,
            stdout: OutputTarget::Default,
            stderr: OutputTarget::Default,
        }
    }

    /// Set the working directory
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the stdout target
    #[must_use]
    pub fn stdout(mut self, target: OutputTarget) -> Self {
        self.stdout = target;
        self
    }

    /// Set the stderr target
    #[must_use]
    pub fn stderr(mut self, target: OutputTarget) -> Self {
        self.stderr = target;
        self
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Registry record of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    /// Unique job name
    pub name: String,

    /// OS process id (also the process group id)
    pub pid: u32,

    /// Originating command text
    pub command: String,

    /// Working directory the job was started in
    pub working_dir: PathBuf,

    /// Resolved stdout destination
    pub stdout: StreamSink,

    /// Resolved stderr destination
    pub stderr: StreamSink,

    /// When the job was started
    pub started_at: DateTime<Utc>,
}

impl JobInfo {
    /// Files written by this job
    pub fn output_files(&self) -> impl Iterator<Item = &Path> {
        self.stdout.path().into_iter().chain(self.stderr.path())
    }
}

/// Point-in-time liveness of a job process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The PID is alive
    Running,
    /// The PID is gone (or could not be queried)
    Stopped,
}

/// Tail of a job's captured output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Tail of the stdout file (`None` when stdout is discarded)
    pub stdout: Option<String>,

    /// Tail of the stderr file (`None` when discarded or merged)
    pub stderr: Option<String>,
}

/// Response from `status` and `list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    /// Job record
    pub job: JobInfo,

    /// Liveness at query time
    pub state: JobState,

    /// Output tails, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
}

/// Response from `remove`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveJobResponse {
    /// Removed job name
    pub name: String,

    /// Output files that were deleted
    pub deleted_files: Vec<PathBuf>,
}

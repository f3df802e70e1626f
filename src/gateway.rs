//! External entry point for command execution and job control
//!
//! A thin layer over the two registries. Stateless commands run in a fresh
//! interpreter; session-bound commands route through the session registry;
//! job-control calls delegate to the job registry. Every call returns plain
//! serializable records.

use futures::Stream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::jobs::JobRegistry;
use crate::manager::SessionRegistry;
use crate::transport::run_bounded;
use crate::types::job::{JobInfo, JobOutput, JobStatusReport, RemoveJobResponse, StartJobRequest};
use crate::types::options::ManagerOptions;
use crate::types::session::{
    CommandOutput, CreateSessionRequest, SessionEvent, SessionEventKind, SessionInfo,
};

/// Execution gateway owning a session registry and a job registry
#[derive(Debug, Clone)]
pub struct ExecutionGateway {
    sessions: Arc<SessionRegistry>,
    jobs: Arc<JobRegistry>,
    options: Arc<ManagerOptions>,
}

impl ExecutionGateway {
    /// Create a gateway with empty registries
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(options: ManagerOptions) -> Self {
        let options = Arc::new(options);
        Self {
            sessions: Arc::new(SessionRegistry::with_shared_config(Arc::clone(&options))),
            jobs: Arc::new(JobRegistry::with_shared_config(Arc::clone(&options))),
            options,
        }
    }

    /// Session registry behind this gateway
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Job registry behind this gateway
    #[must_use]
    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Run a command, in the named session or in a fresh interpreter
    ///
    /// `timeout` defaults to the configured command timeout.
    ///
    /// # Errors
    /// - `SessionNotFound` for an unknown session
    /// - `CommandTimeout` if the command does not finish in time
    /// - `ExecutionFailure` if the command cannot be run
    pub async fn execute(
        &self,
        session: Option<&str>,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        let timeout = timeout.unwrap_or(self.options.command_timeout);

        match session {
            Some(name) => self.sessions.execute(name, command, timeout).await,
            None => {
                let dialect = self.options.dialect;
                let command = dialect.rewrite_env_prefix(command);
                let mut invocation = dialect.one_shot(&self.options, &command);
                if let Some(ref dir) = self.options.working_dir {
                    invocation.working_dir = Some(dir.clone());
                }
                log::debug!("Running one-shot command via {}", invocation.program.display());
                run_bounded(&invocation, timeout, None).await
            }
        }
    }

    /// Like [`execute`](Self::execute), with every error folded into the record
    ///
    /// The record has `success == false` and a descriptive `stderr`; a timeout
    /// is worded differently from a command that ran and failed.
    pub async fn report(
        &self,
        session: Option<&str>,
        command: &str,
        timeout: Option<Duration>,
    ) -> CommandOutput {
        match self.execute(session, command, timeout).await {
            Ok(output) => output,
            Err(e) => {
                log::debug!("Command failed: {e}");
                CommandOutput::from_error(&e)
            }
        }
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Create a session
    ///
    /// # Errors
    /// See [`SessionRegistry::create`]
    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<SessionInfo> {
        self.sessions.create(request).await
    }

    /// Close a session; unknown names are a no-op
    pub async fn close_session(&self, name: &str) -> bool {
        self.sessions.close(name).await
    }

    /// Snapshot of every live session
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.list().await
    }

    /// Session lifecycle notifications
    pub fn subscribe(
        &self,
        kind: Option<SessionEventKind>,
    ) -> impl Stream<Item = SessionEvent> + Send + use<> {
        self.sessions.subscribe(kind)
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Start a detached job
    ///
    /// # Errors
    /// See [`JobRegistry::start`]
    pub async fn start_job(&self, request: StartJobRequest) -> Result<JobInfo> {
        self.jobs.start(request).await
    }

    /// Liveness of a job, optionally with output tails
    ///
    /// # Errors
    /// See [`JobRegistry::status`]
    pub async fn job_status(&self, name: &str, include_output: bool) -> Result<JobStatusReport> {
        self.jobs.status(name, include_output).await
    }

    /// Every tracked job with its liveness
    pub async fn list_jobs(&self) -> Vec<JobStatusReport> {
        self.jobs.list().await
    }

    /// Force-kill a job
    ///
    /// # Errors
    /// See [`JobRegistry::stop`]
    pub async fn stop_job(&self, name: &str) -> Result<()> {
        self.jobs.stop(name).await
    }

    /// Forget a job and delete its output files
    ///
    /// # Errors
    /// See [`JobRegistry::remove`]
    pub async fn remove_job(&self, name: &str, force: bool) -> Result<RemoveJobResponse> {
        self.jobs.remove(name, force).await
    }

    /// Tails of a job's output, optionally clearing it
    ///
    /// # Errors
    /// See [`JobRegistry::get_output`]
    pub async fn job_output(&self, name: &str, keep: bool) -> Result<JobOutput> {
        self.jobs.get_output(name, keep).await
    }
}

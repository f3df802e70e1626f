//! Job registry: name-keyed directory of detached background processes

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Result, ShellError};
use crate::types::job::{
    JobInfo, JobOutput, JobState, JobStatusReport, OutputTarget, RemoveJobResponse,
    StartJobRequest, StreamSink,
};
use crate::types::options::ManagerOptions;

use super::output::{clear, delete_files, open_sinks, read_tail, resolve_sinks};
use super::process::{SpawnedJob, is_alive, kill_job, spawn_detached};

/// Tracked job: the public record plus the reaper flag
#[derive(Debug, Clone)]
struct JobEntry {
    info: JobInfo,
    process: SpawnedJob,
}

impl JobEntry {
    /// Point-in-time liveness
    ///
    /// A reaped job is stopped without asking the OS, so a recycled PID is
    /// never mistaken for it.
    fn query_state(&self) -> Result<JobState> {
        if self.process.has_exited() {
            return Ok(JobState::Stopped);
        }
        Ok(if is_alive(self.info.pid)? {
            JobState::Running
        } else {
            JobState::Stopped
        })
    }
}

/// Registry of detached background jobs
///
/// Jobs outlive the calls that started them; the registry only records what
/// is needed to report on, read from and terminate them. Liveness is never
/// stored, it is queried from the OS on every status request.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
    config: Arc<ManagerOptions>,
}

impl JobRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: ManagerOptions) -> Self {
        Self::with_shared_config(Arc::new(config))
    }

    pub(crate) fn with_shared_config(config: Arc<ManagerOptions>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            config,
        }
    }

    async fn entry(&self, name: &str) -> Result<JobEntry> {
        self.jobs
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ShellError::JobNotFound(name.to_string()))
    }

    /// Start a detached job
    ///
    /// # Errors
    /// - `DuplicateJob` if the name is tracked
    /// - `InvalidRequest` if stdout is asked to merge with itself
    /// - `SpawnFailure` if output files cannot be created or no PID is obtained
    pub async fn start(&self, request: StartJobRequest) -> Result<JobInfo> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&request.name) {
            return Err(ShellError::DuplicateJob(request.name));
        }

        let name = request.name;
        let output_dir = self.config.job_output_dir();
        if request.stdout == OutputTarget::Default {
            std::fs::create_dir_all(&output_dir).map_err(|e| {
                ShellError::spawn_failure(
                    &name,
                    format!("cannot create output directory {}: {e}", output_dir.display()),
                )
            })?;
        }
        let (stdout, stderr) = resolve_sinks(&name, &request.stdout, &request.stderr, &output_dir)?;

        let working_dir = match request.working_dir.or_else(|| self.config.working_dir.clone()) {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        if !working_dir.is_dir() {
            return Err(ShellError::spawn_failure(
                &name,
                format!("working directory does not exist: {}", working_dir.display()),
            ));
        }

        let (stdout_stdio, stderr_stdio) = open_sinks(&stdout, &stderr)
            .map_err(|e| ShellError::spawn_failure(&name, format!("cannot open output file: {e}")))?;

        let dialect = self.config.dialect;
        let command = dialect.rewrite_env_prefix(&request.command);
        let invocation = dialect.one_shot(&self.config, &command);

        let process = match spawn_detached(&name, &invocation, &working_dir, stdout_stdio, stderr_stdio)
        {
            Ok(process) => process,
            Err(e) => {
                if request.stdout == OutputTarget::Default
                    && let Some(path) = stdout.path()
                {
                    delete_files(std::iter::once(path)).await;
                }
                return Err(e);
            }
        };

        let info = JobInfo {
            name: name.clone(),
            pid: process.pid,
            command: request.command,
            working_dir,
            stdout,
            stderr,
            started_at: Utc::now(),
        };
        log::info!("[{name}] job started (pid {})", info.pid);

        jobs.insert(
            name,
            JobEntry {
                info: info.clone(),
                process,
            },
        );
        Ok(info)
    }

    /// Liveness of a job, optionally with its output tails
    ///
    /// # Errors
    /// - `JobNotFound` if the name is not tracked
    /// - `ExecutionFailure` if the liveness query fails
    pub async fn status(&self, name: &str, include_output: bool) -> Result<JobStatusReport> {
        let entry = self.entry(name).await?;
        let state = entry.query_state()?;
        let output = if include_output {
            Some(self.read_output(&entry.info, true).await?)
        } else {
            None
        };

        Ok(JobStatusReport {
            job: entry.info,
            state,
            output,
        })
    }

    /// Every tracked job with its liveness, oldest first
    ///
    /// A failed liveness query reports that job as stopped.
    pub async fn list(&self) -> Vec<JobStatusReport> {
        let entries: Vec<JobEntry> = self.jobs.lock().await.values().cloned().collect();

        let mut reports = join_all(entries.into_iter().map(|entry| async move {
            let state = entry.query_state().unwrap_or_else(|e| {
                log::warn!("[{}] liveness query failed: {e}", entry.info.name);
                JobState::Stopped
            });
            JobStatusReport {
                job: entry.info,
                state,
                output: None,
            }
        }))
        .await;

        reports.sort_by(|a, b| {
            a.job
                .started_at
                .cmp(&b.job.started_at)
                .then_with(|| a.job.name.cmp(&b.job.name))
        });
        reports
    }

    /// Force-kill a job's process group
    ///
    /// Children the job left behind are killed even when the job's own
    /// process already exited. Stopping a finished job succeeds. Output
    /// files are kept.
    ///
    /// # Errors
    /// - `JobNotFound` if the name is not tracked
    /// - `ExecutionFailure` if the kill request fails
    pub async fn stop(&self, name: &str) -> Result<()> {
        let entry = self.entry(name).await?;
        let leader_reaped = entry.process.has_exited();
        if leader_reaped {
            log::debug!("[{name}] job already exited; signalling its process group");
        }
        kill_job(entry.info.pid, leader_reaped)?;
        log::info!("[{name}] job stopped (pid {})", entry.info.pid);
        Ok(())
    }

    /// Forget a job and delete its output files
    ///
    /// With `force` the job is stopped first; a failure to stop is logged and
    /// ignored. Only files are deleted, never their directories.
    ///
    /// # Errors
    /// Returns `JobNotFound` if the name is not tracked
    pub async fn remove(&self, name: &str, force: bool) -> Result<RemoveJobResponse> {
        let entry = self.entry(name).await?;

        if force && let Err(e) = self.stop(name).await {
            log::warn!("[{name}] stop before removal failed: {e}");
        }

        let deleted_files = delete_files(entry.info.output_files()).await;
        self.jobs.lock().await.remove(name);
        log::info!("[{name}] job removed ({} file(s) deleted)", deleted_files.len());

        Ok(RemoveJobResponse {
            name: name.to_string(),
            deleted_files,
        })
    }

    /// Tails of a job's output files
    ///
    /// With `keep == false` the files are emptied after reading. Output the
    /// job writes between the read and the truncation is lost.
    ///
    /// # Errors
    /// - `JobNotFound` if the name is not tracked
    /// - `Io` if a file cannot be read or truncated
    pub async fn get_output(&self, name: &str, keep: bool) -> Result<JobOutput> {
        let entry = self.entry(name).await?;
        self.read_output(&entry.info, keep).await
    }

    async fn read_output(&self, info: &JobInfo, keep: bool) -> Result<JobOutput> {
        let lines = self.config.output_tail_lines;
        let mut output = JobOutput::default();

        if let StreamSink::File(ref path) = info.stdout {
            output.stdout = Some(read_tail(path, lines).await?);
        }
        if let StreamSink::File(ref path) = info.stderr {
            output.stderr = Some(read_tail(path, lines).await?);
        }

        if !keep {
            let files: Vec<PathBuf> = info.output_files().map(PathBuf::from).collect();
            for path in files {
                clear(&path).await?;
            }
        }
        Ok(output)
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(ManagerOptions::default())
    }
}

//! Lifecycle management for local sessions (connect, readiness, close)

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::error::{Result, ShellError, duration_ms};
use crate::transport::dialect::ShellDialect;
use crate::transport::framing::{MarkerFactory, StreamKind};
use crate::types::options::ManagerOptions;
use crate::types::session::SessionState;

use super::ExitReporter;
use super::reader::spawn_stream_reader;
use super::session::{CaptureSlot, LocalSession};

impl LocalSession {
    /// Start an interpreter and wait until it answers the readiness probe
    ///
    /// The probe is retried every `probe_interval` until `init_timeout`
    /// elapses. `exit` is notified if the interpreter later exits without
    /// being closed.
    ///
    /// # Errors
    /// - `SessionStartFailure` if the interpreter cannot be spawned or exits
    ///   before answering
    /// - `SessionInitTimeout` if it never answers within `init_timeout`
    pub async fn connect(
        name: &str,
        dialect: ShellDialect,
        options: &ManagerOptions,
        working_dir: Option<&Path>,
        exit: Option<ExitReporter>,
    ) -> Result<Self> {
        let invocation = dialect.interactive(options);
        let mut cmd = invocation.command();
        cmd.stdin(Stdio::piped()).kill_on_drop(true);

        // Own group, so commands left running by a timeout die with the session
        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(dir) = working_dir.or(options.working_dir.as_deref()) {
            if !dir.is_dir() {
                return Err(ShellError::start_failure(
                    name,
                    format!("working directory does not exist: {}", dir.display()),
                ));
            }
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ShellError::start_failure(
                name,
                format!("failed to spawn {}: {e}", invocation.program.display()),
            )
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ShellError::start_failure(name, "failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ShellError::start_failure(name, "failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ShellError::start_failure(name, "failed to get stderr handle"))?;

        let slot = CaptureSlot::shared();
        let closing = Arc::new(AtomicBool::new(false));
        let reader_tasks = vec![
            spawn_stream_reader(stdout, StreamKind::Stdout, slot.clone(), closing.clone(), exit),
            spawn_stream_reader(stderr, StreamKind::Stderr, slot.clone(), closing.clone(), None),
        ];

        let pid = child.id();
        log::debug!("[{name}] spawned {} (pid {pid:?})", invocation.program.display());

        let mut session = Self {
            name: name.to_string(),
            dialect,
            markers: MarkerFactory::new(),
            process: Some(child),
            stdin: Some(stdin),
            pid,
            slot,
            state: SessionState::Connecting,
            closing,
            close_grace: options.close_grace,
            reader_tasks,
        };

        session.await_ready(options).await?;
        session.state = SessionState::Connected;
        log::info!("[{name}] local session ready");
        Ok(session)
    }

    async fn await_ready(&mut self, options: &ManagerOptions) -> Result<()> {
        let started = Instant::now();
        let probe = self.dialect.probe_command();

        loop {
            let remaining = options.init_timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                self.state = SessionState::Failed;
                return Err(ShellError::SessionInitTimeout {
                    name: self.name.clone(),
                    timeout_ms: duration_ms(options.init_timeout),
                });
            }

            let attempt = remaining.min(options.probe_interval);
            match self.run_framed(probe, attempt).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_timeout() => {
                    log::debug!("[{}] readiness probe unanswered; retrying", self.name);
                }
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(ShellError::start_failure(&self.name, e.to_string()));
                }
            }
        }
    }

    /// Close the interpreter
    ///
    /// Asks the interpreter to exit, waits up to the close grace period and
    /// kills it otherwise. Whatever is left in its process group (commands
    /// that timed out earlier) is killed as well. Never fails; calling it
    /// twice is harmless.
    pub async fn close(&mut self) {
        self.closing.store(true, Ordering::SeqCst);

        if self.stdin.is_some() {
            let exit = self.dialect.exit_instruction();
            if let Err(e) = self.write_stdin(exit).await {
                log::debug!("[{}] exit instruction not delivered: {e}", self.name);
            }
        }
        self.stdin = None;

        if let Some(mut child) = self.process.take() {
            match tokio::time::timeout(self.close_grace, child.wait()).await {
                Ok(Ok(status)) => log::debug!("[{}] interpreter exited: {status}", self.name),
                Ok(Err(e)) => log::debug!("[{}] wait failed: {e}", self.name),
                Err(_) => {
                    log::debug!("[{}] interpreter ignored exit; killing", self.name);
                    let _ = child.kill().await;
                }
            }
            if let Some(pid) = self.pid {
                kill_process_group(&self.name, pid);
            }
        }

        for task in self.reader_tasks.drain(..) {
            task.abort();
        }
        self.slot.lock().waiter = None;
        self.state = SessionState::Disconnected;
    }

    /// Handle Drop cleanup
    pub(super) fn drop_impl(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        self.stdin = None;

        for task in self.reader_tasks.drain(..) {
            task.abort();
        }

        if let Some(mut child) = self.process.take() {
            let _ = child.start_kill();
            if let Some(pid) = self.pid {
                kill_process_group(&self.name, pid);
            }
        }
    }
}

/// SIGKILL the interpreter's process group; an empty group is fine
#[cfg(unix)]
fn kill_process_group(name: &str, pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::debug!("[{name}] killpg({pid}) failed: {e}"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_name: &str, _pid: u32) {}

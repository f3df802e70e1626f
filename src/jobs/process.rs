//! Spawning, probing and killing detached job processes

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, ShellError};
use crate::transport::Invocation;

/// Handle kept for a spawned job
#[derive(Debug, Clone)]
pub(super) struct SpawnedJob {
    pub pid: u32,
    /// Set by the reaper once the process has been waited for
    pub reaped: Arc<AtomicBool>,
}

impl SpawnedJob {
    pub(super) fn has_exited(&self) -> bool {
        self.reaped.load(Ordering::SeqCst)
    }
}

/// Spawn `invocation` detached from the manager
///
/// The child gets its own process group and null stdin. A reaper task waits
/// for it so it never lingers as a zombie; the child is not killed when the
/// handle or the manager goes away.
pub(super) fn spawn_detached(
    name: &str,
    invocation: &Invocation,
    working_dir: &Path,
    stdout: Stdio,
    stderr: Stdio,
) -> Result<SpawnedJob> {
    let mut cmd = invocation.command();
    cmd.current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(false);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| {
        ShellError::spawn_failure(
            name,
            format!("failed to spawn {}: {e}", invocation.program.display()),
        )
    })?;

    let Some(pid) = child.id() else {
        return Err(ShellError::spawn_failure(name, "process id unavailable after spawn"));
    };

    let reaped = Arc::new(AtomicBool::new(false));
    let reaper_flag = Arc::clone(&reaped);
    let job_name = name.to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => log::info!("[{job_name}] job exited: {status}"),
            Err(e) => log::warn!("[{job_name}] failed to wait for job: {e}"),
        }
        reaper_flag.store(true, Ordering::SeqCst);
    });

    Ok(SpawnedJob { pid, reaped })
}

// ============================================================================
// Signals
// ============================================================================

#[cfg(unix)]
fn to_pid(pid: u32) -> Result<nix::unistd::Pid> {
    i32::try_from(pid)
        .map(nix::unistd::Pid::from_raw)
        .map_err(|_| ShellError::execution(format!("process id out of range: {pid}")))
}

/// Whether the PID currently exists (signal-0 probe)
#[cfg(unix)]
pub(super) fn is_alive(pid: u32) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;

    match kill(to_pid(pid)?, None) {
        // EPERM: the process exists but belongs to someone else
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(ShellError::execution(format!("liveness query for pid {pid} failed: {e}"))),
    }
}

/// Force-kill the job's process group, falling back to the PID alone
///
/// The group outlives its leader while any member is alive, so it is
/// signalled even after the leader was reaped. The PID fallback is skipped
/// then, since the number may already belong to an unrelated process. A
/// group or process that is already gone is not an error.
#[cfg(unix)]
pub(super) fn kill_job(pid: u32, leader_reaped: bool) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};

    let target = to_pid(pid)?;
    match killpg(target, Signal::SIGKILL) {
        Ok(()) => return Ok(()),
        Err(Errno::ESRCH) if leader_reaped => return Ok(()),
        Err(Errno::ESRCH) => {}
        Err(e) if leader_reaped => {
            return Err(ShellError::execution(format!(
                "failed to kill process group {pid}: {e}"
            )));
        }
        Err(e) => log::debug!("killpg({pid}) failed: {e}; falling back to kill"),
    }

    match kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ShellError::execution(format!("failed to kill pid {pid}: {e}"))),
    }
}

#[cfg(not(unix))]
pub(super) fn is_alive(pid: u32) -> Result<bool> {
    Err(ShellError::execution(format!(
        "job control for pid {pid} requires a Unix host"
    )))
}

#[cfg(not(unix))]
pub(super) fn kill_job(pid: u32, _leader_reaped: bool) -> Result<()> {
    Err(ShellError::execution(format!(
        "job control for pid {pid} requires a Unix host"
    )))
}

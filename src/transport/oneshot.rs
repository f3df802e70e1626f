//! Bounded execution of a fresh subprocess

use chrono::Utc;
use std::time::Duration;

use crate::error::{Result, ShellError};
use crate::types::session::CommandOutput;

use super::dialect::Invocation;

/// Run `invocation` to completion within `timeout`
///
/// The subprocess is killed if the timeout elapses. `session` only labels the
/// timeout error.
///
/// # Errors
/// - `ExecutionFailure` if the subprocess cannot be spawned or awaited
/// - `CommandTimeout` if it outlives `timeout`
pub(crate) async fn run_bounded(
    invocation: &Invocation,
    timeout: Duration,
    session: Option<&str>,
) -> Result<CommandOutput> {
    let mut cmd = invocation.command();
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        ShellError::execution(format!("failed to spawn {}: {e}", invocation.program.display()))
    })?;

    // Dropping the wait future on timeout drops the child, which kills it
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ShellError::execution(format!(
                "failed to wait for {}: {e}",
                invocation.program.display()
            )));
        }
        Err(_) => return Err(ShellError::command_timeout(timeout, session)),
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        success: output.status.success(),
        exit_code: output.status.code(),
        truncated: false,
        timestamp: Utc::now(),
    })
}

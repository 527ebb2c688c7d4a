//! Bash tool for executing shell commands inside the sandbox.
//!
//! Commands run through `sh -c` in the agent's working directory. Spawn
//! failures and timeouts are returned as [`ToolError`] and rendered by the
//! dispatcher; a non-zero exit status is ordinary output.

use serde::Deserialize;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;

use super::ToolError;

/// Fixed timeout for a single shell command, in seconds.
pub const BASH_TIMEOUT_SECS: u64 = 120;

/// Parameters for the bash tool.
#[derive(Debug, Clone, Deserialize)]
pub struct BashParams {
    /// The shell command to execute.
    pub command: String,
}

/// Run `command` and render stdout, stderr and exit code as result text.
pub async fn run_command(command: &str, timeout: Duration) -> Result<String, ToolError> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ToolError::Timeout {
            seconds: timeout.as_secs(),
        })??;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let code = exit_code(output.status);

    tracing::debug!(exit_code = code, "Shell command finished");
    Ok(format_output(&stdout, &stderr, code))
}

/// Join the non-empty output blocks and the exit-code line.
pub fn format_output(stdout: &str, stderr: &str, exit_code: i32) -> String {
    let mut parts = Vec::with_capacity(3);
    if !stdout.is_empty() {
        parts.push(format!("stdout:\n{}", stdout));
    }
    if !stderr.is_empty() {
        parts.push(format!("stderr:\n{}", stderr));
    }
    parts.push(format!("exit_code: {}", exit_code));
    parts.join("\n")
}

/// Exit code, or the negated signal number for a signal-terminated process.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

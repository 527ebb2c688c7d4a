//! A sandbox that executes nothing and records every call.
//!
//! Backs `swe-harbor provision --dry-run` and the provisioning tests.
//! Uploaded files are read at call time, so the recorded contents and
//! mode reflect the local file as it was when it was sent.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ExecOptions, ExecResult, SandboxClient};
use crate::error::SandboxError;

/// One recorded sandbox operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxEvent {
    Exec {
        sandbox_id: String,
        command: String,
        working_dir: Option<String>,
        env: Vec<(String, String)>,
    },
    Upload {
        sandbox_id: String,
        remote_path: String,
        local_path: PathBuf,
        bytes: Vec<u8>,
        mode: Option<u32>,
    },
    UploadDirectory {
        sandbox_id: String,
        remote_dir: String,
        local_dir: PathBuf,
    },
}

impl SandboxEvent {
    /// Short one-line form used by dry-run output.
    pub fn summary(&self) -> String {
        match self {
            SandboxEvent::Exec { command, .. } => format!("exec   {}", command),
            SandboxEvent::Upload {
                remote_path, bytes, ..
            } => format!("upload {} ({} bytes)", remote_path, bytes.len()),
            SandboxEvent::UploadDirectory {
                remote_dir,
                local_dir,
                ..
            } => format!("upload {}/ <- {}", remote_dir, local_dir.display()),
        }
    }
}

/// In-memory [`SandboxClient`].
#[derive(Debug, Default)]
pub struct RecordingSandbox {
    events: Mutex<Vec<SandboxEvent>>,
    exit_code: i64,
    fail_uploads: bool,
}

impl RecordingSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this exit code for every executed command.
    pub fn with_exit_code(mut self, exit_code: i64) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Record uploads, then fail them.
    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<SandboxEvent> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SandboxEvent>> {
        // A panicking test thread must not hide the events from the others.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn upload_result(&self, path: &str) -> Result<(), SandboxError> {
        if self.fail_uploads {
            Err(SandboxError::UploadFailed {
                path: path.to_string(),
                reason: "upload rejected".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

#[async_trait]
impl SandboxClient for RecordingSandbox {
    async fn execute_command(
        &self,
        sandbox_id: &str,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecResult, SandboxError> {
        tracing::debug!(sandbox = %sandbox_id, command = %command, "Recorded exec");
        self.lock().push(SandboxEvent::Exec {
            sandbox_id: sandbox_id.to_string(),
            command: command.to_string(),
            working_dir: options.working_dir,
            env: options.env,
        });
        Ok(ExecResult {
            exit_code: self.exit_code,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn upload_file(
        &self,
        sandbox_id: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), SandboxError> {
        let bytes = tokio::fs::read(local_path).await?;
        tracing::debug!(sandbox = %sandbox_id, path = %remote_path, bytes = bytes.len(), "Recorded upload");
        self.lock().push(SandboxEvent::Upload {
            sandbox_id: sandbox_id.to_string(),
            remote_path: remote_path.to_string(),
            local_path: local_path.to_path_buf(),
            bytes,
            mode: file_mode(local_path),
        });
        self.upload_result(remote_path)
    }

    async fn upload_directory(
        &self,
        sandbox_id: &str,
        remote_dir: &str,
        local_dir: &Path,
    ) -> Result<(), SandboxError> {
        self.lock().push(SandboxEvent::UploadDirectory {
            sandbox_id: sandbox_id.to_string(),
            remote_dir: remote_dir.to_string(),
            local_dir: local_dir.to_path_buf(),
        });
        self.upload_result(remote_dir)
    }
}

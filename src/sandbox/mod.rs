//! Sandbox backends.
//!
//! The provisioner only needs two capabilities from a sandbox: run a shell
//! command and upload files. [`SandboxClient`] captures exactly that;
//! [`DockerSandboxClient`] implements it over the Docker API and
//! [`RecordingSandbox`] records calls for dry runs and tests.

pub mod docker;
pub mod recording;

pub use docker::{DockerSandboxClient, SandboxSpec};
pub use recording::{RecordingSandbox, SandboxEvent};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::SandboxError;

/// Options for a command executed inside a sandbox.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Working directory; the sandbox default when `None`.
    pub working_dir: Option<String>,
    /// Extra environment variables for the command.
    pub env: Vec<(String, String)>,
    /// Maximum wall time for the command.
    pub timeout: Duration,
}

impl ExecOptions {
    /// Options with the given timeout and no extra environment.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            working_dir: None,
            env: Vec::new(),
            timeout,
        }
    }

    /// Set the working directory.
    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the environment variables.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Environment as `KEY=VALUE` strings.
    pub fn env_strings(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

/// Result of executing a command in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code of the command.
    pub exit_code: i64,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecResult {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations the provisioner performs against a created sandbox.
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Run `command` through `sh -c` inside the sandbox.
    async fn execute_command(
        &self,
        sandbox_id: &str,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecResult, SandboxError>;

    /// Copy one local file to `remote_path`, keeping its permission bits.
    async fn upload_file(
        &self,
        sandbox_id: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), SandboxError>;

    /// Copy the contents of `local_dir` into `remote_dir`.
    async fn upload_directory(
        &self,
        sandbox_id: &str,
        remote_dir: &str,
        local_dir: &Path,
    ) -> Result<(), SandboxError>;
}

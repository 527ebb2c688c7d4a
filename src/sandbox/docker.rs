//! Docker sandbox backend using the bollard crate.
//!
//! Commands run through `docker exec`; uploads are tar archives extracted
//! at the container root. Container create/remove is only used for
//! standalone local runs, where no surrounding harness owns the lifecycle.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use super::{ExecOptions, ExecResult, SandboxClient};
use crate::error::SandboxError;

/// Seconds between TERM and KILL once an exec hits its deadline.
const KILL_AFTER_SECS: u64 = 5;

/// Extra host-side wait beyond the in-container deadline.
const HOST_GRACE: Duration = Duration::from_secs(KILL_AFTER_SECS + 5);

/// Exit codes of `timeout(1)` when it had to stop the command.
const TIMEOUT_EXIT_CODES: [i64; 2] = [124, 137];

/// What to create for a standalone run.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    /// Docker image to use.
    pub image: String,
    /// Default working directory of the container.
    pub working_dir: String,
    /// CPU limit in cores.
    pub cpu_cores: f64,
    /// Memory limit in GiB.
    pub memory_gb: u64,
    /// How long the idle container stays alive.
    pub lifetime: Duration,
}

impl SandboxSpec {
    /// Spec for `image` with the default workdir, limits and lifetime.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            working_dir: "/app".to_string(),
            cpu_cores: 2.0,
            memory_gb: 4,
            lifetime: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Set the CPU and memory limits.
    pub fn with_limits(mut self, cpu_cores: f64, memory_gb: u64) -> Self {
        self.cpu_cores = cpu_cores;
        self.memory_gb = memory_gb;
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    fn memory_bytes(&self) -> i64 {
        (self.memory_gb as i64) * 1024 * 1024 * 1024
    }

    fn nano_cpus(&self) -> i64 {
        (self.cpu_cores * 1_000_000_000.0) as i64
    }
}

/// Docker-backed [`SandboxClient`].
pub struct DockerSandboxClient {
    docker: Docker,
}

impl DockerSandboxClient {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::DaemonUnavailable(format!("Failed to connect: {e}")))?;
        Ok(Self { docker })
    }

    /// Wrap an existing bollard client.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Pull the image if needed, then create and start an idle container.
    ///
    /// Returns the container id.
    pub async fn create_sandbox(&self, spec: &SandboxSpec) -> Result<String, SandboxError> {
        if self.docker.inspect_image(&spec.image).await.is_err() {
            tracing::info!(image = %spec.image, "Pulling image");
            let options = CreateImageOptions {
                from_image: spec.image.as_str(),
                ..Default::default()
            };
            let mut stream = self.docker.create_image(Some(options), None, None);
            while let Some(progress) = stream.next().await {
                progress.map_err(|e| {
                    SandboxError::CreateFailed(format!("Failed to pull image: {e}"))
                })?;
            }
        }

        let name = format!(
            "swe-harbor-{}",
            &uuid::Uuid::new_v4().simple().to_string()[..12]
        );
        let host_config = HostConfig {
            memory: Some(spec.memory_bytes()),
            nano_cpus: Some(spec.nano_cpus()),
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(vec![
                "sleep".to_string(),
                spec.lifetime.as_secs().to_string(),
            ]),
            working_dir: Some(spec.working_dir.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| SandboxError::CreateFailed(format!("Failed to create container: {e}")))?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::CreateFailed(format!("Failed to start container: {e}")))?;

        tracing::info!(container = %name, image = %spec.image, "Sandbox ready");
        Ok(response.id)
    }

    /// Force-remove a container and its volumes.
    pub async fn delete_sandbox(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(sandbox_id, Some(options))
            .await
            .map_err(|e| SandboxError::RemoveFailed(e.to_string()))?;
        tracing::debug!(container = %sandbox_id, "Sandbox removed");
        Ok(())
    }

    async fn exec(
        &self,
        sandbox_id: &str,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecResult, SandboxError> {
        let env = options.env_strings();
        let exec_options = CreateExecOptions {
            cmd: Some(exec_command_line(command, options.timeout)),
            env: if env.is_empty() { None } else { Some(env) },
            working_dir: options.working_dir,
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(sandbox_id, exec_options)
            .await
            .map_err(|e| {
                if e.to_string().contains("No such container") {
                    SandboxError::NotFound {
                        id: sandbox_id.to_string(),
                    }
                } else {
                    SandboxError::ExecFailed(format!("Failed to create exec: {e}"))
                }
            })?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::ExecFailed(format!("Failed to start exec: {e}")))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(SandboxError::ExecFailed(format!(
                            "Error reading output: {e}"
                        )));
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| SandboxError::ExecFailed(format!("Failed to inspect exec: {e}")))?;

        Ok(ExecResult {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn upload_archive(
        &self,
        sandbox_id: &str,
        label: &str,
        archive: Vec<u8>,
    ) -> Result<(), SandboxError> {
        let options = UploadToContainerOptions {
            path: "/".to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(sandbox_id, Some(options), archive.into())
            .await
            .map_err(|e| SandboxError::UploadFailed {
                path: label.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl SandboxClient for DockerSandboxClient {
    async fn execute_command(
        &self,
        sandbox_id: &str,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecResult, SandboxError> {
        let deadline = options.timeout;
        let seconds = deadline.as_secs();
        let started = Instant::now();

        // The container enforces the deadline through timeout(1); the host
        // wait only covers a daemon that stops answering.
        let exec = self.exec(sandbox_id, command, options);
        let result = if seconds == 0 {
            exec.await?
        } else {
            tokio::time::timeout(deadline + HOST_GRACE, exec)
                .await
                .map_err(|_| SandboxError::Timeout { seconds })??
        };

        if seconds > 0
            && TIMEOUT_EXIT_CODES.contains(&result.exit_code)
            && started.elapsed() >= deadline
        {
            return Err(SandboxError::Timeout { seconds });
        }
        Ok(result)
    }

    async fn upload_file(
        &self,
        sandbox_id: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), SandboxError> {
        let archive = file_archive(remote_path, local_path).map_err(|e| {
            SandboxError::UploadFailed {
                path: remote_path.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.upload_archive(sandbox_id, remote_path, archive).await
    }

    async fn upload_directory(
        &self,
        sandbox_id: &str,
        remote_dir: &str,
        local_dir: &Path,
    ) -> Result<(), SandboxError> {
        let archive = directory_archive(remote_dir, local_dir).map_err(|e| {
            SandboxError::UploadFailed {
                path: remote_dir.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.upload_archive(sandbox_id, remote_dir, archive).await
    }
}

/// Argument vector for a sandbox exec.
///
/// The command runs under `timeout(1)` so an expired command is stopped
/// inside the container rather than left running after the host gives up.
/// A zero timeout means no limit.
pub fn exec_command_line(command: &str, timeout: Duration) -> Vec<String> {
    let mut argv = Vec::with_capacity(7);
    let seconds = timeout.as_secs();
    if seconds > 0 {
        argv.extend([
            "timeout".to_string(),
            "-k".to_string(),
            KILL_AFTER_SECS.to_string(),
            seconds.to_string(),
        ]);
    }
    argv.extend(["sh".to_string(), "-c".to_string(), command.to_string()]);
    argv
}

/// Tar archive holding `local_path` at `remote_path` (relative to `/`).
pub fn file_archive(remote_path: &str, local_path: &Path) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_path_with_name(local_path, remote_path.trim_start_matches('/'))?;
    builder.into_inner()
}

/// Tar archive of everything under `local_dir`, rooted at `remote_dir`.
///
/// Entries are sorted by name so the archive is reproducible.
pub fn directory_archive(remote_dir: &str, local_dir: &Path) -> io::Result<Vec<u8>> {
    let prefix = Path::new(remote_dir.trim_start_matches('/'));
    let mut builder = tar::Builder::new(Vec::new());

    for entry in WalkDir::new(local_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(local_dir)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let name = prefix.join(relative);

        if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), &name)?;
        }
    }

    builder.into_inner()
}

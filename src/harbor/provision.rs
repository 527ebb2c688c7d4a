//! Sandbox provisioning: task assets, runtime dependency, agent executable.
//!
//! Order per task run:
//! 1. [`Provisioner::upload_task_assets`] places the instruction document and
//!    starting files
//! 2. [`Provisioner::provision`] installs the runtime dependency, then uploads
//!    the agent executable through a local temp file
//! 3. [`Provisioner::run_agent`] starts the agent with the resolved environment

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::config::HarborConfig;
use super::env::{resolve_environment, EnvDefaults, EnvironmentConfig, TaskState};
use super::task::TaskInstance;
use crate::error::ProvisionError;
use crate::sandbox::{ExecOptions, ExecResult, SandboxClient};
use crate::scaffold::DEFAULT_INSTRUCTION_PATH;

/// Name of the agent binary built alongside the CLI.
pub const AGENT_BINARY_NAME: &str = "harbor-agent";

/// Upper bound for the dependency install step.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Leading bytes of every ELF object.
const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// The agent executable to place in the sandbox.
#[derive(Debug, Clone)]
pub struct AgentAsset {
    source: String,
    bytes: Vec<u8>,
}

impl AgentAsset {
    /// Read the executable at `path`.
    ///
    /// The file must be an ELF binary. A build for the host's own libc may
    /// still fail inside the image; a static musl build
    /// (`--target x86_64-unknown-linux-musl`) passed via `--agent-binary`
    /// runs in any Linux image.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|_| ProvisionError::AgentAssetMissing(path.display().to_string()))?;
        if !bytes.starts_with(ELF_MAGIC) {
            return Err(ProvisionError::AgentAssetInvalid {
                path: path.display().to_string(),
                reason: "not an ELF executable".to_string(),
            });
        }
        Ok(Self {
            source: path.display().to_string(),
            bytes,
        })
    }

    /// Find `harbor-agent` next to the running executable.
    pub fn locate() -> Result<Self, ProvisionError> {
        Self::load(Self::default_path()?)
    }

    /// `harbor-agent` in the directory of the running executable.
    pub fn default_path() -> Result<PathBuf, ProvisionError> {
        let exe = std::env::current_exe()
            .map_err(|e| ProvisionError::AgentAssetMissing(e.to_string()))?;
        let dir = exe
            .parent()
            .ok_or_else(|| ProvisionError::AgentAssetMissing(exe.display().to_string()))?;
        Ok(dir.join(format!("{}{}", AGENT_BINARY_NAME, std::env::consts::EXE_SUFFIX)))
    }

    /// Wrap bytes that are already in memory; no format check.
    pub fn from_bytes(source: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            bytes,
        }
    }

    /// Where the bytes came from, for logs.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Raw executable contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Prepares sandboxes for one harbor configuration.
pub struct Provisioner {
    client: Arc<dyn SandboxClient>,
    config: HarborConfig,
    defaults: EnvDefaults,
}

impl Provisioner {
    /// Provisioner over `client`; `defaults` fill unset agent variables.
    pub fn new(client: Arc<dyn SandboxClient>, config: HarborConfig, defaults: EnvDefaults) -> Self {
        Self {
            client,
            config,
            defaults,
        }
    }

    /// Variables for the agent process; see [`resolve_environment`].
    pub fn resolve_environment(&self, state: &TaskState) -> EnvironmentConfig {
        resolve_environment(state, &self.defaults)
    }

    /// Base setup: instruction document and starting files.
    ///
    /// The task's `tests/` directory stays on the host.
    pub async fn upload_task_assets(
        &self,
        state: &TaskState,
        task: &TaskInstance,
    ) -> Result<(), ProvisionError> {
        let sandbox = state.sandbox_id.as_str();
        self.client
            .upload_file(sandbox, DEFAULT_INSTRUCTION_PATH, &task.instruction_path)
            .await?;

        if let Some(environment) = &task.environment_dir {
            self.client
                .upload_directory(sandbox, &self.config.agent_workdir, environment)
                .await?;
        }

        info!(task = %task.name, sandbox = %sandbox, "Task assets uploaded");
        Ok(())
    }

    /// Install the runtime dependency, then upload the agent executable.
    ///
    /// The install exit status is logged but not interpreted: a broken
    /// install shows up when the run command starts the agent.
    pub async fn provision(
        &self,
        state: &TaskState,
        agent: &AgentAsset,
    ) -> Result<(), ProvisionError> {
        let sandbox = state.sandbox_id.as_str();

        let install = self
            .client
            .execute_command(
                sandbox,
                &self.config.install_command,
                ExecOptions::with_timeout(INSTALL_TIMEOUT),
            )
            .await?;
        if install.success() {
            debug!(sandbox = %sandbox, "Runtime dependency installed");
        } else {
            warn!(sandbox = %sandbox, exit_code = install.exit_code, "Install command exited non-zero");
        }

        self.upload_agent(sandbox, agent).await?;
        info!(sandbox = %sandbox, source = %agent.source(), "Agent provisioned");
        Ok(())
    }

    /// Base setup followed by [`Provisioner::provision`].
    pub async fn setup(
        &self,
        state: &TaskState,
        task: &TaskInstance,
        agent: &AgentAsset,
    ) -> Result<(), ProvisionError> {
        self.upload_task_assets(state, task).await?;
        self.provision(state, agent).await
    }

    /// Start the agent and wait for it to exit.
    pub async fn run_agent(&self, state: &TaskState) -> Result<ExecResult, ProvisionError> {
        let env = self.resolve_environment(state);
        let options = ExecOptions::with_timeout(self.config.run_timeout())
            .in_dir(self.config.agent_workdir.clone())
            .with_env(env.to_pairs());

        let command = self.config.run_command();
        info!(sandbox = %state.sandbox_id, command = %command, "Starting agent");
        let result = self
            .client
            .execute_command(&state.sandbox_id, &command, options)
            .await?;
        info!(sandbox = %state.sandbox_id, exit_code = result.exit_code, "Agent exited");
        Ok(result)
    }

    /// Stage the executable in a local temp file and upload it.
    ///
    /// The temp file is deleted when `staged` drops, on every path.
    async fn upload_agent(&self, sandbox: &str, agent: &AgentAsset) -> Result<(), ProvisionError> {
        let mut staged = tempfile::Builder::new()
            .prefix("harbor-agent-")
            .tempfile()
            .map_err(ProvisionError::Staging)?;
        staged
            .write_all(agent.bytes())
            .and_then(|_| staged.flush())
            .map_err(ProvisionError::Staging)?;
        make_executable(staged.path()).map_err(ProvisionError::Staging)?;

        let remote = self.config.agent_remote_path();
        debug!(local = %staged.path().display(), remote = %remote, bytes = agent.bytes().len(), "Uploading agent");
        self.client
            .upload_file(sandbox, &remote, staged.path())
            .await?;

        staged.close().map_err(ProvisionError::Staging)?;
        Ok(())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

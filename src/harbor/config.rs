//! Configuration for provisioning and running tasks.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default install step: the agent's HTTP client needs a CA trust store.
pub const DEFAULT_INSTALL_COMMAND: &str =
    "apt-get update -qq && apt-get install -y -qq ca-certificates >/dev/null 2>&1";

/// File name of the agent executable inside the workdir.
pub const AGENT_FILE_NAME: &str = "agent";

/// Configuration for one harbor environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarborConfig {
    /// Directory holding one sub-directory per task.
    pub dataset_path: PathBuf,
    /// Only these task names; all tasks when empty.
    pub tasks: Vec<String>,
    /// Working directory inside the sandbox.
    pub agent_workdir: String,
    /// Image used for standalone runs.
    pub docker_image: String,
    /// Wall-time limit for the run command.
    pub timeout_seconds: u64,
    pub cpu_cores: f64,
    pub memory_gb: u64,
    /// Recorded only; the Docker backend has no portable disk quota.
    pub disk_size_gb: u64,
    /// Sandbox lifetime.
    pub timeout_minutes: u64,
    /// Rollout turn cap of the surrounding harness.
    pub max_turns: u32,
    /// Installs the agent's runtime dependency.
    pub install_command: String,
    /// Overrides the derived run command when set.
    pub run_command: Option<String>,
}

impl Default for HarborConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("./tasks"),
            tasks: Vec::new(),
            agent_workdir: "/app".to_string(),
            docker_image: "python:3.11-slim".to_string(),
            timeout_seconds: 900,
            cpu_cores: 2.0,
            memory_gb: 4,
            disk_size_gb: 10,
            timeout_minutes: 60,
            max_turns: 30,
            install_command: DEFAULT_INSTALL_COMMAND.to_string(),
            run_command: None,
        }
    }
}

impl HarborConfig {
    /// Sets the sandbox working directory.
    pub fn with_agent_workdir(mut self, dir: impl Into<String>) -> Self {
        self.agent_workdir = dir.into();
        self
    }

    /// Sets the dependency install command.
    pub fn with_install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = command.into();
        self
    }

    /// Overrides the agent run command.
    pub fn with_run_command(mut self, command: impl Into<String>) -> Self {
        self.run_command = Some(command.into());
        self
    }

    /// Where the agent executable is uploaded.
    pub fn agent_remote_path(&self) -> String {
        format!(
            "{}/{}",
            self.agent_workdir.trim_end_matches('/'),
            AGENT_FILE_NAME
        )
    }

    /// Command that starts the agent, with stderr folded into stdout.
    pub fn run_command(&self) -> String {
        match &self.run_command {
            Some(command) => command.clone(),
            None => format!("{} 2>&1", self.agent_remote_path()),
        }
    }

    /// Wall-time limit for the run command.
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// How long a created container stays alive.
    pub fn sandbox_lifetime(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarborConfig::default();
        assert_eq!(config.dataset_path, PathBuf::from("./tasks"));
        assert_eq!(config.agent_workdir, "/app");
        assert_eq!(config.docker_image, "python:3.11-slim");
        assert_eq!(config.run_timeout(), Duration::from_secs(900));
        assert_eq!(config.sandbox_lifetime(), Duration::from_secs(3600));
        assert_eq!(config.max_turns, 30);
        assert_eq!(config.disk_size_gb, 10);
    }

    #[test]
    fn test_run_command_follows_workdir() {
        let config = HarborConfig::default();
        assert_eq!(config.agent_remote_path(), "/app/agent");
        assert_eq!(config.run_command(), "/app/agent 2>&1");

        let config = HarborConfig::default().with_agent_workdir("/work/");
        assert_eq!(config.run_command(), "/work/agent 2>&1");

        let config = config.with_run_command("/bin/true");
        assert_eq!(config.run_command(), "/bin/true");
    }
}
